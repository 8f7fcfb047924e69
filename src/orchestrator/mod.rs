//! Provisioning orchestrator (C7)
//!
//! Drives a `ServiceInstance` through `pending → creating → running|error →
//! stopping → (deleted)|error`, persisting the transition before and after
//! each provider call and writing one audit entry per step. Grounded on
//! `original_source`'s `ProvisioningService` (`services/provisioning.py`);
//! since every `RuntimeProvider` method here is already `async` (unlike the
//! Python original's mixed sync/async providers needing an executor
//! hand-off), the "bounded worker pool" §5 calls for is a `tokio::Semaphore`
//! bounding how many provider calls run concurrently, rather than a thread
//! pool.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::providers::{ClusterConfig, ProvisioningResult, ProvisioningStatus, DeprovisioningResult, RuntimeProvider};
use crate::storage::{AuditStore, ClusterStatus, ConnectionInfo, InstanceFilters, MetadataStore, RuntimeProviderKind, ServiceInstance};

const DEFAULT_MAX_CONCURRENT_OPERATIONS: usize = 8;

/// Baseline `ClusterConfig`s selected by plan id, overlaid with caller
/// parameters. Mirrors `original_source`'s `ClusterConfigFactory`.
fn baseline_for_plan(plan_id: &str) -> ClusterConfig {
    match plan_id {
        "basic" => ClusterConfig {
            cluster_size: 1,
            replication_factor: 1,
            partition_count: 3,
            retention_hours: 24,
            storage_size_gb: 5,
            ..Default::default()
        },
        "premium" => ClusterConfig {
            cluster_size: 5,
            replication_factor: 3,
            partition_count: 12,
            retention_hours: 720,
            storage_size_gb: 100,
            enable_ssl: true,
            enable_sasl: true,
            custom_properties: HashMap::from([
                ("auto.create.topics.enable".to_string(), "false".to_string()),
                ("delete.topic.enable".to_string(), "true".to_string()),
                ("log.retention.check.interval.ms".to_string(), "300000".to_string()),
            ]),
        },
        _ => ClusterConfig {
            cluster_size: 3,
            replication_factor: 3,
            partition_count: 6,
            retention_hours: 168,
            storage_size_gb: 20,
            ..Default::default()
        },
    }
}

/// Overlays `parameters` onto a plan baseline, matching
/// `ProvisioningService._parameters_to_config`'s explicit key mapping.
fn parameters_to_config(plan_id: &str, parameters: &HashMap<String, Value>) -> ClusterConfig {
    let mut config = baseline_for_plan(plan_id);

    if let Some(v) = parameters.get("cluster_size").and_then(Value::as_u64) {
        config.cluster_size = v as u32;
    }
    if let Some(v) = parameters.get("replication_factor").and_then(Value::as_u64) {
        config.replication_factor = v as u32;
    }
    if let Some(v) = parameters.get("partition_count").and_then(Value::as_u64) {
        config.partition_count = v as u32;
    }
    if let Some(v) = parameters.get("retention_hours").and_then(Value::as_u64) {
        config.retention_hours = v as u32;
    }
    if let Some(v) = parameters.get("storage_size_gb").and_then(Value::as_u64) {
        config.storage_size_gb = v as u32;
    }
    if let Some(v) = parameters.get("enable_ssl").and_then(Value::as_bool) {
        config.enable_ssl = v;
    }
    if let Some(v) = parameters.get("enable_sasl").and_then(Value::as_bool) {
        config.enable_sasl = v;
    }
    if let Some(Value::Object(custom)) = parameters.get("custom_properties") {
        for (k, v) in custom {
            if let Some(s) = v.as_str() {
                config.custom_properties.insert(k.clone(), s.to_string());
            }
        }
    }

    config
}

fn provider_name_from_parameters(parameters: &HashMap<String, Value>, default_provider: RuntimeProviderKind) -> RuntimeProviderKind {
    parameters
        .get("runtime_provider")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_provider)
}

pub struct ProvisioningOrchestrator {
    metadata: Arc<dyn MetadataStore>,
    audit: Arc<dyn AuditStore>,
    providers: HashMap<RuntimeProviderKind, Arc<dyn RuntimeProvider>>,
    default_provider: RuntimeProviderKind,
    permits: Arc<Semaphore>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        audit: Arc<dyn AuditStore>,
        providers: HashMap<RuntimeProviderKind, Arc<dyn RuntimeProvider>>,
        default_provider: RuntimeProviderKind,
    ) -> Self {
        Self::with_concurrency(metadata, audit, providers, default_provider, DEFAULT_MAX_CONCURRENT_OPERATIONS)
    }

    pub fn with_concurrency(
        metadata: Arc<dyn MetadataStore>,
        audit: Arc<dyn AuditStore>,
        providers: HashMap<RuntimeProviderKind, Arc<dyn RuntimeProvider>>,
        default_provider: RuntimeProviderKind,
        max_concurrent_operations: usize,
    ) -> Self {
        Self { metadata, audit, providers, default_provider, permits: Arc::new(Semaphore::new(max_concurrent_operations)) }
    }

    /// Builds the `ClusterConfig` `provision_cluster` would use for this
    /// plan/parameters pair, without persisting or provisioning anything —
    /// lets callers (the marketplace API) validate before committing.
    pub fn preview_cluster_config(&self, plan_id: &str, parameters: &HashMap<String, Value>) -> ClusterConfig {
        parameters_to_config(plan_id, parameters)
    }

    async fn audit_log(&self, instance_id: &str, operation: &str, user_id: Option<&str>, details: Option<Value>) {
        if let Err(e) = self.audit.log(Some(instance_id), operation, user_id, details).await {
            warn!(instance_id, operation, error = %e, "failed to write audit entry");
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn provision_cluster(
        &self,
        instance_id: &str,
        service_id: &str,
        plan_id: &str,
        organization_guid: &str,
        space_guid: &str,
        parameters: HashMap<String, Value>,
        user_id: Option<&str>,
    ) -> Result<ProvisioningResult> {
        info!(instance_id, "starting provisioning");

        if self.metadata.instance_exists(instance_id).await? {
            warn!(instance_id, "instance already exists");
            return Ok(ProvisioningResult::failed(instance_id, "instance already exists"));
        }

        let provider_kind = provider_name_from_parameters(&parameters, self.default_provider);
        let Some(provider) = self.providers.get(&provider_kind) else {
            let msg = format!("unsupported runtime provider: {provider_kind}");
            error!(instance_id, provider = %provider_kind, "{msg}");
            return Ok(ProvisioningResult::failed(instance_id, msg));
        };

        let mut instance = ServiceInstance::new(instance_id, service_id, plan_id, organization_guid, space_guid, provider_kind);
        instance.parameters = parameters.clone();
        self.metadata.create_instance(&instance).await?;

        self.audit_log(
            instance_id,
            "provision_start",
            user_id,
            Some(serde_json::json!({"plan_id": plan_id, "provider": provider_kind.to_string(), "parameters": parameters})),
        )
        .await;

        instance.status = ClusterStatus::Creating;
        instance.updated_at = chrono::Utc::now();
        self.metadata.update_instance(&instance).await?;

        let cluster_config = parameters_to_config(plan_id, &parameters);

        let result = {
            let _permit = self.permits.acquire().await.expect("semaphore is never closed");
            provider.provision(instance_id, &cluster_config).await
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let msg = format!("provisioning exception: {e}");
                error!(instance_id, error = %e, "provisioning failed with an error");
                instance.status = ClusterStatus::Error;
                instance.error_message = Some(msg.clone());
                instance.updated_at = chrono::Utc::now();
                self.metadata.update_instance(&instance).await?;
                self.audit_log(instance_id, "provision_exception", user_id, Some(serde_json::json!({"error": msg}))).await;
                return Ok(ProvisioningResult::failed(instance_id, msg));
            }
        };

        if result.status == ProvisioningStatus::Succeeded {
            instance.status = ClusterStatus::Running;
            instance.connection_info = result.connection_info.clone();
            instance.updated_at = chrono::Utc::now();
            self.metadata.update_instance(&instance).await?;
            self.audit_log(
                instance_id,
                "provision_success",
                user_id,
                Some(serde_json::json!({"connection_info": result.connection_info})),
            )
            .await;
            info!(instance_id, "provisioning succeeded");
        } else {
            instance.status = ClusterStatus::Error;
            instance.error_message = result.error_message.clone();
            instance.updated_at = chrono::Utc::now();
            self.metadata.update_instance(&instance).await?;
            self.audit_log(instance_id, "provision_failed", user_id, Some(serde_json::json!({"error": result.error_message}))).await;
            error!(instance_id, error = ?result.error_message, "provisioning failed");
        }

        Ok(result)
    }

    pub async fn deprovision_cluster(&self, instance_id: &str, user_id: Option<&str>) -> Result<DeprovisioningResult> {
        info!(instance_id, "starting deprovisioning");

        // Deprovisioning is idempotent: a row that's already gone is not a
        // failure, matching every provider's own idempotent cleanup.
        let Some(mut instance) = self.metadata.get_instance(instance_id).await? else {
            info!(instance_id, "instance already absent; deprovision is a no-op");
            return Ok(DeprovisioningResult::succeeded(instance_id));
        };

        let Some(provider) = self.providers.get(&instance.runtime_provider) else {
            let msg = format!("provider {} not available", instance.runtime_provider);
            return Ok(DeprovisioningResult::failed(instance_id, msg));
        };

        self.audit_log(instance_id, "deprovision_start", user_id, Some(serde_json::json!({"provider": instance.runtime_provider.to_string()}))).await;

        instance.status = ClusterStatus::Stopping;
        instance.updated_at = chrono::Utc::now();
        self.metadata.update_instance(&instance).await?;

        let result = {
            let _permit = self.permits.acquire().await.expect("semaphore is never closed");
            provider.deprovision(instance_id).await
        };

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                let msg = format!("deprovisioning exception: {e}");
                instance.status = ClusterStatus::Error;
                instance.error_message = Some(msg.clone());
                instance.updated_at = chrono::Utc::now();
                self.metadata.update_instance(&instance).await?;
                self.audit_log(instance_id, "deprovision_exception", user_id, Some(serde_json::json!({"error": msg}))).await;
                return Ok(DeprovisioningResult::failed(instance_id, msg));
            }
        };

        if result.status == ProvisioningStatus::Succeeded {
            self.metadata.delete_instance(instance_id).await?;
            self.audit_log(instance_id, "deprovision_success", user_id, None).await;
            info!(instance_id, "deprovisioning succeeded");
        } else {
            instance.status = ClusterStatus::Error;
            instance.error_message = result.error_message.clone();
            instance.updated_at = chrono::Utc::now();
            self.metadata.update_instance(&instance).await?;
            self.audit_log(instance_id, "deprovision_failed", user_id, Some(serde_json::json!({"error": result.error_message}))).await;
            error!(instance_id, error = ?result.error_message, "deprovisioning failed");
        }

        Ok(result)
    }

    /// Reconciles stored status against the provider's live `get_status`,
    /// writing back on disagreement.
    pub async fn get_cluster_status(&self, instance_id: &str) -> Result<Option<ClusterStatus>> {
        let Some(mut instance) = self.metadata.get_instance(instance_id).await? else {
            return Ok(None);
        };

        if instance.status == ClusterStatus::Running {
            if let Some(provider) = self.providers.get(&instance.runtime_provider) {
                let live_status = provider.get_status(instance_id).await;
                if live_status != ProvisioningStatus::Succeeded {
                    instance.status = if live_status == ProvisioningStatus::Failed { ClusterStatus::Error } else { ClusterStatus::Creating };
                    instance.updated_at = chrono::Utc::now();
                    self.metadata.update_instance(&instance).await?;
                }
            }
        }

        Ok(Some(instance.status))
    }

    /// Prefers live provider connection info, falling back to the stored
    /// value when the provider can't produce one.
    pub async fn get_connection_info(&self, instance_id: &str) -> Result<Option<ConnectionInfo>> {
        let Some(instance) = self.metadata.get_instance(instance_id).await? else {
            return Ok(None);
        };
        if instance.status != ClusterStatus::Running {
            return Ok(None);
        }

        if let Some(provider) = self.providers.get(&instance.runtime_provider) {
            if let Some(info) = provider.get_connection_info(instance_id).await {
                return Ok(Some(info));
            }
        }

        Ok(instance.connection_info)
    }

    pub async fn health_check(&self, instance_id: &str) -> Result<bool> {
        let Some(instance) = self.metadata.get_instance(instance_id).await? else {
            return Ok(false);
        };
        if instance.status != ClusterStatus::Running {
            return Ok(false);
        }
        match self.providers.get(&instance.runtime_provider) {
            Some(provider) => Ok(provider.health_check(instance_id).await),
            None => Ok(false),
        }
    }

    pub async fn list_instances(&self, filters: &InstanceFilters) -> Result<Vec<ServiceInstance>> {
        self.metadata.list_instances(filters).await
    }

    /// Best-effort deprovision of every row in `error`, then drops the row
    /// regardless of whether cleanup succeeded.
    pub async fn cleanup_failed_instances(&self) -> Result<usize> {
        let failed = self.metadata.list_by_status(ClusterStatus::Error).await?;
        let mut cleaned = 0;

        for instance in failed {
            if let Some(provider) = self.providers.get(&instance.runtime_provider) {
                if let Err(e) = provider.deprovision(&instance.instance_id).await {
                    warn!(instance_id = %instance.instance_id, error = %e, "best-effort cleanup deprovision failed");
                }
            }

            match self.metadata.delete_instance(&instance.instance_id).await {
                Ok(_) => {
                    cleaned += 1;
                    info!(instance_id = %instance.instance_id, "cleaned up failed instance");
                }
                Err(e) => warn!(instance_id = %instance.instance_id, error = %e, "failed to delete instance record during cleanup"),
            }
        }

        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_plan_uses_single_node_baseline() {
        let config = baseline_for_plan("basic");
        assert_eq!(config.cluster_size, 1);
        assert_eq!(config.storage_size_gb, 5);
    }

    #[test]
    fn premium_plan_enables_ssl_and_sasl() {
        let config = baseline_for_plan("premium");
        assert!(config.enable_ssl);
        assert!(config.enable_sasl);
        assert_eq!(config.replication_factor, 3);
    }

    #[test]
    fn unknown_plan_falls_back_to_multi_node() {
        let config = baseline_for_plan("standard");
        assert_eq!(config.cluster_size, 3);
        assert_eq!(config.partition_count, 6);
    }

    #[test]
    fn parameters_override_plan_baseline() {
        let mut parameters = HashMap::new();
        parameters.insert("cluster_size".to_string(), Value::from(7));
        parameters.insert("enable_ssl".to_string(), Value::from(true));
        let config = parameters_to_config("basic", &parameters);
        assert_eq!(config.cluster_size, 7);
        assert!(config.enable_ssl);
        assert_eq!(config.storage_size_gb, 5);
    }

    #[test]
    fn provider_kind_read_from_parameters_falls_back_to_default() {
        let mut parameters = HashMap::new();
        parameters.insert("runtime_provider".to_string(), Value::from("iaas"));
        assert_eq!(provider_name_from_parameters(&parameters, RuntimeProviderKind::ContainerEngine), RuntimeProviderKind::Iaas);
        assert_eq!(provider_name_from_parameters(&HashMap::new(), RuntimeProviderKind::Orchestrator), RuntimeProviderKind::Orchestrator);
    }
}
