//! Runtime providers (C4)
//!
//! A runtime provider is polymorphic over four capabilities —
//! provision/deprovision/status/connection-info/health — with three
//! variants sharing the same contract: container-engine, orchestrator,
//! and IaaS. The provider *kind* a `ServiceInstance` was created with is
//! `storage::RuntimeProviderKind`; the trait below is deliberately named
//! differently to avoid reusing that name for two different things.

pub mod container_engine;
pub mod iaas;
pub mod orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::ConnectionInfo;

pub use container_engine::ContainerEngineProvider;
pub use iaas::IaasProvider;
pub use orchestrator::OrchestratorProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub status: ProvisioningStatus,
    pub instance_id: String,
    pub connection_info: Option<ConnectionInfo>,
    pub error_message: Option<String>,
}

impl ProvisioningResult {
    pub fn succeeded(instance_id: impl Into<String>, connection_info: ConnectionInfo) -> Self {
        Self {
            status: ProvisioningStatus::Succeeded,
            instance_id: instance_id.into(),
            connection_info: Some(connection_info),
            error_message: None,
        }
    }

    pub fn failed(instance_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            status: ProvisioningStatus::Failed,
            instance_id: instance_id.into(),
            connection_info: None,
            error_message: Some(error_message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeprovisioningResult {
    pub status: ProvisioningStatus,
    pub instance_id: String,
    pub error_message: Option<String>,
}

impl DeprovisioningResult {
    pub fn succeeded(instance_id: impl Into<String>) -> Self {
        Self {
            status: ProvisioningStatus::Succeeded,
            instance_id: instance_id.into(),
            error_message: None,
        }
    }

    pub fn failed(instance_id: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            status: ProvisioningStatus::Failed,
            instance_id: instance_id.into(),
            error_message: Some(error_message.into()),
        }
    }
}

/// Provisioning-input view of `ClusterConfig` (post-validation); independent
/// of storage's `ServiceInstance` since providers never see the whole row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster_size: u32,
    pub replication_factor: u32,
    pub partition_count: u32,
    pub retention_hours: u32,
    pub storage_size_gb: u32,
    pub enable_ssl: bool,
    pub enable_sasl: bool,
    pub custom_properties: std::collections::HashMap<String, String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_size: 1,
            replication_factor: 1,
            partition_count: 3,
            retention_hours: 168,
            storage_size_gb: 10,
            enable_ssl: false,
            enable_sasl: false,
            custom_properties: std::collections::HashMap::new(),
        }
    }
}

impl ClusterConfig {
    /// The marketplace API's provisioning parameter checks, plus the
    /// replication-factor-fits-cluster-size invariant.
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.cluster_size) {
            return Err(crate::error::KafkaOpsError::validation(
                format!("cluster_size must be between 1 and 10, got {}", self.cluster_size),
                Some("cluster_size"),
            ));
        }
        if self.replication_factor == 0 {
            return Err(crate::error::KafkaOpsError::validation("replication_factor must be positive", Some("replication_factor")));
        }
        if self.retention_hours == 0 {
            return Err(crate::error::KafkaOpsError::validation("retention_hours must be positive", Some("retention_hours")));
        }
        if self.replication_factor > self.cluster_size {
            return Err(crate::error::KafkaOpsError::validation(
                format!("replication_factor ({}) cannot exceed cluster_size ({})", self.replication_factor, self.cluster_size),
                Some("replication_factor"),
            ));
        }
        Ok(())
    }
}

/// Uniform contract every runtime provider (container-engine, orchestrator,
/// IaaS) presents, regardless of how it blocks internally.
#[async_trait]
pub trait RuntimeProvider: Send + Sync {
    async fn provision(&self, instance_id: &str, config: &ClusterConfig) -> Result<ProvisioningResult>;
    async fn deprovision(&self, instance_id: &str) -> Result<DeprovisioningResult>;
    async fn get_status(&self, instance_id: &str) -> ProvisioningStatus;
    async fn get_connection_info(&self, instance_id: &str) -> Option<ConnectionInfo>;
    async fn health_check(&self, instance_id: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn cluster_size_out_of_range_is_rejected() {
        let config = ClusterConfig { cluster_size: 11, ..Default::default() };
        assert!(config.validate().is_err());
        let config = ClusterConfig { cluster_size: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn replication_factor_exceeding_cluster_size_is_rejected() {
        let config = ClusterConfig { cluster_size: 2, replication_factor: 3, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
