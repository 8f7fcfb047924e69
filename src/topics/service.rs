//! Topic management service (C6)
//!
//! Every operation runs the same pre-check (cluster must be `running`, a
//! pooled admin connection must be available) and emits exactly one audit
//! entry on terminus. Grounded on `original_source`'s `KafkaAdminOperations`
//! / `ConfluentKafkaAdminOperations` (`clients/admin_operations.py`), with
//! the admin calls themselves following the teacher's `rdkafka` usage in
//! `src/bin/kafka-admin.rs`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication};
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::config::ClientConfig as RdKafkaConfig;
use tracing::{info, warn};

use crate::error::{ErrorCode, KafkaOpsError, Result};
use crate::kafka::{KafkaClientPool, PooledConnection};
use crate::storage::{AuditStore, ClusterStatus, MetadataStore};

use super::model::{
    validate_topic_name, validate_updatable_configs, BrokerInfo, BulkOperationSummary, ClusterInfo,
    PartitionDetail, TopicDescription, TopicOperationResult, TopicSpec, TopicSummary,
    DEFAULT_RETENTION_MS,
};

const ADMIN_OP_TIMEOUT: Duration = Duration::from_secs(30);
const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// `purge_topic`'s temporary retention window, validated per §4.6.
const MIN_PURGE_RETENTION_MS: i64 = 1;
const MAX_PURGE_RETENTION_MS: i64 = 60_000;
const MIN_PURGE_SLEEP: Duration = Duration::from_secs(5);

pub struct TopicService {
    metadata: Arc<dyn MetadataStore>,
    audit: Arc<dyn AuditStore>,
    pool: Arc<KafkaClientPool>,
}

impl TopicService {
    pub fn new(metadata: Arc<dyn MetadataStore>, audit: Arc<dyn AuditStore>, pool: Arc<KafkaClientPool>) -> Self {
        Self { metadata, audit, pool }
    }

    /// §4.6's pre-check: instance must exist and be `running`, and a pooled
    /// admin connection must be obtainable.
    async fn require_running_connection(&self, cluster: &str) -> Result<Arc<PooledConnection>> {
        let instance = self
            .metadata
            .get_instance(cluster)
            .await?
            .ok_or_else(|| KafkaOpsError::cluster_not_found(cluster))?;

        if instance.status != ClusterStatus::Running {
            return Err(KafkaOpsError::cluster_not_available(cluster, instance.status));
        }

        self.pool.get(cluster).ok_or_else(|| KafkaOpsError::connection_failed(cluster))
    }

    async fn audit_log(&self, cluster: &str, operation: &str, user: Option<&str>, details: serde_json::Value) {
        if let Err(e) = self.audit.log(Some(cluster), operation, user, Some(details)).await {
            warn!(cluster, operation, error = %e, "failed to write audit entry");
        }
    }

    fn consumer_for(&self, conn: &PooledConnection) -> Result<BaseConsumer> {
        RdKafkaConfig::new()
            .set("bootstrap.servers", conn.bootstrap_servers())
            .set("group.id", "kafka-ops-agent-topic-service")
            .create()
            .map_err(|e| KafkaOpsError::new(format!("failed to create metadata consumer: {e}"), ErrorCode::KafkaConnectionError))
    }

    pub async fn create_topic(&self, cluster: &str, spec: &TopicSpec, user: Option<&str>) -> Result<TopicOperationResult> {
        spec.validate()?;
        let conn = self.require_running_connection(cluster).await?;
        let admin = conn.admin_client();

        let new_topic = NewTopic::new(&spec.name, spec.partitions, TopicReplication::Fixed(spec.replication_factor))
            .set_config(spec.to_config_map());
        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_OP_TIMEOUT));

        let results = admin
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| KafkaOpsError::new(format!("create_topics failed: {e}"), ErrorCode::TopicCreationFailed))?;

        let outcome = match results.into_iter().next() {
            Some(Ok(_)) => {
                info!(cluster, topic = %spec.name, "topic created");
                if spec.has_non_default_configs() {
                    match self.alter_topic_configs(&conn, &spec.name, &spec.to_config_map()).await {
                        Ok(()) => TopicOperationResult::ok(&spec.name, "topic created"),
                        Err(e) => {
                            warn!(cluster, topic = %spec.name, error = %e, "topic created but follow-up config alter failed");
                            TopicOperationResult::failed(&spec.name, format!("topic created but config alter failed: {e}"), ErrorCode::TopicConfigUpdateFailed)
                        }
                    }
                } else {
                    TopicOperationResult::ok(&spec.name, "topic created")
                }
            }
            Some(Err((_, code))) if code.to_string().to_lowercase().contains("exists") => {
                TopicOperationResult::failed(&spec.name, "topic already exists", ErrorCode::TopicAlreadyExists)
            }
            Some(Err((_, code))) => {
                TopicOperationResult::failed(&spec.name, format!("create failed: {code:?}"), ErrorCode::TopicCreationFailed)
            }
            None => TopicOperationResult::failed(&spec.name, "admin returned no result", ErrorCode::TopicCreationFailed),
        };

        self.audit_log(
            cluster,
            "topic_create",
            user,
            serde_json::json!({"topic_name": spec.name, "success": outcome.success, "partitions": spec.partitions}),
        )
        .await;

        Ok(outcome)
    }

    pub async fn list_topics(&self, cluster: &str, include_internal: bool, user: Option<&str>) -> Result<Vec<TopicSummary>> {
        let conn = self.require_running_connection(cluster).await?;
        let consumer = self.consumer_for(&conn)?;

        let metadata = consumer
            .fetch_metadata(None, METADATA_FETCH_TIMEOUT)
            .map_err(|e| KafkaOpsError::new(format!("fetch_metadata failed: {e}"), ErrorCode::KafkaConnectionError))?;

        let topics: Vec<TopicSummary> = metadata
            .topics()
            .iter()
            .filter(|t| include_internal || !t.name().starts_with("__"))
            .map(|t| TopicSummary {
                name: t.name().to_string(),
                partition_count: t.partitions().len(),
                is_internal: t.name().starts_with("__"),
            })
            .collect();

        self.audit_log(cluster, "topic_list", user, serde_json::json!({"count": topics.len()})).await;
        Ok(topics)
    }

    pub async fn describe_topic(&self, cluster: &str, name: &str, user: Option<&str>) -> Result<Option<TopicDescription>> {
        let conn = self.require_running_connection(cluster).await?;
        let consumer = self.consumer_for(&conn)?;

        let metadata = consumer
            .fetch_metadata(Some(name), METADATA_FETCH_TIMEOUT)
            .map_err(|e| KafkaOpsError::new(format!("fetch_metadata failed: {e}"), ErrorCode::KafkaConnectionError))?;

        let topic = metadata.topics().iter().find(|t| t.name() == name);
        let description = match topic {
            None => None,
            Some(t) => {
                let partitions: Vec<PartitionDetail> = t
                    .partitions()
                    .iter()
                    .map(|p| PartitionDetail {
                        partition: p.id(),
                        leader: p.leader(),
                        replicas: p.replicas().to_vec(),
                        in_sync_replicas: p.isr().to_vec(),
                    })
                    .collect();
                let replication_factor = partitions.first().map(|p| p.replicas.len()).unwrap_or(0);
                let configs = self.fetch_topic_configs(&conn, name).await.unwrap_or_default();
                Some(TopicDescription {
                    name: name.to_string(),
                    partition_count: partitions.len(),
                    replication_factor,
                    configs,
                    partitions,
                    total_message_count: None,
                    total_size_bytes: None,
                })
            }
        };

        self.audit_log(cluster, "topic_describe", user, serde_json::json!({"topic_name": name, "found": description.is_some()})).await;
        Ok(description)
    }

    async fn fetch_topic_configs(&self, conn: &PooledConnection, name: &str) -> Result<HashMap<String, String>> {
        let resource = ResourceSpecifier::Topic(name);
        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_OP_TIMEOUT));
        let results = conn
            .admin_client()
            .describe_configs(&[resource], &opts)
            .await
            .map_err(|e| KafkaOpsError::new(format!("describe_configs failed: {e}"), ErrorCode::KafkaConnectionError))?;

        match results.into_iter().next() {
            Some(Ok(config)) => Ok(config
                .entries
                .into_iter()
                .filter_map(|entry| entry.value.map(|v| (entry.name, v)))
                .collect()),
            Some(Err(code)) => Err(KafkaOpsError::new(format!("describe_configs failed: {code:?}"), ErrorCode::KafkaConnectionError)),
            None => Ok(HashMap::new()),
        }
    }

    pub async fn update_topic_config(
        &self,
        cluster: &str,
        name: &str,
        configs: &HashMap<String, String>,
        user: Option<&str>,
    ) -> Result<TopicOperationResult> {
        validate_topic_name(name)?;
        if let Err(e) = validate_updatable_configs(configs) {
            self.audit_log(cluster, "topic_config_update_rejected", user, serde_json::json!({"topic_name": name, "error": e.to_string()})).await;
            return Err(e);
        }

        let conn = self.require_running_connection(cluster).await?;
        let outcome = self.alter_topic_configs(&conn, name, configs).await;

        let outcome = match outcome {
            Ok(()) => TopicOperationResult::ok(name, "topic config updated"),
            Err(e) => TopicOperationResult::failed(name, e.message.clone(), ErrorCode::TopicConfigUpdateFailed),
        };

        self.audit_log(
            cluster,
            if outcome.success { "topic_config_update_success" } else { "topic_config_update_failed" },
            user,
            serde_json::json!({"topic_name": name, "configs": configs}),
        )
        .await;

        Ok(outcome)
    }

    async fn alter_topic_configs(&self, conn: &PooledConnection, name: &str, configs: &HashMap<String, String>) -> Result<()> {
        let resource = ResourceSpecifier::Topic(name);
        let alter_config = configs.iter().fold(AlterConfig::new(resource), |acc, (k, v)| acc.set(k, v));
        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_OP_TIMEOUT));

        let results = conn
            .admin_client()
            .alter_configs(&[alter_config], &opts)
            .await
            .map_err(|e| KafkaOpsError::new(format!("alter_configs failed: {e}"), ErrorCode::TopicConfigUpdateFailed))?;

        for result in results {
            if let Err((_, code)) = result {
                return Err(KafkaOpsError::new(format!("alter_configs failed: {code:?}"), ErrorCode::TopicConfigUpdateFailed));
            }
        }
        Ok(())
    }

    pub async fn delete_topic(&self, cluster: &str, name: &str, user: Option<&str>) -> Result<TopicOperationResult> {
        let conn = self.require_running_connection(cluster).await?;
        let opts = AdminOptions::new().operation_timeout(Some(ADMIN_OP_TIMEOUT));

        let results = conn
            .admin_client()
            .delete_topics(&[name], &opts)
            .await
            .map_err(|e| KafkaOpsError::new(format!("delete_topics failed: {e}"), ErrorCode::TopicDeletionFailed))?;

        let outcome = match results.into_iter().next() {
            Some(Ok(_)) => TopicOperationResult::ok(name, "topic deleted"),
            Some(Err((_, code))) if code.to_string().to_lowercase().contains("unknown") => {
                TopicOperationResult::ok(name, "topic already absent")
            }
            Some(Err((_, code))) => TopicOperationResult::failed(name, format!("delete failed: {code:?}"), ErrorCode::TopicDeletionFailed),
            None => TopicOperationResult::ok(name, "topic already absent"),
        };

        self.audit_log(cluster, "topic_delete", user, serde_json::json!({"topic_name": name, "success": outcome.success})).await;
        Ok(outcome)
    }

    /// Purges a topic by exploiting retention-driven deletion rather than
    /// per-partition offset truncation: shrink `retention.ms` long enough
    /// for the broker's log cleaner to drop everything, then restore it.
    pub async fn purge_topic(&self, cluster: &str, name: &str, retention_ms: i64, user: Option<&str>) -> Result<TopicOperationResult> {
        if !(MIN_PURGE_RETENTION_MS..=MAX_PURGE_RETENTION_MS).contains(&retention_ms) {
            return Err(KafkaOpsError::validation(
                format!("purge retention_ms must be in {MIN_PURGE_RETENTION_MS}..{MAX_PURGE_RETENTION_MS}, got {retention_ms}"),
                Some("retention_ms"),
            ));
        }

        let conn = self.require_running_connection(cluster).await?;

        let original_retention = self
            .fetch_topic_configs(&conn, name)
            .await?
            .get("retention.ms")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_RETENTION_MS);

        let mut shrink = HashMap::new();
        shrink.insert("retention.ms".to_string(), retention_ms.to_string());
        if let Err(e) = self.alter_topic_configs(&conn, name, &shrink).await {
            let outcome = TopicOperationResult::failed(name, e.message.clone(), ErrorCode::TopicConfigUpdateFailed);
            self.audit_log(cluster, "topic_purge_failed", user, serde_json::json!({"topic_name": name, "stage": "shrink"})).await;
            return Ok(outcome);
        }

        let sleep_secs = (retention_ms / 1000).max(MIN_PURGE_SLEEP.as_secs() as i64) as u64;
        tokio::time::sleep(Duration::from_secs(sleep_secs)).await;

        let mut restore = HashMap::new();
        restore.insert("retention.ms".to_string(), original_retention.to_string());
        let outcome = match self.alter_topic_configs(&conn, name, &restore).await {
            Ok(()) => TopicOperationResult::ok(name, "topic purged"),
            Err(e) => {
                warn!(cluster, topic = name, error = %e, "failed to restore retention.ms after purge; leaving shrunk value in place");
                TopicOperationResult::ok_with_details(
                    name,
                    "topic purged, but restoring original retention.ms failed",
                    serde_json::json!({"restore_warning": e.message}),
                )
            }
        };

        self.audit_log(
            cluster,
            "topic_purge",
            user,
            serde_json::json!({"topic_name": name, "retention_ms": retention_ms, "original_retention_ms": original_retention}),
        )
        .await;

        Ok(outcome)
    }

    pub async fn bulk_create_topics(&self, cluster: &str, specs: &[TopicSpec], user: Option<&str>) -> Result<HashMap<String, TopicOperationResult>> {
        let mut results = HashMap::with_capacity(specs.len());
        for spec in specs {
            let outcome = match self.create_topic(cluster, spec, user).await {
                Ok(r) => r,
                Err(e) => TopicOperationResult::failed(&spec.name, e.message.clone(), e.code),
            };
            results.insert(spec.name.clone(), outcome);
        }

        let summary = BulkOperationSummary::tally(&results);
        self.audit_log(cluster, "topic_bulk_create", user, serde_json::to_value(&summary).unwrap_or_default()).await;
        Ok(results)
    }

    pub async fn bulk_delete_topics(&self, cluster: &str, names: &[String], user: Option<&str>) -> Result<HashMap<String, TopicOperationResult>> {
        let mut results = HashMap::with_capacity(names.len());
        for name in names {
            let outcome = match self.delete_topic(cluster, name, user).await {
                Ok(r) => r,
                Err(e) => TopicOperationResult::failed(name, e.message.clone(), e.code),
            };
            results.insert(name.clone(), outcome);
        }

        let summary = BulkOperationSummary::tally(&results);
        self.audit_log(cluster, "topic_bulk_delete", user, serde_json::to_value(&summary).unwrap_or_default()).await;
        Ok(results)
    }

    pub async fn get_cluster_info(&self, cluster: &str) -> Result<ClusterInfo> {
        let conn = self.require_running_connection(cluster).await?;
        let consumer = self.consumer_for(&conn)?;

        let metadata = consumer
            .fetch_metadata(None, METADATA_FETCH_TIMEOUT)
            .map_err(|e| KafkaOpsError::new(format!("fetch_metadata failed: {e}"), ErrorCode::KafkaConnectionError))?;

        let brokers: Vec<BrokerInfo> = metadata
            .brokers()
            .iter()
            .map(|b| BrokerInfo { id: b.id(), host: b.host().to_string(), port: b.port() })
            .collect();

        Ok(ClusterInfo {
            cluster_id: cluster.to_string(),
            broker_count: brokers.len(),
            topic_count: metadata.topics().len(),
            brokers,
            controller_id: None,
        })
    }
}
