//! Topic data model
//!
//! `TopicSpec` is the validated create/update input; `TopicDescription` is
//! the observable state returned by `describe_topic`. Grounded on
//! `original_source`'s `models/topic.py` (`TopicConfig`/`TopicInfo`/
//! `TopicDetails`), adapted to the crate's `KafkaOpsError` taxonomy instead
//! of pydantic validators.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, KafkaOpsError, Result};

pub const DEFAULT_RETENTION_MS: i64 = 604_800_000;
const MIN_MAX_MESSAGE_BYTES: i64 = 1;
const MAX_MAX_MESSAGE_BYTES: i64 = 104_857_600;
const DEFAULT_MAX_MESSAGE_BYTES: i64 = 1_048_576;

/// Keys `update_topic_config` will accept; everything else is rejected with
/// `INVALID_TOPIC_CONFIG`.
pub const UPDATABLE_CONFIG_KEYS: &[&str] = &[
    "retention.ms",
    "retention.bytes",
    "cleanup.policy",
    "compression.type",
    "max.message.bytes",
    "min.insync.replicas",
    "segment.ms",
    "segment.bytes",
    "delete.retention.ms",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    Delete,
    Compact,
    CompactDelete,
}

impl CleanupPolicy {
    pub fn as_kafka_value(&self) -> &'static str {
        match self {
            CleanupPolicy::Delete => "delete",
            CleanupPolicy::Compact => "compact",
            CleanupPolicy::CompactDelete => "compact,delete",
        }
    }
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        CleanupPolicy::Delete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl CompressionType {
    pub fn as_kafka_value(&self) -> &'static str {
        match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Snappy => "snappy",
            CompressionType::Lz4 => "lz4",
            CompressionType::Zstd => "zstd",
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

/// Validated topic definition: the input to `create_topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: i32,
    /// `-1` means infinite retention, matching Kafka's own sentinel.
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,
    #[serde(default)]
    pub compression_type: CompressionType,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: i64,
    #[serde(default = "default_min_insync_replicas")]
    pub min_insync_replicas: i32,
    #[serde(default)]
    pub custom_configs: HashMap<String, String>,
}

fn default_partitions() -> i32 {
    3
}

fn default_replication_factor() -> i32 {
    1
}

fn default_retention_ms() -> i64 {
    DEFAULT_RETENTION_MS
}

fn default_max_message_bytes() -> i64 {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_min_insync_replicas() -> i32 {
    1
}

impl TopicSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            retention_ms: default_retention_ms(),
            cleanup_policy: CleanupPolicy::default(),
            compression_type: CompressionType::default(),
            max_message_bytes: default_max_message_bytes(),
            min_insync_replicas: default_min_insync_replicas(),
            custom_configs: HashMap::new(),
        }
    }

    /// Mirrors `original_source`'s `TopicConfig` validator: name shape,
    /// numeric ranges, and the min-insync-vs-replication-factor constraint.
    pub fn validate(&self) -> Result<()> {
        validate_topic_name(&self.name)?;

        if !(1..=1000).contains(&self.partitions) {
            return Err(KafkaOpsError::validation(
                format!("partitions must be in 1..1000, got {}", self.partitions),
                Some("partitions"),
            ));
        }
        if !(1..=10).contains(&self.replication_factor) {
            return Err(KafkaOpsError::validation(
                format!("replication_factor must be in 1..10, got {}", self.replication_factor),
                Some("replication_factor"),
            ));
        }
        if self.retention_ms != -1 && self.retention_ms < 1 {
            return Err(KafkaOpsError::validation(
                format!("retention_ms must be -1 (infinite) or >= 1, got {}", self.retention_ms),
                Some("retention_ms"),
            ));
        }
        if !(MIN_MAX_MESSAGE_BYTES..=MAX_MAX_MESSAGE_BYTES).contains(&self.max_message_bytes) {
            return Err(KafkaOpsError::validation(
                format!(
                    "max_message_bytes must be in {}..{}, got {}",
                    MIN_MAX_MESSAGE_BYTES, MAX_MAX_MESSAGE_BYTES, self.max_message_bytes
                ),
                Some("max_message_bytes"),
            ));
        }
        if self.min_insync_replicas < 1 {
            return Err(KafkaOpsError::validation(
                "min_insync_replicas must be >= 1",
                Some("min_insync_replicas"),
            ));
        }
        if self.min_insync_replicas > self.replication_factor {
            return Err(KafkaOpsError::validation(
                format!(
                    "min_insync_replicas ({}) must not exceed replication_factor ({})",
                    self.min_insync_replicas, self.replication_factor
                ),
                Some("min_insync_replicas"),
            ));
        }
        Ok(())
    }

    /// True when the spec carries anything beyond Kafka's own defaults,
    /// which triggers a follow-up `alter_configs` after create.
    pub fn has_non_default_configs(&self) -> bool {
        self.retention_ms != DEFAULT_RETENTION_MS
            || self.cleanup_policy != CleanupPolicy::Delete
            || self.compression_type != CompressionType::None
            || self.max_message_bytes != DEFAULT_MAX_MESSAGE_BYTES
            || self.min_insync_replicas != 1
            || !self.custom_configs.is_empty()
    }

    /// The broker config map implied by this spec, for `alter_configs` /
    /// `set_config` on `NewTopic`.
    pub fn to_config_map(&self) -> HashMap<String, String> {
        let mut configs = HashMap::new();
        configs.insert("retention.ms".to_string(), self.retention_ms.to_string());
        configs.insert("cleanup.policy".to_string(), self.cleanup_policy.as_kafka_value().to_string());
        configs.insert("compression.type".to_string(), self.compression_type.as_kafka_value().to_string());
        configs.insert("max.message.bytes".to_string(), self.max_message_bytes.to_string());
        configs.insert("min.insync.replicas".to_string(), self.min_insync_replicas.to_string());
        for (k, v) in &self.custom_configs {
            configs.insert(k.clone(), v.clone());
        }
        configs
    }
}

/// Rejects characters and shapes that are illegal or merely confusing in a
/// Kafka topic name, matching `original_source`'s validator.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 249 {
        return Err(KafkaOpsError::validation(
            format!("topic name must be 1..249 characters, got {}", name.len()),
            Some("name"),
        ));
    }
    if name == "." || name == ".." {
        return Err(KafkaOpsError::validation(
            format!("topic name '{name}' is not allowed"),
            Some("name"),
        ));
    }
    if name.starts_with("__") {
        return Err(KafkaOpsError::validation(
            "topic names starting with '__' are reserved for internal topics",
            Some("name"),
        ));
    }
    const FORBIDDEN: &[char] = &['/', '\\', ',', ':', '"', '\'', ';', '*', '?', ' ', '\t', '\r', '\n', '\0', '='];
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(KafkaOpsError::validation(
            format!("topic name contains forbidden character '{c}'"),
            Some("name"),
        ));
    }
    Ok(())
}

/// Rejects anything outside the updatable config allowlist.
pub fn validate_updatable_configs(configs: &HashMap<String, String>) -> Result<()> {
    for key in configs.keys() {
        if !UPDATABLE_CONFIG_KEYS.contains(&key.as_str()) {
            return Err(KafkaOpsError::new(
                format!("'{key}' is not an updatable topic config"),
                ErrorCode::InvalidTopicConfig,
            )
            .with_detail("key", key.clone()));
        }
    }
    Ok(())
}

/// A single partition's observable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDetail {
    pub partition: i32,
    /// `-1` when the partition has no leader (matches rdkafka's own sentinel).
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub in_sync_replicas: Vec<i32>,
}

/// Observable topic state, as returned by `describe_topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDescription {
    pub name: String,
    pub partition_count: usize,
    pub replication_factor: usize,
    pub configs: HashMap<String, String>,
    pub partitions: Vec<PartitionDetail>,
    pub total_message_count: Option<u64>,
    pub total_size_bytes: Option<u64>,
}

/// Summary row for `list_topics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSummary {
    pub name: String,
    pub partition_count: usize,
    pub is_internal: bool,
}

/// Outcome of a single-topic operation (create/delete/update/purge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicOperationResult {
    pub success: bool,
    pub message: String,
    pub topic_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TopicOperationResult {
    pub fn ok(topic_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), topic_name: topic_name.into(), error_code: None, details: None }
    }

    pub fn ok_with_details(topic_name: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self { success: true, message: message.into(), topic_name: topic_name.into(), error_code: None, details: Some(details) }
    }

    pub fn failed(topic_name: impl Into<String>, message: impl Into<String>, code: ErrorCode) -> Self {
        Self { success: false, message: message.into(), topic_name: topic_name.into(), error_code: Some(code), details: None }
    }
}

/// Aggregate outcome of a bulk operation, alongside the per-topic map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BulkOperationSummary {
    pub fn tally(results: &HashMap<String, TopicOperationResult>) -> Self {
        let successful = results.values().filter(|r| r.success).count();
        Self { total: results.len(), successful, failed: results.len() - successful }
    }
}

/// Snapshot returned by `get_cluster_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: String,
    pub broker_count: usize,
    pub topic_count: usize,
    pub brokers: Vec<BrokerInfo>,
    pub controller_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_valid() {
        let spec = TopicSpec::new("orders");
        assert!(spec.validate().is_ok());
        assert!(!spec.has_non_default_configs());
    }

    #[test]
    fn rejects_internal_prefixed_names() {
        assert!(validate_topic_name("__consumer_offsets").is_err());
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert!(validate_topic_name("orders/eu").is_err());
        assert!(validate_topic_name("orders europe").is_err());
    }

    #[test]
    fn rejects_min_insync_above_replication_factor() {
        let mut spec = TopicSpec::new("orders");
        spec.replication_factor = 1;
        spec.min_insync_replicas = 2;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn non_default_retention_requires_alter_configs() {
        let mut spec = TopicSpec::new("orders");
        spec.retention_ms = 3_600_000;
        assert!(spec.has_non_default_configs());
    }

    #[test]
    fn updatable_config_allowlist_rejects_unknown_keys() {
        let mut configs = HashMap::new();
        configs.insert("unsupported.key".to_string(), "v".to_string());
        let err = validate_updatable_configs(&configs).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTopicConfig);
    }

    #[test]
    fn updatable_config_allowlist_accepts_known_keys() {
        let mut configs = HashMap::new();
        configs.insert("retention.ms".to_string(), "3600000".to_string());
        assert!(validate_updatable_configs(&configs).is_ok());
    }

    #[test]
    fn bulk_summary_tallies_successes_and_failures() {
        let mut results = HashMap::new();
        results.insert("a".to_string(), TopicOperationResult::ok("a", "created"));
        results.insert(
            "b".to_string(),
            TopicOperationResult::failed("b", "boom", ErrorCode::TopicCreationFailed),
        );
        let summary = BulkOperationSummary::tally(&results);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
    }
}
