//! Error taxonomy
//!
//! A closed set of error codes and a single error type carried through the
//! admin pool, topic service, orchestrator and scheduler. Call sites that
//! don't need to match on a specific variant use `anyhow::Result` instead.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable error codes surfaced in API responses and audit log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    ValidationError,
    ConfigurationError,

    AuthenticationFailed,
    AuthorizationFailed,
    InvalidApiKey,

    KafkaConnectionError,
    KafkaTimeoutError,
    KafkaAuthenticationError,
    KafkaAuthorizationError,

    TopicNotFound,
    TopicAlreadyExists,
    TopicCreationFailed,
    TopicDeletionFailed,
    TopicConfigUpdateFailed,
    InvalidTopicConfig,

    ClusterNotFound,
    ClusterNotAvailable,
    ClusterProvisioningFailed,
    ClusterDeprovisioningFailed,
    ClusterHealthCheckFailed,
    InsufficientResources,

    ConnectionFailed,

    StorageConnectionError,
    StorageOperationFailed,
    MigrationFailed,

    ProviderNotFound,
    ProviderInitializationFailed,
    ProviderOperationFailed,

    ServiceNotFound,
    PlanNotFound,
    InstanceNotFound,
    InstanceAlreadyExists,
    OperationInProgress,

    RateLimitExceeded,
    RequestThrottled,

    CleanupConflict,
    CleanupFailed,
    SchedulerError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self).unwrap_or(Value::Null);
        write!(f, "{}", s.as_str().unwrap_or("UNKNOWN"))
    }
}

impl ErrorCode {
    /// Canonical HTTP status mapping for the topic-management API's
    /// `http_status` field and the marketplace API's response codes.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidTopicConfig | ErrorCode::ConfigurationError => 400,
            ErrorCode::AuthenticationFailed | ErrorCode::InvalidApiKey => 401,
            ErrorCode::AuthorizationFailed => 403,
            ErrorCode::TopicNotFound
            | ErrorCode::ClusterNotFound
            | ErrorCode::ServiceNotFound
            | ErrorCode::PlanNotFound
            | ErrorCode::InstanceNotFound
            | ErrorCode::ProviderNotFound => 404,
            ErrorCode::TopicAlreadyExists | ErrorCode::InstanceAlreadyExists | ErrorCode::OperationInProgress | ErrorCode::CleanupConflict => 409,
            ErrorCode::RateLimitExceeded | ErrorCode::RequestThrottled => 429,
            ErrorCode::ClusterNotAvailable | ErrorCode::ConnectionFailed | ErrorCode::KafkaConnectionError | ErrorCode::KafkaTimeoutError => 503,
            _ => 500,
        }
    }
}

/// The crate's single error type. Carries a code, a human message, a bag of
/// structured context (`details`), and an optional upstream cause.
#[derive(Debug, Error)]
#[error("{code}: {message}{}", format_details(.details))]
pub struct KafkaOpsError {
    pub code: ErrorCode,
    pub message: String,
    pub details: HashMap<String, Value>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

fn format_details(details: &HashMap<String, Value>) -> String {
    if details.is_empty() {
        String::new()
    } else {
        let mut pairs: Vec<_> = details.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let joined = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        format!(" ({})", joined)
    }
}

impl KafkaOpsError {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
            cause: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        let mut err = Self::new(message, ErrorCode::ValidationError);
        if let Some(field) = field {
            err = err.with_detail("field", field);
        }
        err
    }

    pub fn configuration(message: impl Into<String>, config_key: Option<&str>) -> Self {
        let mut err = Self::new(message, ErrorCode::ConfigurationError);
        if let Some(key) = config_key {
            err = err.with_detail("config_key", key);
        }
        err
    }

    pub fn topic_not_found(topic_name: &str) -> Self {
        Self::new(format!("Topic '{topic_name}' not found"), ErrorCode::TopicNotFound)
            .with_detail("topic_name", topic_name)
    }

    pub fn topic_already_exists(topic_name: &str) -> Self {
        Self::new(
            format!("Topic '{topic_name}' already exists"),
            ErrorCode::TopicAlreadyExists,
        )
        .with_detail("topic_name", topic_name)
    }

    pub fn cluster_not_found(cluster_id: &str) -> Self {
        Self::new(format!("Cluster '{cluster_id}' not found"), ErrorCode::ClusterNotFound)
            .with_detail("cluster_id", cluster_id)
    }

    pub fn instance_not_found(instance_id: &str) -> Self {
        Self::new(
            format!("Service instance '{instance_id}' not found"),
            ErrorCode::InstanceNotFound,
        )
        .with_detail("instance_id", instance_id)
    }

    pub fn instance_already_exists(instance_id: &str) -> Self {
        Self::new(
            format!("Service instance '{instance_id}' already exists"),
            ErrorCode::InstanceAlreadyExists,
        )
        .with_detail("instance_id", instance_id)
    }

    pub fn cluster_not_available(cluster_id: &str, status: impl fmt::Display) -> Self {
        Self::new(
            format!("Cluster '{cluster_id}' is not available (status={status})"),
            ErrorCode::ClusterNotAvailable,
        )
        .with_detail("cluster_id", cluster_id)
    }

    pub fn connection_failed(cluster_id: &str) -> Self {
        Self::new(
            format!("No pooled connection available for cluster '{cluster_id}'"),
            ErrorCode::ConnectionFailed,
        )
        .with_detail("cluster_id", cluster_id)
    }

    /// Mirrors `original_source`'s `should_retry`: a fixed set of error codes
    /// is never worth retrying because retrying can't change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.code,
            ErrorCode::ValidationError
                | ErrorCode::AuthenticationFailed
                | ErrorCode::AuthorizationFailed
                | ErrorCode::TopicAlreadyExists
                | ErrorCode::InstanceAlreadyExists
                | ErrorCode::TopicNotFound
                | ErrorCode::InstanceNotFound
        )
    }

    /// Standardized API error body, matching `KafkaOpsError.to_dict()`.
    /// Sensitive detail keys (password/secret/key/token/credential
    /// substrings) are masked unless `reveal_sensitive` is set.
    pub fn to_response(&self, reveal_sensitive: bool) -> Value {
        let details = if reveal_sensitive { self.details.clone() } else { mask_sensitive_details(&self.details) };
        let mut body = serde_json::json!({
            "error": self.code.to_string(),
            "message": self.message,
            "details": details,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(cause) = &self.cause {
            body["cause"] = Value::String(cause.to_string());
        }
        body
    }

    /// The topic-management API's error shape: `{success:false, error_code,
    /// message, details?, timestamp, http_status}`.
    pub fn to_topic_api_response(&self, reveal_sensitive: bool) -> Value {
        let details = if reveal_sensitive { self.details.clone() } else { mask_sensitive_details(&self.details) };
        serde_json::json!({
            "success": false,
            "error_code": self.code.to_string(),
            "message": self.message,
            "details": details,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "http_status": self.code.http_status(),
        })
    }
}

/// Substrings that mark a detail key as sensitive, per §7's masking rule.
const SENSITIVE_DETAIL_SUBSTRINGS: &[&str] = &["password", "secret", "key", "token", "credential"];

fn mask_sensitive_details(details: &HashMap<String, Value>) -> HashMap<String, Value> {
    details
        .iter()
        .map(|(k, v)| {
            let masked = if SENSITIVE_DETAIL_SUBSTRINGS.iter().any(|s| k.to_lowercase().contains(s)) {
                Value::String("***MASKED***".to_string())
            } else {
                v.clone()
            };
            (k.clone(), masked)
        })
        .collect()
}

pub type Result<T> = std::result::Result<T, KafkaOpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_retryable_codes_match_original() {
        let err = KafkaOpsError::topic_not_found("orders");
        assert!(!err.is_retryable());
        let err = KafkaOpsError::new("boom", ErrorCode::KafkaTimeoutError);
        assert!(err.is_retryable());
    }

    #[test]
    fn response_includes_details_and_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = KafkaOpsError::new("write failed", ErrorCode::StorageOperationFailed)
            .with_detail("operation", "append")
            .with_cause(io_err);
        let body = err.to_response(false);
        assert_eq!(body["error"], "STORAGE_OPERATION_FAILED");
        assert_eq!(body["details"]["operation"], "append");
        assert!(body["cause"].as_str().unwrap().contains("disk full"));
    }

    #[test]
    fn topic_api_response_carries_http_status_and_success_false() {
        let err = KafkaOpsError::topic_not_found("orders");
        let body = err.to_topic_api_response(false);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], "TOPIC_NOT_FOUND");
        assert_eq!(body["http_status"], 404);
    }

    #[test]
    fn response_masks_sensitive_detail_keys_by_default() {
        let err = KafkaOpsError::new("auth failed", ErrorCode::AuthenticationFailed).with_detail("api_key", "sk-12345");
        let body = err.to_response(false);
        assert_eq!(body["details"]["api_key"], "***MASKED***");
        let revealed = err.to_response(true);
        assert_eq!(revealed["details"]["api_key"], "sk-12345");
    }

    #[test]
    fn display_formats_details_sorted() {
        let err = KafkaOpsError::new("bad", ErrorCode::ValidationError)
            .with_detail("b", "2")
            .with_detail("a", "1");
        let rendered = err.to_string();
        assert!(rendered.contains("a=\"1\""));
        assert!(rendered.find("a=").unwrap() < rendered.find("b=").unwrap());
    }
}
