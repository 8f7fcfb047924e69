//! Storage data model
//!
//! `ServiceInstance` is the persisted record for one provisioned cluster;
//! `AuditEntry` is an append-only log row. Both travel through either
//! storage backend unchanged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Pending,
    Creating,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterStatus::Pending => "pending",
            ClusterStatus::Creating => "creating",
            ClusterStatus::Running => "running",
            ClusterStatus::Stopping => "stopping",
            ClusterStatus::Stopped => "stopped",
            ClusterStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ClusterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClusterStatus::Pending),
            "creating" => Ok(ClusterStatus::Creating),
            "running" => Ok(ClusterStatus::Running),
            "stopping" => Ok(ClusterStatus::Stopping),
            "stopped" => Ok(ClusterStatus::Stopped),
            "error" => Ok(ClusterStatus::Error),
            other => Err(format!("unrecognized cluster status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeProviderKind {
    ContainerEngine,
    Orchestrator,
    Iaas,
}

impl std::fmt::Display for RuntimeProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuntimeProviderKind::ContainerEngine => "container-engine",
            RuntimeProviderKind::Orchestrator => "orchestrator",
            RuntimeProviderKind::Iaas => "iaas",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RuntimeProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "container-engine" => Ok(RuntimeProviderKind::ContainerEngine),
            "orchestrator" => Ok(RuntimeProviderKind::Orchestrator),
            "iaas" => Ok(RuntimeProviderKind::Iaas),
            other => Err(format!("unrecognized runtime provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
    Gssapi,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SslMaterial {
    pub keystore_location: Option<String>,
    pub keystore_password: Option<String>,
    pub truststore_location: Option<String>,
    pub truststore_password: Option<String>,
    pub key_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaslMaterial {
    pub mechanism: SaslMechanism,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub bootstrap_servers: Vec<String>,
    pub coordinator_connect: String,
    pub ssl: Option<SslMaterial>,
    pub sasl: Option<SaslMaterial>,
}

/// One provisioned Kafka cluster, as persisted by a `MetadataStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub parameters: HashMap<String, Value>,
    pub status: ClusterStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub connection_info: Option<ConnectionInfo>,
    pub runtime_provider: RuntimeProviderKind,
    pub runtime_config: HashMap<String, Value>,
    pub error_message: Option<String>,
}

impl ServiceInstance {
    pub fn new(
        instance_id: impl Into<String>,
        service_id: impl Into<String>,
        plan_id: impl Into<String>,
        organization_guid: impl Into<String>,
        space_guid: impl Into<String>,
        runtime_provider: RuntimeProviderKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.into(),
            service_id: service_id.into(),
            plan_id: plan_id.into(),
            organization_guid: organization_guid.into(),
            space_guid: space_guid.into(),
            parameters: HashMap::new(),
            status: ClusterStatus::Pending,
            created_at: now,
            updated_at: now,
            connection_info: None,
            runtime_provider,
            runtime_config: HashMap::new(),
            error_message: None,
        }
    }

    /// `status=running ⇒ connection_info ≠ ∅` and `status=error ⇒ error_message ≠ ∅`.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status == ClusterStatus::Running && self.connection_info.is_none() {
            return Err("instance marked running with no connection_info".to_string());
        }
        if self.status == ClusterStatus::Error && self.error_message.is_none() {
            return Err("instance marked error with no error_message".to_string());
        }
        Ok(())
    }
}

/// One row in the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub instance_id: Option<String>,
    pub operation: String,
    pub user_id: Option<String>,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceFilters {
    pub status: Option<ClusterStatus>,
    pub runtime_provider: Option<RuntimeProviderKind>,
    pub service_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_without_connection_info_violates_invariant() {
        let mut instance = ServiceInstance::new("i-1", "kafka", "basic", "org", "space", RuntimeProviderKind::ContainerEngine);
        instance.status = ClusterStatus::Running;
        assert!(instance.check_invariants().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ClusterStatus::Pending,
            ClusterStatus::Creating,
            ClusterStatus::Running,
            ClusterStatus::Stopping,
            ClusterStatus::Stopped,
            ClusterStatus::Error,
        ] {
            let parsed: ClusterStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
