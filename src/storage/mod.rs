//! Metadata & audit store (C3)
//!
//! The core treats storage as two abstract interfaces so the rest of the
//! crate never depends on which backend is active. Two implementations are
//! provided: `sqlite_store` (single-file, for dev/test) and `postgres_store`
//! (relational, for production), matching the teacher's own pattern of a
//! thin trait plus swappable adapters (`src/adapters/mod.rs`).

pub mod model;
pub mod postgres_store;
pub mod sqlite_store;

use async_trait::async_trait;

use crate::error::Result;

pub use model::{
    AuditEntry, ClusterStatus, ConnectionInfo, InstanceFilters, RuntimeProviderKind, SaslMaterial,
    SaslMechanism, ServiceInstance, SslMaterial,
};
pub use postgres_store::{PostgresAuditStore, PostgresMetadataStore};
pub use sqlite_store::{SqliteAuditStore, SqliteMetadataStore};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create_instance(&self, instance: &ServiceInstance) -> Result<()>;
    async fn get_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>>;
    async fn update_instance(&self, instance: &ServiceInstance) -> Result<bool>;
    async fn delete_instance(&self, instance_id: &str) -> Result<bool>;
    async fn list_instances(&self, filters: &InstanceFilters) -> Result<Vec<ServiceInstance>>;
    async fn instance_exists(&self, instance_id: &str) -> Result<bool>;
    async fn list_by_status(&self, status: ClusterStatus) -> Result<Vec<ServiceInstance>> {
        self.list_instances(&InstanceFilters {
            status: Some(status),
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn log(
        &self,
        instance_id: Option<&str>,
        operation: &str,
        user_id: Option<&str>,
        details: Option<serde_json::Value>,
    ) -> Result<()>;

    async fn query(
        &self,
        instance_id: Option<&str>,
        operation: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>>;
}
