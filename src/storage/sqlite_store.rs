//! Single-file embedded `MetadataStore`/`AuditStore`, backed by SQLite.
//!
//! Same table/index layout as `postgres_store`, using TEXT in place of
//! JSONB and TIMESTAMPTZ (SQLite has neither). Meant for local development
//! and tests, matching `original_source`'s sqlite configuration option in
//! `config/model.rs`.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, KafkaOpsError, Result};

use super::model::{ClusterStatus, ConnectionInfo, InstanceFilters, RuntimeProviderKind, ServiceInstance};
use super::{AuditEntry, AuditStore, MetadataStore};

fn storage_err(context: &str, e: sqlx::Error) -> KafkaOpsError {
    KafkaOpsError::new(format!("{context}: {e}"), ErrorCode::StorageOperationFailed).with_cause(e)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e.as_database_error().and_then(|d| d.code()), Some(code) if code == "1555" || code == "2067")
}

pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// `path` may be a filesystem path or the literal `:memory:`.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = if path == ":memory:" {
            SqliteConnectOptions::from_str(":memory:").unwrap()
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        KafkaOpsError::new(
                            format!("failed to create database directory: {e}"),
                            ErrorCode::StorageConnectionError,
                        )
                    })?;
                }
            }
            SqliteConnectOptions::new().filename(path).create_if_missing(true)
        }
        .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if path == ":memory:" { 1 } else { 5 })
            .connect_with(options)
            .await
            .map_err(|e| {
                KafkaOpsError::new(format!("failed to open SQLite store: {e}"), ErrorCode::StorageConnectionError).with_cause(e)
            })?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS service_instances (
                instance_id TEXT PRIMARY KEY,
                service_id TEXT NOT NULL,
                plan_id TEXT NOT NULL,
                organization_guid TEXT NOT NULL,
                space_guid TEXT NOT NULL,
                parameters TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                connection_info TEXT,
                runtime_provider TEXT NOT NULL,
                runtime_config TEXT NOT NULL,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("failed to create service_instances", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id TEXT,
                operation TEXT NOT NULL,
                user_id TEXT,
                details TEXT,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (instance_id) REFERENCES service_instances (instance_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("failed to create audit_logs", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_instances_status ON service_instances (status)")
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("failed to create status index", e))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_instances_created ON service_instances (created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("failed to create created_at index", e))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_instance_timestamp ON audit_logs (instance_id, timestamp)")
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("failed to create audit index", e))?;

        info!("SQLite metadata store tables ready");
        Ok(())
    }

    fn row_to_instance(row: &SqliteRow) -> Result<ServiceInstance> {
        let status_raw: String = row.try_get("status").map_err(|e| storage_err("reading status", e))?;
        let provider_raw: String = row
            .try_get("runtime_provider")
            .map_err(|e| storage_err("reading runtime_provider", e))?;
        let parameters_raw: String = row.try_get("parameters").map_err(|e| storage_err("reading parameters", e))?;
        let runtime_config_raw: String = row
            .try_get("runtime_config")
            .map_err(|e| storage_err("reading runtime_config", e))?;
        let connection_info: Option<Json<ConnectionInfo>> = row
            .try_get("connection_info")
            .map_err(|e| storage_err("reading connection_info", e))?;

        Ok(ServiceInstance {
            instance_id: row.try_get("instance_id").map_err(|e| storage_err("reading instance_id", e))?,
            service_id: row.try_get("service_id").map_err(|e| storage_err("reading service_id", e))?,
            plan_id: row.try_get("plan_id").map_err(|e| storage_err("reading plan_id", e))?,
            organization_guid: row
                .try_get("organization_guid")
                .map_err(|e| storage_err("reading organization_guid", e))?,
            space_guid: row.try_get("space_guid").map_err(|e| storage_err("reading space_guid", e))?,
            parameters: serde_json::from_str(&parameters_raw).unwrap_or_default(),
            status: ClusterStatus::from_str(&status_raw)
                .map_err(|e| KafkaOpsError::new(e, ErrorCode::StorageOperationFailed))?,
            created_at: row.try_get("created_at").map_err(|e| storage_err("reading created_at", e))?,
            updated_at: row.try_get("updated_at").map_err(|e| storage_err("reading updated_at", e))?,
            connection_info: connection_info.map(|Json(inner)| inner),
            runtime_provider: RuntimeProviderKind::from_str(&provider_raw)
                .map_err(|e| KafkaOpsError::new(e, ErrorCode::StorageOperationFailed))?,
            runtime_config: serde_json::from_str(&runtime_config_raw).unwrap_or_default(),
            error_message: row.try_get("error_message").map_err(|e| storage_err("reading error_message", e))?,
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create_instance(&self, instance: &ServiceInstance) -> Result<()> {
        let parameters = serde_json::to_string(&instance.parameters).unwrap_or_default();
        let runtime_config = serde_json::to_string(&instance.runtime_config).unwrap_or_default();

        let result = sqlx::query(
            r#"
            INSERT INTO service_instances (
                instance_id, service_id, plan_id, organization_guid, space_guid,
                parameters, status, created_at, updated_at, connection_info,
                runtime_provider, runtime_config, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&instance.instance_id)
        .bind(&instance.service_id)
        .bind(&instance.plan_id)
        .bind(&instance.organization_guid)
        .bind(&instance.space_guid)
        .bind(parameters)
        .bind(instance.status.to_string())
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .bind(instance.connection_info.as_ref().map(Json))
        .bind(instance.runtime_provider.to_string())
        .bind(runtime_config)
        .bind(&instance.error_message)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!(instance_id = %instance.instance_id, "created service instance");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(KafkaOpsError::instance_already_exists(&instance.instance_id)),
            Err(e) => Err(storage_err("failed to create instance", e)),
        }
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>> {
        let row = sqlx::query("SELECT * FROM service_instances WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("failed to get instance", e))?;

        row.as_ref().map(Self::row_to_instance).transpose()
    }

    async fn update_instance(&self, instance: &ServiceInstance) -> Result<bool> {
        let parameters = serde_json::to_string(&instance.parameters).unwrap_or_default();
        let runtime_config = serde_json::to_string(&instance.runtime_config).unwrap_or_default();

        let result = sqlx::query(
            r#"
            UPDATE service_instances SET
                service_id = ?, plan_id = ?, organization_guid = ?, space_guid = ?,
                parameters = ?, status = ?, updated_at = ?, connection_info = ?,
                runtime_provider = ?, runtime_config = ?, error_message = ?
            WHERE instance_id = ?
            "#,
        )
        .bind(&instance.service_id)
        .bind(&instance.plan_id)
        .bind(&instance.organization_guid)
        .bind(&instance.space_guid)
        .bind(parameters)
        .bind(instance.status.to_string())
        .bind(instance.updated_at)
        .bind(instance.connection_info.as_ref().map(Json))
        .bind(instance.runtime_provider.to_string())
        .bind(runtime_config)
        .bind(&instance.error_message)
        .bind(&instance.instance_id)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("failed to update instance", e))?;

        if result.rows_affected() == 0 {
            warn!(instance_id = %instance.instance_id, "update affected no rows");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM service_instances WHERE instance_id = ?")
            .bind(instance_id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("failed to delete instance", e))?;

        if result.rows_affected() > 0 {
            info!(instance_id, "deleted service instance");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn list_instances(&self, filters: &InstanceFilters) -> Result<Vec<ServiceInstance>> {
        let mut conditions = Vec::new();
        let mut status_bind = None;
        let mut provider_bind = None;
        let mut service_bind = None;

        if let Some(status) = filters.status {
            conditions.push("status = ?");
            status_bind = Some(status.to_string());
        }
        if let Some(provider) = filters.runtime_provider {
            conditions.push("runtime_provider = ?");
            provider_bind = Some(provider.to_string());
        }
        if let Some(service_id) = &filters.service_id {
            conditions.push("service_id = ?");
            service_bind = Some(service_id.clone());
        }

        let mut query = "SELECT * FROM service_instances".to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query(&query);
        if let Some(v) = &status_bind {
            q = q.bind(v);
        }
        if let Some(v) = &provider_bind {
            q = q.bind(v);
        }
        if let Some(v) = &service_bind {
            q = q.bind(v);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(|e| storage_err("failed to list instances", e))?;
        rows.iter().map(Self::row_to_instance).collect()
    }

    async fn instance_exists(&self, instance_id: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM service_instances WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("failed to check instance existence", e))?;
        Ok(found.is_some())
    }
}

pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(metadata_store: &SqliteMetadataStore) -> Self {
        Self {
            pool: metadata_store.pool().clone(),
        }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn log(
        &self,
        instance_id: Option<&str>,
        operation: &str,
        user_id: Option<&str>,
        details: Option<Value>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO audit_logs (instance_id, operation, user_id, details, timestamp) VALUES (?, ?, ?, ?, ?)")
            .bind(instance_id)
            .bind(operation)
            .bind(user_id)
            .bind(details.map(|d| d.to_string()))
            .bind(chrono::Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_err("failed to log audit entry", e))?;

        debug!(operation, instance_id, "logged audit entry");
        Ok(())
    }

    async fn query(
        &self,
        instance_id: Option<&str>,
        operation: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>> {
        let mut conditions = Vec::new();
        if instance_id.is_some() {
            conditions.push("instance_id = ?");
        }
        if operation.is_some() {
            conditions.push("operation = ?");
        }

        let mut query = "SELECT * FROM audit_logs".to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ?");

        let mut q = sqlx::query(&query);
        if let Some(id) = instance_id {
            q = q.bind(id);
        }
        if let Some(op) = operation {
            q = q.bind(op);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(|e| storage_err("failed to query audit log", e))?;

        rows.into_iter()
            .map(|row| {
                let details_raw: Option<String> = row.try_get("details").map_err(|e| storage_err("reading details", e))?;
                Ok(AuditEntry {
                    id: row.try_get("id").map_err(|e| storage_err("reading id", e))?,
                    instance_id: row.try_get("instance_id").map_err(|e| storage_err("reading instance_id", e))?,
                    operation: row.try_get("operation").map_err(|e| storage_err("reading operation", e))?,
                    user_id: row.try_get("user_id").map_err(|e| storage_err("reading user_id", e))?,
                    details: details_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
                    timestamp: row.try_get("timestamp").map_err(|e| storage_err("reading timestamp", e))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::model::RuntimeProviderKind;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let instance = ServiceInstance::new("i-1", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        store.create_instance(&instance).await.unwrap();

        let fetched = store.get_instance("i-1").await.unwrap().unwrap();
        assert_eq!(fetched.instance_id, "i-1");
        assert_eq!(fetched.status, ClusterStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let instance = ServiceInstance::new("i-1", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        store.create_instance(&instance).await.unwrap();

        let err = store.create_instance(&instance).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InstanceAlreadyExists);
    }

    #[tokio::test]
    async fn delete_removes_row_and_is_idempotent_false() {
        let store = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let instance = ServiceInstance::new("i-1", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        store.create_instance(&instance).await.unwrap();

        assert!(store.delete_instance("i-1").await.unwrap());
        assert!(store.get_instance("i-1").await.unwrap().is_none());
        assert!(!store.delete_instance("i-1").await.unwrap());
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let mut running = ServiceInstance::new("i-running", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        running.status = ClusterStatus::Running;
        running.connection_info = Some(ConnectionInfo {
            bootstrap_servers: vec!["localhost:9092".into()],
            coordinator_connect: "localhost:2181".into(),
            ssl: None,
            sasl: None,
        });
        let pending = ServiceInstance::new("i-pending", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);

        store.create_instance(&running).await.unwrap();
        store.create_instance(&pending).await.unwrap();

        let running_only = store.list_by_status(ClusterStatus::Running).await.unwrap();
        assert_eq!(running_only.len(), 1);
        assert_eq!(running_only[0].instance_id, "i-running");
    }

    #[tokio::test]
    async fn audit_log_query_is_most_recent_first() {
        let metadata = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let instance = ServiceInstance::new("i-1", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        metadata.create_instance(&instance).await.unwrap();

        let audit = SqliteAuditStore::new(&metadata);
        audit.log(Some("i-1"), "provision_start", None, None).await.unwrap();
        audit.log(Some("i-1"), "provision_success", None, None).await.unwrap();

        let entries = audit.query(Some("i-1"), None, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, "provision_success");
    }

    #[tokio::test]
    async fn audit_rows_cascade_delete_with_instance() {
        let metadata = SqliteMetadataStore::connect(":memory:").await.unwrap();
        let instance = ServiceInstance::new("i-1", "kafka", "basic", "org-1", "space-1", RuntimeProviderKind::ContainerEngine);
        metadata.create_instance(&instance).await.unwrap();

        let audit = SqliteAuditStore::new(&metadata);
        audit.log(Some("i-1"), "provision_start", None, None).await.unwrap();

        metadata.delete_instance("i-1").await.unwrap();

        let entries = audit.query(Some("i-1"), None, 10).await.unwrap();
        assert!(entries.is_empty());
    }
}
