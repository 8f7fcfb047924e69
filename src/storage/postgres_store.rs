//! Relational `MetadataStore`/`AuditStore`, backed by PostgreSQL.
//!
//! Table layout and indexes match the single source of truth documented in
//! §6 of the storage contract: `service_instances` keyed by `instance_id`,
//! `audit_logs` cascade-deleted with the instance it references.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
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
    matches!(e.as_database_error().and_then(|d| d.code()), Some(code) if code == "23505")
}

pub struct PostgresMetadataStore {
    pool: PgPool,
}

impl PostgresMetadataStore {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(connection_string)
            .await
            .map_err(|e| {
                KafkaOpsError::new(format!("failed to connect to PostgreSQL: {e}"), ErrorCode::StorageConnectionError)
                    .with_cause(e)
            })?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
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
                parameters JSONB NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                connection_info JSONB,
                runtime_provider TEXT NOT NULL,
                runtime_config JSONB NOT NULL,
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
                id BIGSERIAL PRIMARY KEY,
                instance_id TEXT,
                operation TEXT NOT NULL,
                user_id TEXT,
                details JSONB,
                timestamp TIMESTAMPTZ NOT NULL,
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

        info!("PostgreSQL metadata store tables ready");
        Ok(())
    }

    fn row_to_instance(row: &PgRow) -> Result<ServiceInstance> {
        let status_raw: String = row.try_get("status").map_err(|e| storage_err("reading status", e))?;
        let provider_raw: String = row
            .try_get("runtime_provider")
            .map_err(|e| storage_err("reading runtime_provider", e))?;
        let parameters: Value = row.try_get("parameters").map_err(|e| storage_err("reading parameters", e))?;
        let runtime_config: Value = row
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
            parameters: serde_json::from_value(parameters).unwrap_or_default(),
            status: ClusterStatus::from_str(&status_raw)
                .map_err(|e| KafkaOpsError::new(e, ErrorCode::StorageOperationFailed))?,
            created_at: row.try_get("created_at").map_err(|e| storage_err("reading created_at", e))?,
            updated_at: row.try_get("updated_at").map_err(|e| storage_err("reading updated_at", e))?,
            connection_info: connection_info.map(|Json(inner)| inner),
            runtime_provider: RuntimeProviderKind::from_str(&provider_raw)
                .map_err(|e| KafkaOpsError::new(e, ErrorCode::StorageOperationFailed))?,
            runtime_config: serde_json::from_value(runtime_config).unwrap_or_default(),
            error_message: row.try_get("error_message").map_err(|e| storage_err("reading error_message", e))?,
        })
    }

    fn filter_clause(filters: &InstanceFilters) -> (String, Vec<(String, String)>) {
        let mut conditions = Vec::new();
        let mut bind_values = Vec::new();
        if let Some(status) = filters.status {
            conditions.push("status".to_string());
            bind_values.push(("status".to_string(), status.to_string()));
        }
        if let Some(provider) = filters.runtime_provider {
            conditions.push("runtime_provider".to_string());
            bind_values.push(("runtime_provider".to_string(), provider.to_string()));
        }
        if let Some(service_id) = &filters.service_id {
            conditions.push("service_id".to_string());
            bind_values.push(("service_id".to_string(), service_id.clone()));
        }
        (conditions.join(" AND "), bind_values)
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn create_instance(&self, instance: &ServiceInstance) -> Result<()> {
        let parameters = serde_json::to_value(&instance.parameters).unwrap_or(Value::Null);
        let runtime_config = serde_json::to_value(&instance.runtime_config).unwrap_or(Value::Null);

        let result = sqlx::query(
            r#"
            INSERT INTO service_instances (
                instance_id, service_id, plan_id, organization_guid, space_guid,
                parameters, status, created_at, updated_at, connection_info,
                runtime_provider, runtime_config, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
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
        let row = sqlx::query("SELECT * FROM service_instances WHERE instance_id = $1")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("failed to get instance", e))?;

        row.as_ref().map(Self::row_to_instance).transpose()
    }

    async fn update_instance(&self, instance: &ServiceInstance) -> Result<bool> {
        let parameters = serde_json::to_value(&instance.parameters).unwrap_or(Value::Null);
        let runtime_config = serde_json::to_value(&instance.runtime_config).unwrap_or(Value::Null);

        let result = sqlx::query(
            r#"
            UPDATE service_instances SET
                service_id = $2, plan_id = $3, organization_guid = $4, space_guid = $5,
                parameters = $6, status = $7, updated_at = $8, connection_info = $9,
                runtime_provider = $10, runtime_config = $11, error_message = $12
            WHERE instance_id = $1
            "#,
        )
        .bind(&instance.instance_id)
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
        .execute(&self.pool)
        .await
        .map_err(|e| storage_err("failed to update instance", e))?;

        if result.rows_affected() == 0 {
            warn!(instance_id = %instance.instance_id, "update affected no rows");
        }
        Ok(result.rows_affected() > 0)
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM service_instances WHERE instance_id = $1")
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
        let (clause, binds) = Self::filter_clause(filters);
        let mut query = "SELECT * FROM service_instances".to_string();
        if !clause.is_empty() {
            let placeholders: Vec<String> = binds
                .iter()
                .enumerate()
                .map(|(i, (col, _))| format!("{col} = ${}", i + 1))
                .collect();
            query.push_str(" WHERE ");
            query.push_str(&placeholders.join(" AND "));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query(&query);
        for (_, value) in &binds {
            q = q.bind(value);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(|e| storage_err("failed to list instances", e))?;
        rows.iter().map(Self::row_to_instance).collect()
    }

    async fn instance_exists(&self, instance_id: &str) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM service_instances WHERE instance_id = $1")
            .bind(instance_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_err("failed to check instance existence", e))?;
        Ok(found.is_some())
    }
}

pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(metadata_store: &PostgresMetadataStore) -> Self {
        Self {
            pool: metadata_store.pool().clone(),
        }
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn log(
        &self,
        instance_id: Option<&str>,
        operation: &str,
        user_id: Option<&str>,
        details: Option<Value>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_logs (instance_id, operation, user_id, details, timestamp) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(instance_id)
        .bind(operation)
        .bind(user_id)
        .bind(details)
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
        let mut binds: Vec<String> = Vec::new();
        if let Some(id) = instance_id {
            binds.push(id.to_string());
            conditions.push(format!("instance_id = ${}", binds.len()));
        }
        if let Some(op) = operation {
            binds.push(op.to_string());
            conditions.push(format!("operation = ${}", binds.len()));
        }

        let mut query = "SELECT * FROM audit_logs".to_string();
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        query.push_str(&format!(" ORDER BY timestamp DESC, id DESC LIMIT ${}", binds.len() + 1));

        let mut q = sqlx::query(&query);
        for bind in &binds {
            q = q.bind(bind);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(|e| storage_err("failed to query audit log", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(AuditEntry {
                    id: row.try_get("id").map_err(|e| storage_err("reading id", e))?,
                    instance_id: row.try_get("instance_id").map_err(|e| storage_err("reading instance_id", e))?,
                    operation: row.try_get("operation").map_err(|e| storage_err("reading operation", e))?,
                    user_id: row.try_get("user_id").map_err(|e| storage_err("reading user_id", e))?,
                    details: row.try_get("details").map_err(|e| storage_err("reading details", e))?,
                    timestamp: row.try_get("timestamp").map_err(|e| storage_err("reading timestamp", e))?,
                })
            })
            .collect()
    }
}
