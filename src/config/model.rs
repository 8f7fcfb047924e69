//! Configuration data model
//!
//! A single frozen tree with sub-trees for database, kafka, API server,
//! logging, providers, cleanup, and a feature-flag map.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, KafkaOpsError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    Postgresql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub connection_pool_size: u32,
    pub connection_timeout: u32,
    pub sqlite_file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            host: "localhost".into(),
            port: 5432,
            database: "kafka_ops_agent".into(),
            username: None,
            password: None,
            ssl_mode: "prefer".into(),
            connection_pool_size: 10,
            connection_timeout: 30,
            sqlite_file: "data/kafka_ops_agent.db".into(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> Result<String, KafkaOpsError> {
        match self.db_type {
            DatabaseType::Sqlite => Ok(format!("sqlite://{}", self.sqlite_file)),
            DatabaseType::Postgresql => {
                let auth = match (&self.username, &self.password) {
                    (Some(user), Some(pass)) => format!("{user}:{pass}@"),
                    (Some(user), None) => format!("{user}@"),
                    _ => String::new(),
                };
                Ok(format!(
                    "postgresql://{auth}{}:{}/{}?sslmode={}",
                    self.host, self.port, self.database, self.ssl_mode
                ))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub bootstrap_servers: Vec<String>,
    pub security_protocol: String,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ssl_ca_location: Option<String>,
    pub ssl_certificate_location: Option<String>,
    pub ssl_key_location: Option<String>,
    pub ssl_key_password: Option<String>,
    pub client_id: String,
    pub request_timeout_ms: u32,
    pub retry_backoff_ms: u32,
    pub max_retries: u32,
    pub admin_timeout_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: vec!["localhost:9092".into()],
            security_protocol: "PLAINTEXT".into(),
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            ssl_certificate_location: None,
            ssl_key_location: None,
            ssl_key_password: None,
            client_id: "kafka-ops-agent".into(),
            request_timeout_ms: 30_000,
            retry_backoff_ms: 100,
            max_retries: 3,
            admin_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub workers: u32,
    pub api_key_header: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: u32,
    pub max_request_size: u64,
    pub request_timeout: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            debug: false,
            workers: 4,
            api_key_header: "X-API-Key".into(),
            cors_enabled: true,
            cors_origins: vec!["*".into()],
            rate_limit_enabled: true,
            rate_limit_requests: 100,
            rate_limit_window: 60,
            max_request_size: 1024 * 1024,
            request_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_enabled: bool,
    pub file_path: String,
    pub file_max_size: u64,
    pub file_backup_count: u32,
    pub console_enabled: bool,
    pub audit_enabled: bool,
    pub audit_file_path: String,
    pub aggregation_enabled: bool,
    pub aggregation_interval: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".into(),
            format: "json".into(),
            file_enabled: true,
            file_path: "logs/kafka_ops_agent.log".into(),
            file_max_size: 100 * 1024 * 1024,
            file_backup_count: 5,
            console_enabled: true,
            audit_enabled: true,
            audit_file_path: "logs/audit.log".into(),
            aggregation_enabled: false,
            aggregation_interval: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub default_provider: String,
    pub docker_enabled: bool,
    pub docker_host: Option<String>,
    pub docker_network: String,
    pub kubernetes_enabled: bool,
    pub kubernetes_namespace: String,
    pub kubernetes_config_path: Option<String>,
    pub terraform_enabled: bool,
    pub terraform_binary_path: String,
    pub terraform_state_backend: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_provider: "docker".into(),
            docker_enabled: true,
            docker_host: None,
            docker_network: "kafka-ops-network".into(),
            kubernetes_enabled: false,
            kubernetes_namespace: "kafka-ops".into(),
            kubernetes_config_path: None,
            terraform_enabled: false,
            terraform_binary_path: "terraform".into(),
            terraform_state_backend: "local".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub topic_cleanup_enabled: bool,
    pub topic_cleanup_schedule: String,
    pub topic_max_age_hours: u32,
    pub cluster_cleanup_enabled: bool,
    pub cluster_cleanup_schedule: String,
    pub cluster_max_age_hours: u32,
    pub metadata_cleanup_enabled: bool,
    pub metadata_cleanup_schedule: String,
    pub metadata_max_age_days: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic_cleanup_enabled: true,
            topic_cleanup_schedule: "0 2 * * *".into(),
            topic_max_age_hours: 168,
            cluster_cleanup_enabled: true,
            cluster_cleanup_schedule: "0 3 * * *".into(),
            cluster_max_age_hours: 72,
            metadata_cleanup_enabled: true,
            metadata_cleanup_schedule: "0 4 * * 0".into(),
            metadata_max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub providers: ProviderConfig,
    pub cleanup: CleanupConfig,
    pub features: HashMap<String, bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut features = HashMap::new();
        features.insert("osb_api".to_string(), true);
        features.insert("topic_management".to_string(), true);
        features.insert("cleanup_operations".to_string(), true);
        features.insert("scheduler".to_string(), true);
        features.insert("audit_logging".to_string(), true);

        Self {
            name: "Kafka Ops Agent".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            database: DatabaseConfig::default(),
            kafka: KafkaConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            providers: ProviderConfig::default(),
            cleanup: CleanupConfig::default(),
            features,
        }
    }
}

impl AppConfig {
    /// Validation rules beyond type/range; returns every violation found
    /// rather than failing fast on the first one.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.database.db_type == DatabaseType::Postgresql {
            if self.database.username.is_none() {
                errors.push("PostgreSQL database requires username".to_string());
            }
            if self.database.password.is_none() {
                errors.push("PostgreSQL database requires password".to_string());
            }
        }

        if self.kafka.bootstrap_servers.is_empty() {
            errors.push("Kafka bootstrap servers cannot be empty".to_string());
        }

        if self.api.port < 1024 {
            errors.push("API port < 1024 requires elevated privilege".to_string());
        }

        if !["docker", "kubernetes", "terraform"].contains(&self.providers.default_provider.as_str()) {
            errors.push(format!(
                "Invalid default provider: {}",
                self.providers.default_provider
            ));
        }

        errors
    }

    pub fn validate_strict(&self) -> Result<(), KafkaOpsError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(KafkaOpsError::new(
                format!("Configuration validation failed: {}", errors.join("; ")),
                ErrorCode::ConfigurationError,
            )
            .with_detail("errors", errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn postgres_requires_credentials() {
        let mut cfg = AppConfig::default();
        cfg.database.db_type = DatabaseType::Postgresql;
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.contains("username")));
        assert!(errors.iter().any(|e| e.contains("password")));
    }

    #[test]
    fn empty_bootstrap_servers_rejected() {
        let mut cfg = AppConfig::default();
        cfg.kafka.bootstrap_servers.clear();
        assert!(cfg.validate().iter().any(|e| e.contains("bootstrap")));
    }
}
