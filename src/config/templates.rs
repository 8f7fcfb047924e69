//! Deployment profile templates
//!
//! Named pure constructors of default configuration trees; consumers merge
//! them with overrides by recursive object merge (see `manager::merge`).

use super::model::{AppConfig, DatabaseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentProfile {
    Development,
    Testing,
    Staging,
    Production,
    ContainerLocal,
    Orchestrator,
    CloudA,
    CloudB,
    CloudC,
}

impl DeploymentProfile {
    pub fn all() -> &'static [DeploymentProfile] {
        &[
            DeploymentProfile::Development,
            DeploymentProfile::Testing,
            DeploymentProfile::Staging,
            DeploymentProfile::Production,
            DeploymentProfile::ContainerLocal,
            DeploymentProfile::Orchestrator,
            DeploymentProfile::CloudA,
            DeploymentProfile::CloudB,
            DeploymentProfile::CloudC,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeploymentProfile::Development => "development",
            DeploymentProfile::Testing => "testing",
            DeploymentProfile::Staging => "staging",
            DeploymentProfile::Production => "production",
            DeploymentProfile::ContainerLocal => "container-local",
            DeploymentProfile::Orchestrator => "orchestrator",
            DeploymentProfile::CloudA => "cloud-a",
            DeploymentProfile::CloudB => "cloud-b",
            DeploymentProfile::CloudC => "cloud-c",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeploymentProfile::Development => "Local development with the embedded store and debug logging",
            DeploymentProfile::Testing => "Testing environment with an in-memory store and minimal logging",
            DeploymentProfile::Staging => "Staging environment mirroring production with relaxed limits",
            DeploymentProfile::Production => "Production environment with the relational store and full logging",
            DeploymentProfile::ContainerLocal => "Local container-engine deployment",
            DeploymentProfile::Orchestrator => "Orchestrator deployment with service discovery",
            DeploymentProfile::CloudA => "Cloud provider A deployment (managed database + managed Kafka)",
            DeploymentProfile::CloudB => "Cloud provider B deployment (managed database + managed Kafka)",
            DeploymentProfile::CloudC => "Cloud provider C deployment (managed database + managed Kafka)",
        }
    }

    pub fn build(&self) -> AppConfig {
        match self {
            DeploymentProfile::Development => development(),
            DeploymentProfile::Testing => testing(),
            DeploymentProfile::Staging => staging(),
            DeploymentProfile::Production => production(),
            DeploymentProfile::ContainerLocal => container_local(),
            DeploymentProfile::Orchestrator => orchestrator(),
            DeploymentProfile::CloudA => cloud_a(),
            DeploymentProfile::CloudB => cloud_b(),
            DeploymentProfile::CloudC => cloud_c(),
        }
    }
}

fn development() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.environment = "development".into();
    cfg.database.db_type = DatabaseType::Sqlite;
    cfg.database.sqlite_file = "data/dev_kafka_ops_agent.db".into();
    cfg.database.connection_pool_size = 5;
    cfg.kafka.client_id = "kafka-ops-agent-dev".into();
    cfg.api.host = "127.0.0.1".into();
    cfg.api.debug = true;
    cfg.api.workers = 1;
    cfg.api.rate_limit_enabled = false;
    cfg.logging.level = "DEBUG".into();
    cfg.logging.format = "text".into();
    cfg.logging.file_path = "logs/dev_kafka_ops_agent.log".into();
    cfg.providers.docker_network = "kafka-ops-dev-network".into();
    cfg.cleanup.topic_cleanup_schedule = "0 */6 * * *".into();
    cfg.cleanup.topic_max_age_hours = 24;
    cfg.cleanup.metadata_cleanup_enabled = false;
    cfg
}

fn testing() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.environment = "testing".into();
    cfg.name = "Kafka Ops Agent Test".into();
    cfg.database.db_type = DatabaseType::Sqlite;
    cfg.database.sqlite_file = ":memory:".into();
    cfg.database.connection_pool_size = 2;
    cfg.kafka.bootstrap_servers = vec!["localhost:9093".into()];
    cfg.kafka.client_id = "kafka-ops-agent-test".into();
    cfg.kafka.request_timeout_ms = 10_000;
    cfg.kafka.admin_timeout_ms = 30_000;
    cfg.api.host = "127.0.0.1".into();
    cfg.api.port = 8081;
    cfg.api.rate_limit_enabled = false;
    cfg.api.request_timeout = 10;
    cfg.logging.level = "WARNING".into();
    cfg.logging.file_enabled = false;
    cfg.logging.console_enabled = false;
    cfg.logging.audit_enabled = false;
    cfg.providers.docker_network = "kafka-ops-test-network".into();
    cfg.cleanup.enabled = false;
    cfg.cleanup.topic_cleanup_enabled = false;
    cfg.cleanup.cluster_cleanup_enabled = false;
    cfg.cleanup.metadata_cleanup_enabled = false;
    cfg.features.insert("cleanup_operations".into(), false);
    cfg.features.insert("scheduler".into(), false);
    cfg.features.insert("audit_logging".into(), false);
    cfg
}

fn production() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.environment = "production".into();
    cfg.database.db_type = DatabaseType::Postgresql;
    cfg.database.host = "postgres.internal".into();
    cfg.database.username = Some("${DB_USERNAME}".into());
    cfg.database.password = Some("${DB_PASSWORD}".into());
    cfg.database.ssl_mode = "require".into();
    cfg.database.connection_pool_size = 20;
    cfg.kafka.bootstrap_servers = vec![
        "kafka-1.internal:9092".into(),
        "kafka-2.internal:9092".into(),
        "kafka-3.internal:9092".into(),
    ];
    cfg.kafka.security_protocol = "SASL_SSL".into();
    cfg.kafka.sasl_mechanism = Some("PLAIN".into());
    cfg.kafka.sasl_username = Some("${KAFKA_USERNAME}".into());
    cfg.kafka.sasl_password = Some("${KAFKA_PASSWORD}".into());
    cfg.kafka.ssl_ca_location = Some("/etc/ssl/certs/kafka-ca.pem".into());
    cfg.kafka.client_id = "kafka-ops-agent-prod".into();
    cfg.kafka.admin_timeout_ms = 120_000;
    cfg.kafka.max_retries = 5;
    cfg.api.cors_enabled = false;
    cfg.api.rate_limit_requests = 1000;
    cfg.api.max_request_size = 2 * 1024 * 1024;
    cfg.api.request_timeout = 60;
    cfg.logging.file_path = "/var/log/kafka-ops-agent/app.log".into();
    cfg.logging.file_max_size = 100 * 1024 * 1024;
    cfg.logging.file_backup_count = 10;
    cfg.logging.console_enabled = false;
    cfg.logging.audit_file_path = "/var/log/kafka-ops-agent/audit.log".into();
    cfg.logging.aggregation_enabled = true;
    cfg.providers.default_provider = "kubernetes".into();
    cfg.providers.docker_enabled = false;
    cfg.providers.kubernetes_enabled = true;
    cfg.providers.terraform_enabled = true;
    cfg.providers.terraform_state_backend = "remote".into();
    cfg.cleanup.cluster_cleanup_schedule = "0 3 * * *".into();
    cfg.cleanup.metadata_cleanup_enabled = true;
    cfg.cleanup.metadata_max_age_days = 90;
    cfg
}

fn staging() -> AppConfig {
    let mut cfg = production();
    cfg.environment = "staging".into();
    cfg.database.host = "postgres-staging.internal".into();
    cfg.kafka.bootstrap_servers = vec!["kafka-staging.internal:9092".into()];
    cfg.api.rate_limit_requests = 200;
    cfg
}

fn orchestrator() -> AppConfig {
    let mut cfg = production();
    cfg.database.host = "postgres-service.kafka-ops.svc.cluster.local".into();
    cfg.kafka.bootstrap_servers = vec!["kafka-service.kafka-ops.svc.cluster.local:9092".into()];
    cfg.logging.file_enabled = false;
    cfg.logging.console_enabled = true;
    cfg.logging.audit_file_path = "/dev/stdout".into();
    cfg.providers.default_provider = "kubernetes".into();
    cfg.providers.kubernetes_config_path = Some("/var/run/secrets/kubernetes.io/serviceaccount".into());
    cfg
}

fn container_local() -> AppConfig {
    let mut cfg = development();
    cfg.database.db_type = DatabaseType::Postgresql;
    cfg.database.host = "postgres".into();
    cfg.database.username = Some("kafka_ops".into());
    cfg.database.password = Some("kafka_ops_password".into());
    cfg.kafka.bootstrap_servers = vec!["kafka:9092".into()];
    cfg.api.host = "0.0.0.0".into();
    cfg.logging.level = "INFO".into();
    cfg.logging.file_enabled = false;
    cfg.providers.docker_host = Some("unix:///var/run/docker.sock".into());
    cfg
}

fn cloud_a() -> AppConfig {
    let mut cfg = production();
    cfg.database.host = "${CLOUD_A_DB_ENDPOINT}".into();
    cfg.kafka.bootstrap_servers = vec!["${CLOUD_A_KAFKA_BOOTSTRAP}".into()];
    cfg.kafka.sasl_mechanism = Some("CLOUD_A_IAM".into());
    cfg.logging.aggregation_enabled = true;
    cfg.providers.default_provider = "terraform".into();
    cfg.providers.terraform_state_backend = "cloud-a-object-store".into();
    cfg.providers.kubernetes_enabled = true;
    cfg
}

fn cloud_b() -> AppConfig {
    let mut cfg = production();
    cfg.database.host = "${CLOUD_B_DB_ENDPOINT}".into();
    cfg.kafka.bootstrap_servers = vec!["${CLOUD_B_KAFKA_BOOTSTRAP}".into()];
    cfg.providers.default_provider = "terraform".into();
    cfg.providers.terraform_state_backend = "cloud-b-object-store".into();
    cfg.providers.kubernetes_enabled = true;
    cfg
}

fn cloud_c() -> AppConfig {
    let mut cfg = production();
    cfg.database.host = "${CLOUD_C_DB_ENDPOINT}".into();
    cfg.kafka.bootstrap_servers = vec!["${CLOUD_C_KAFKA_BOOTSTRAP}".into()];
    cfg.providers.default_provider = "terraform".into();
    cfg.providers.terraform_state_backend = "cloud-c-object-store".into();
    cfg.providers.kubernetes_enabled = true;
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_profile_builds_a_valid_config() {
        for profile in DeploymentProfile::all() {
            let cfg = profile.build();
            assert!(
                cfg.validate().is_empty(),
                "profile {:?} produced invalid config: {:?}",
                profile,
                cfg.validate()
            );
        }
    }

    #[test]
    fn testing_profile_disables_background_features() {
        let cfg = testing();
        assert_eq!(cfg.features.get("scheduler"), Some(&false));
        assert!(!cfg.cleanup.enabled);
    }
}
