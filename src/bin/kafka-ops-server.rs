//! HTTP server entrypoint
//!
//! Wires the stores, provider map, orchestrator, topic service and
//! scheduler into one `AppState`, registers the cleanup config's default
//! recurring tasks, starts the scheduler's dispatch loop, and serves
//! `api::build_router` over `axum::serve`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use kafka_ops_agent::api::{build_router, AppState};
use kafka_ops_agent::config::{ConfigManager, DatabaseType};
use kafka_ops_agent::kafka::KafkaClientPool;
use kafka_ops_agent::orchestrator::ProvisioningOrchestrator;
use kafka_ops_agent::providers::{ContainerEngineProvider, IaasProvider, RuntimeProvider};
use kafka_ops_agent::providers::iaas::CloudTarget;
use kafka_ops_agent::scheduler::{ScheduledTask, SchedulerService, TaskExecutor, TaskType};
use kafka_ops_agent::storage::{AuditStore, MetadataStore, PostgresAuditStore, PostgresMetadataStore, RuntimeProviderKind, SqliteAuditStore, SqliteMetadataStore};
use kafka_ops_agent::topics::TopicService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_file = std::env::var("KAFKA_OPS_CONFIG_FILE").ok();
    let manager = ConfigManager::new(config_file.as_deref()).context("failed to load configuration")?;
    let config = manager.get();

    let (metadata, audit): (Arc<dyn MetadataStore>, Arc<dyn AuditStore>) = match config.database.db_type {
        DatabaseType::Sqlite => {
            let store = SqliteMetadataStore::connect(&config.database.sqlite_file).await?;
            let audit = Arc::new(SqliteAuditStore::new(&store));
            (Arc::new(store), audit)
        }
        DatabaseType::Postgresql => {
            let store = PostgresMetadataStore::connect(&config.database.connection_string()?).await?;
            let audit = Arc::new(PostgresAuditStore::new(&store));
            (Arc::new(store), audit)
        }
    };

    let pool = KafkaClientPool::new(config.database.connection_pool_size as usize);
    pool.spawn_background_tasks();

    let mut providers: HashMap<RuntimeProviderKind, Arc<dyn RuntimeProvider>> = HashMap::new();
    if config.providers.docker_enabled {
        providers.insert(RuntimeProviderKind::ContainerEngine, Arc::new(ContainerEngineProvider::new("data/manifests")));
    }
    if config.providers.terraform_enabled {
        providers.insert(RuntimeProviderKind::Iaas, Arc::new(IaasProvider::new("data/terraform", CloudTarget::CloudA)));
    }
    if config.providers.kubernetes_enabled {
        warn!("kubernetes provider enabled in config but requires a live cluster; skipping at startup, provision calls targeting it will fail until registered");
    }

    let default_provider = match config.providers.default_provider.as_str() {
        "kubernetes" => RuntimeProviderKind::Orchestrator,
        "terraform" => RuntimeProviderKind::Iaas,
        _ => RuntimeProviderKind::ContainerEngine,
    };

    let orchestrator = Arc::new(ProvisioningOrchestrator::new(metadata.clone(), audit.clone(), providers, default_provider));
    let topics = Arc::new(TopicService::new(metadata.clone(), audit.clone(), pool));
    let executor = Arc::new(TaskExecutor::new(topics.clone(), orchestrator.clone()));
    let scheduler = Arc::new(SchedulerService::new(executor));

    register_cleanup_tasks(&scheduler, &config.cleanup).await?;
    scheduler.start_scheduler();

    let state = AppState {
        metadata,
        orchestrator,
        topics,
        scheduler,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let router = build_router(state);
    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.context("failed to bind HTTP listener")?;
    info!(%addr, "kafka-ops-agent listening");
    axum::serve(listener, router).await.context("HTTP server exited")?;

    Ok(())
}

/// Registers the recurring tasks implied by `[cleanup]`, each disabled
/// outright if its specific `*_enabled` flag is off. Skipped entirely if
/// `cleanup.enabled` is false.
async fn register_cleanup_tasks(scheduler: &SchedulerService, cleanup: &kafka_ops_agent::config::CleanupConfig) -> Result<()> {
    if !cleanup.enabled {
        info!("cleanup scheduling disabled in config, no default tasks registered");
        return Ok(());
    }

    if cleanup.topic_cleanup_enabled {
        let mut task = ScheduledTask::new("default-topic-cleanup", TaskType::TopicCleanup, "default topic cleanup", &cleanup.topic_cleanup_schedule)?;
        task.parameters.insert("max_age_hours".into(), serde_json::Value::from(cleanup.topic_max_age_hours));
        scheduler.add_task(task).await;
    }
    if cleanup.cluster_cleanup_enabled {
        let mut task = ScheduledTask::new("default-cluster-cleanup", TaskType::ClusterCleanup, "default cluster cleanup", &cleanup.cluster_cleanup_schedule)?;
        task.parameters.insert("max_age_hours".into(), serde_json::Value::from(cleanup.cluster_max_age_hours));
        scheduler.add_task(task).await;
    }
    if cleanup.metadata_cleanup_enabled {
        let mut task = ScheduledTask::new("default-metadata-cleanup", TaskType::MetadataCleanup, "default metadata cleanup", &cleanup.metadata_cleanup_schedule)?;
        task.parameters.insert("max_age_days".into(), serde_json::Value::from(cleanup.metadata_max_age_days));
        scheduler.add_task(task).await;
    }

    Ok(())
}
