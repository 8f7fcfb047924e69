//! Kafka Ops CLI
//!
//! Thin `clap` front-end over the topic, cluster and scheduler services,
//! mirroring `original_source/kafka_ops_agent/cli/*`'s command tree
//! (`topic`, `cluster`, `cleanup`, `config`) as a single static binary
//! instead of a `click` group loaded at interpreter start.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Cell, Table};

use kafka_ops_agent::config::{ConfigManager, ExportFormat};
use kafka_ops_agent::kafka::KafkaClientPool;
use kafka_ops_agent::orchestrator::ProvisioningOrchestrator;
use kafka_ops_agent::scheduler::{ScheduledTask, SchedulerService, TaskExecutor, TaskType};
use kafka_ops_agent::storage::{
    AuditStore, ConnectionInfo, MetadataStore, RuntimeProviderKind, SqliteAuditStore, SqliteMetadataStore,
};
use kafka_ops_agent::topics::{CleanupPolicy, CompressionType, TopicService, TopicSpec};

#[derive(Parser)]
#[command(name = "kafka-ops-cli")]
#[command(about = "Command-line front-end for kafka-ops-agent's topic and cluster services")]
struct Cli {
    /// Path to a kafka-ops-agent config file (JSON or YAML)
    #[arg(long, global = true)]
    config_file: Option<String>,

    /// Cluster identifier to operate against
    #[arg(long, global = true, default_value = "default")]
    cluster_id: String,

    /// Override the configured Kafka bootstrap servers (comma-separated)
    #[arg(long, global = true)]
    bootstrap_servers: Option<String>,

    /// User id attached to audit log entries for this invocation
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Topic management commands
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Cluster management commands
    #[command(subcommand)]
    Cluster(ClusterCommands),

    /// Scheduled cleanup commands
    #[command(subcommand)]
    Cleanup(CleanupCommands),

    /// Live configuration inspection
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Print the crate version
    Version,
}

#[derive(Subcommand)]
enum TopicCommands {
    /// List topics in the cluster
    List {
        #[arg(long)]
        include_internal: bool,
    },
    /// Create a new topic
    Create {
        topic_name: String,
        #[arg(short, long, default_value_t = 3)]
        partitions: i32,
        #[arg(short, long, default_value_t = 1)]
        replication_factor: i32,
        #[arg(long, default_value_t = 168)]
        retention_hours: i64,
        #[arg(long, default_value = "delete")]
        cleanup_policy: String,
        #[arg(long, default_value = "none")]
        compression_type: String,
        /// Custom config in key=value form, may be repeated
        #[arg(short, long = "config")]
        configs: Vec<String>,
    },
    /// Describe a topic in detail
    Describe { topic_name: String },
    /// Update a topic's configuration
    UpdateConfig {
        topic_name: String,
        #[arg(short, long = "config", required = true)]
        configs: Vec<String>,
    },
    /// Delete a topic
    Delete {
        topic_name: String,
        #[arg(long)]
        force: bool,
    },
    /// Purge messages from a topic
    Purge {
        topic_name: String,
        #[arg(long, default_value_t = 1000)]
        retention_ms: i64,
        #[arg(long)]
        force: bool,
    },
    /// Search topics by substring
    Search {
        pattern: String,
        #[arg(long)]
        include_internal: bool,
    },
    /// Copy configuration from one topic to another
    CopyConfig {
        source_topic: String,
        target_topic: String,
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Show cluster broker/topic summary
    Info,
    /// Run a health check against the cluster
    Health,
    /// Show admin connection pool statistics
    Stats,
}

#[derive(Subcommand)]
enum CleanupCommands {
    /// Run an ad-hoc topic cleanup pass
    Topics {
        #[arg(long)]
        retention_pattern: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List currently registered scheduled tasks
    List,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration tree
    Show {
        #[arg(long)]
        include_sensitive: bool,
    },
}

fn parse_cleanup_policy(s: &str) -> Result<CleanupPolicy> {
    match s {
        "delete" => Ok(CleanupPolicy::Delete),
        "compact" => Ok(CleanupPolicy::Compact),
        "compact,delete" => Ok(CleanupPolicy::CompactDelete),
        other => bail!("invalid cleanup policy '{other}': use delete, compact, or compact,delete"),
    }
}

fn parse_compression_type(s: &str) -> Result<CompressionType> {
    match s {
        "none" => Ok(CompressionType::None),
        "gzip" => Ok(CompressionType::Gzip),
        "snappy" => Ok(CompressionType::Snappy),
        "lz4" => Ok(CompressionType::Lz4),
        "zstd" => Ok(CompressionType::Zstd),
        other => bail!("invalid compression type '{other}': use none, gzip, snappy, lz4, or zstd"),
    }
}

fn parse_key_value_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid config '{pair}': use key=value format"))?;
        out.insert(key.to_string(), value.to_string());
    }
    Ok(out)
}

struct Context {
    cluster_id: String,
    user_id: Option<String>,
    metadata: Arc<dyn MetadataStore>,
    audit: Arc<dyn AuditStore>,
    topics: Arc<TopicService>,
    pool: Arc<KafkaClientPool>,
}

impl Context {
    async fn build(cli: &Cli) -> Result<Self> {
        let manager = ConfigManager::new(cli.config_file.as_deref())
            .context("failed to load configuration")?;
        let config = manager.get();

        let sqlite = SqliteMetadataStore::connect(&config.database.sqlite_file)
            .await
            .context("failed to open metadata store")?;
        let audit: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::new(&sqlite));
        let metadata: Arc<dyn MetadataStore> = Arc::new(sqlite);

        let bootstrap_servers: Vec<String> = match &cli.bootstrap_servers {
            Some(raw) => raw.split(',').map(str::trim).map(str::to_string).collect(),
            None => config.kafka.bootstrap_servers.clone(),
        };

        let pool = KafkaClientPool::new(config.database.connection_pool_size as usize);
        pool.register_cluster(
            &cli.cluster_id,
            ConnectionInfo {
                bootstrap_servers,
                coordinator_connect: String::new(),
                ssl: None,
                sasl: None,
            },
        );

        let topics = Arc::new(TopicService::new(metadata.clone(), audit.clone(), pool.clone()));

        Ok(Self {
            cluster_id: cli.cluster_id.clone(),
            user_id: cli.user_id.clone(),
            metadata,
            audit,
            topics,
            pool,
        })
    }

    fn scheduler_executor(&self) -> TaskExecutor {
        let orchestrator = Arc::new(ProvisioningOrchestrator::new(
            self.metadata.clone(),
            self.audit.clone(),
            HashMap::new(),
            RuntimeProviderKind::ContainerEngine,
        ));
        TaskExecutor::new(self.topics.clone(), orchestrator)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose { "debug" } else { "info" })
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Version => {
            println!("kafka-ops-cli {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Config(ConfigCommands::Show { include_sensitive }) => {
            let manager = ConfigManager::new(cli.config_file.as_deref())?;
            let rendered = manager.export(ExportFormat::Json, *include_sensitive)?;
            println!("{rendered}");
            return Ok(());
        }
        _ => {}
    }

    let ctx = Context::build(&cli).await?;

    match cli.command {
        Commands::Topic(cmd) => run_topic(&ctx, cmd).await,
        Commands::Cluster(cmd) => run_cluster(&ctx, cmd).await,
        Commands::Cleanup(cmd) => run_cleanup(&ctx, cmd).await,
        Commands::Config(_) | Commands::Version => unreachable!(),
    }
}

async fn run_topic(ctx: &Context, cmd: TopicCommands) -> Result<()> {
    match cmd {
        TopicCommands::List { include_internal } => {
            let topics = ctx
                .topics
                .list_topics(&ctx.cluster_id, include_internal, ctx.user_id.as_deref())
                .await
                ?;

            if topics.is_empty() {
                println!("No topics found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["Topic Name", "Partitions", "Internal"]);
            for topic in &topics {
                table.add_row(vec![
                    Cell::new(&topic.name),
                    Cell::new(topic.partition_count),
                    Cell::new(topic.is_internal),
                ]);
            }
            println!("Topics in cluster '{}':", ctx.cluster_id);
            println!("{table}");
            println!("\nTotal: {} topics", topics.len());
        }

        TopicCommands::Create {
            topic_name,
            partitions,
            replication_factor,
            retention_hours,
            cleanup_policy,
            compression_type,
            configs,
        } => {
            let spec = TopicSpec {
                name: topic_name.clone(),
                partitions,
                replication_factor,
                retention_ms: retention_hours * 3_600_000,
                cleanup_policy: parse_cleanup_policy(&cleanup_policy)?,
                compression_type: parse_compression_type(&compression_type)?,
                max_message_bytes: 1_048_576,
                min_insync_replicas: 1,
                custom_configs: parse_key_value_pairs(&configs)?,
            };

            let result = ctx
                .topics
                .create_topic(&ctx.cluster_id, &spec, ctx.user_id.as_deref())
                .await
                ?;

            if result.success {
                println!("{} Topic '{}' created successfully", "\u{2713}".green(), topic_name);
            } else {
                bail!("failed to create topic: {}", result.message);
            }
        }

        TopicCommands::Describe { topic_name } => {
            let details = ctx
                .topics
                .describe_topic(&ctx.cluster_id, &topic_name, ctx.user_id.as_deref())
                .await
                ?
                .ok_or_else(|| anyhow!("topic '{topic_name}' not found"))?;

            println!("Topic: {}", details.name);
            println!("Partitions: {}", details.partition_count);
            println!("Replication Factor: {}", details.replication_factor);
            if let Some(count) = details.total_message_count {
                println!("Total Messages: {count}");
            }
            if !details.configs.is_empty() {
                println!("\nConfigurations:");
                let mut table = Table::new();
                table.set_header(vec!["Key", "Value"]);
                for (k, v) in &details.configs {
                    table.add_row(vec![k, v]);
                }
                println!("{table}");
            }
        }

        TopicCommands::UpdateConfig { topic_name, configs } => {
            let parsed = parse_key_value_pairs(&configs)?;
            let result = ctx
                .topics
                .update_topic_config(&ctx.cluster_id, &topic_name, &parsed, ctx.user_id.as_deref())
                .await
                ?;

            if result.success {
                println!("{} Topic '{}' configuration updated", "\u{2713}".green(), topic_name);
            } else {
                bail!("failed to update configuration: {}", result.message);
            }
        }

        TopicCommands::Delete { topic_name, force } => {
            if !force && !confirm(&format!("Delete topic '{topic_name}'?"))? {
                println!("Operation cancelled.");
                return Ok(());
            }

            let result = ctx
                .topics
                .delete_topic(&ctx.cluster_id, &topic_name, ctx.user_id.as_deref())
                .await
                ?;

            if result.success {
                println!("{} Topic '{}' deleted successfully", "\u{2713}".green(), topic_name);
            } else {
                bail!("failed to delete topic: {}", result.message);
            }
        }

        TopicCommands::Purge { topic_name, retention_ms, force } => {
            if !force && !confirm(&format!("Purge all messages from topic '{topic_name}'?"))? {
                println!("Operation cancelled.");
                return Ok(());
            }

            let result = ctx
                .topics
                .purge_topic(&ctx.cluster_id, &topic_name, retention_ms, ctx.user_id.as_deref())
                .await
                ?;

            if result.success {
                println!("{} Topic '{}' purged successfully", "\u{2713}".green(), topic_name);
            } else {
                bail!("failed to purge topic: {}", result.message);
            }
        }

        TopicCommands::Search { pattern, include_internal } => {
            let topics = ctx
                .topics
                .list_topics(&ctx.cluster_id, include_internal, ctx.user_id.as_deref())
                .await
                ?;
            let matching: Vec<_> = topics.into_iter().filter(|t| t.name.to_lowercase().contains(&pattern.to_lowercase())).collect();

            if matching.is_empty() {
                println!("No topics found matching pattern: {pattern}");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_header(vec!["Topic Name", "Partitions"]);
            for topic in &matching {
                table.add_row(vec![Cell::new(&topic.name), Cell::new(topic.partition_count)]);
            }
            println!("{table}");
            println!("\nFound: {} topics", matching.len());
        }

        TopicCommands::CopyConfig { source_topic, target_topic, exclude, dry_run } => {
            let source = ctx
                .topics
                .describe_topic(&ctx.cluster_id, &source_topic, ctx.user_id.as_deref())
                .await
                ?
                .ok_or_else(|| anyhow!("source topic '{source_topic}' not found"))?;
            ctx.topics
                .describe_topic(&ctx.cluster_id, &target_topic, ctx.user_id.as_deref())
                .await
                ?
                .ok_or_else(|| anyhow!("target topic '{target_topic}' not found"))?;

            let excluded: std::collections::HashSet<_> = exclude.into_iter().collect();
            let to_copy: HashMap<String, String> =
                source.configs.into_iter().filter(|(k, _)| !excluded.contains(k)).collect();

            if to_copy.is_empty() {
                println!("No configurations to copy after exclusions");
                return Ok(());
            }

            if dry_run {
                println!("Would copy the following configurations from '{source_topic}' to '{target_topic}':");
                for (k, v) in &to_copy {
                    println!("   {k}: {v}");
                }
                return Ok(());
            }

            let result = ctx
                .topics
                .update_topic_config(&ctx.cluster_id, &target_topic, &to_copy, ctx.user_id.as_deref())
                .await
                ?;

            if result.success {
                println!("{} Copied {} configurations from '{source_topic}' to '{target_topic}'", "\u{2713}".green(), to_copy.len());
            } else {
                bail!("failed to copy configuration: {}", result.message);
            }
        }
    }

    Ok(())
}

async fn run_cluster(ctx: &Context, cmd: ClusterCommands) -> Result<()> {
    match cmd {
        ClusterCommands::Info => {
            let info = ctx.topics.get_cluster_info(&ctx.cluster_id).await?;
            println!("Cluster Information: {}", ctx.cluster_id);
            println!("Broker Count: {}", info.broker_count);
            println!("Topic Count: {}", info.topic_count);
            if let Some(controller) = info.controller_id {
                println!("Controller ID: {controller}");
            }
            if !info.brokers.is_empty() {
                let mut table = Table::new();
                table.set_header(vec!["Broker ID", "Host", "Port"]);
                for broker in &info.brokers {
                    table.add_row(vec![Cell::new(broker.id), Cell::new(&broker.host), Cell::new(broker.port)]);
                }
                println!("\nBrokers:");
                println!("{table}");
            }
        }

        ClusterCommands::Health => {
            ctx.pool
                .get(&ctx.cluster_id)
                .ok_or_else(|| anyhow!("failed to connect to cluster '{}'", ctx.cluster_id))?;

            let health = ctx.pool.health_check_all().await;
            match health.get(&ctx.cluster_id) {
                Some(true) => println!("{} Cluster '{}' is healthy", "\u{2713}".green(), ctx.cluster_id),
                _ => bail!("cluster '{}' is unhealthy", ctx.cluster_id),
            }
        }

        ClusterCommands::Stats => {
            let stats = ctx.pool.stats();
            println!("Connection Pool Statistics:");
            println!("Total Connections: {}", stats.total_connections);
            println!("Max Connections: {}", stats.max_connections);
            println!("Registered Clusters: {}", stats.registered_clusters);
        }
    }

    Ok(())
}

async fn run_cleanup(ctx: &Context, cmd: CleanupCommands) -> Result<()> {
    match cmd {
        CleanupCommands::Topics { retention_pattern, dry_run } => {
            let executor = ctx.scheduler_executor();
            let scheduler = SchedulerService::new(Arc::new(executor));

            let mut task = ScheduledTask::new("ad-hoc-topic-cleanup", TaskType::TopicCleanup, "ad hoc topic cleanup", "0 0 * * *")?;
            task.target_cluster = Some(ctx.cluster_id.clone());
            task.parameters.insert("dry_run".into(), serde_json::Value::Bool(dry_run));
            if let Some(pattern) = retention_pattern {
                task.parameters.insert("retention_pattern".into(), serde_json::Value::String(pattern));
            }

            let execution = scheduler.execute_ad_hoc(task).await;
            println!("{}", serde_json::to_string_pretty(&execution)?);
        }

        CleanupCommands::List => {
            println!("No scheduled tasks are registered in this ad-hoc CLI session.");
            println!("Scheduled cleanup tasks are registered by the long-running server process at startup.");
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;
    print!("{prompt} [y/N]: ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

