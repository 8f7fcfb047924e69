//! Schema bootstrap tool
//!
//! `SqliteMetadataStore::connect`/`PostgresMetadataStore::connect` already
//! create their tables and indexes on every connect (`CREATE TABLE IF NOT
//! EXISTS`), so this binary's job is narrower than the teacher's TimescaleDB
//! migration runner: drive that idempotent bootstrap from the CLI, report
//! what's there, and offer an explicit, confirmation-gated reset for local
//! development.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use kafka_ops_agent::config::{ConfigManager, DatabaseType};
use kafka_ops_agent::storage::{PostgresMetadataStore, SqliteMetadataStore};

#[derive(Parser)]
#[command(name = "kafka-ops-migrate")]
#[command(about = "Schema bootstrap tool for the kafka-ops-agent metadata store")]
struct Cli {
    /// Path to a kafka-ops-agent config file (JSON or YAML)
    #[arg(long, global = true)]
    config_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and create any missing tables/indexes
    Migrate,

    /// Show row counts for the managed tables
    Status,

    /// Drop and recreate the managed tables (dangerous!)
    Reset {
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let manager = ConfigManager::new(cli.config_file.as_deref()).context("failed to load configuration")?;
    let config = manager.get();

    println!("{}", "kafka-ops-agent schema bootstrap".bold().cyan());
    println!("database: {:?} ({})", config.database.db_type, config.database.connection_string()?);
    println!();

    match config.database.db_type {
        DatabaseType::Sqlite => {
            let store = SqliteMetadataStore::connect(&config.database.sqlite_file).await?;
            run_sqlite(cli.command, store.pool()).await
        }
        DatabaseType::Postgresql => {
            let store = PostgresMetadataStore::connect(&config.database.connection_string()?).await?;
            run_postgres(cli.command, store.pool()).await
        }
    }
}

async fn run_sqlite(command: Commands, pool: &SqlitePool) -> Result<()> {
    match command {
        Commands::Migrate => println!("{}", "tables and indexes are up to date".green()),
        Commands::Status => {
            let instances: i64 = sqlx::query("SELECT COUNT(*) AS n FROM service_instances").fetch_one(pool).await?.try_get("n")?;
            let audit: i64 = sqlx::query("SELECT COUNT(*) AS n FROM audit_logs").fetch_one(pool).await?.try_get("n")?;
            println!("service_instances: {instances} rows");
            println!("audit_logs: {audit} rows");
        }
        Commands::Reset { confirm } => {
            if !confirm {
                warn_before_reset();
                return Ok(());
            }
            sqlx::query("DROP TABLE IF EXISTS audit_logs").execute(pool).await?;
            sqlx::query("DROP TABLE IF EXISTS service_instances").execute(pool).await?;
            println!("{}", "tables dropped; run `migrate` to recreate them".red());
        }
    }

    Ok(())
}

async fn run_postgres(command: Commands, pool: &PgPool) -> Result<()> {
    match command {
        Commands::Migrate => println!("{}", "tables and indexes are up to date".green()),
        Commands::Status => {
            let instances: i64 = sqlx::query("SELECT COUNT(*) AS n FROM service_instances").fetch_one(pool).await?.try_get("n")?;
            let audit: i64 = sqlx::query("SELECT COUNT(*) AS n FROM audit_logs").fetch_one(pool).await?.try_get("n")?;
            println!("service_instances: {instances} rows");
            println!("audit_logs: {audit} rows");
        }
        Commands::Reset { confirm } => {
            if !confirm {
                warn_before_reset();
                return Ok(());
            }
            sqlx::query("DROP TABLE IF EXISTS audit_logs CASCADE").execute(pool).await?;
            sqlx::query("DROP TABLE IF EXISTS service_instances CASCADE").execute(pool).await?;
            println!("{}", "tables dropped; run `migrate` to recreate them".red());
        }
    }

    Ok(())
}

fn warn_before_reset() {
    println!("{}", "this will DELETE ALL DATA in service_instances and audit_logs".red().bold());
    println!("add --confirm to proceed");
}
