//! Configuration system (C2)
//!
//! Layered `AppConfig` tree (env > file > defaults) with provenance
//! tracking, hot reload, and named deployment profiles.

pub mod manager;
pub mod model;
pub mod templates;
pub mod watcher;

pub use manager::{ConfigManager, ConfigMetadata, ConfigSource, ExportFormat};
pub use model::{ApiConfig, AppConfig, CleanupConfig, DatabaseConfig, DatabaseType, KafkaConfig, LoggingConfig, ProviderConfig};
pub use templates::DeploymentProfile;
pub use watcher::{ConfigChangeEvent, ConfigFileWatcher};
