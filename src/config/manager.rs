//! Layered configuration manager
//!
//! Precedence, high to low: environment variables, config file (JSON/YAML by
//! extension), built-in defaults. A per-key provenance record is kept for
//! diagnostics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, KafkaOpsError};

use super::model::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Environment,
    ConfigFile,
    Defaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub file_path: Option<String>,
    pub env_var: Option<String>,
}

/// Environment variable name -> dotted config path, matching
/// `KAFKA_OPS_AGENT_*` from the external interface contract.
fn env_mappings() -> Vec<(&'static str, &'static str)> {
    vec![
        ("KAFKA_OPS_AGENT_DB_TYPE", "database.type"),
        ("KAFKA_OPS_AGENT_DB_HOST", "database.host"),
        ("KAFKA_OPS_AGENT_DB_PORT", "database.port"),
        ("KAFKA_OPS_AGENT_DB_NAME", "database.database"),
        ("KAFKA_OPS_AGENT_DB_USER", "database.username"),
        ("KAFKA_OPS_AGENT_DB_PASSWORD", "database.password"),
        ("KAFKA_OPS_AGENT_KAFKA_SERVERS", "kafka.bootstrap_servers"),
        ("KAFKA_OPS_AGENT_KAFKA_SECURITY", "kafka.security_protocol"),
        ("KAFKA_OPS_AGENT_API_HOST", "api.host"),
        ("KAFKA_OPS_AGENT_API_PORT", "api.port"),
        ("KAFKA_OPS_AGENT_LOG_LEVEL", "logging.level"),
        ("KAFKA_OPS_AGENT_ENVIRONMENT", "environment"),
    ]
}

/// Sensitive substrings masked in exported configuration.
const SENSITIVE_SUBSTRINGS: &[&str] = &["password", "secret", "key", "token", "credential"];

fn convert_env_value(raw: &str) -> Value {
    let lower = raw.to_lowercase();
    if ["true", "yes", "1", "on"].contains(&lower.as_str()) {
        return Value::Bool(true);
    }
    if ["false", "no", "0", "off"].contains(&lower.as_str()) {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if raw.contains(',') {
        return Value::Array(
            raw.split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .collect(),
        );
    }
    Value::String(raw.to_string())
}

fn set_nested(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for part in &parts[..parts.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if !current.is_object() {
        *current = Value::Object(Default::default());
    }
    current
        .as_object_mut()
        .unwrap()
        .insert(parts[parts.len() - 1].to_string(), value);
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) if existing.is_object() && v.is_object() => merge(existing, v),
                    _ => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

fn mask_sensitive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                let key_lower = k.to_lowercase();
                if SENSITIVE_SUBSTRINGS.iter().any(|s| key_lower.contains(s)) {
                    *v = Value::String("***MASKED***".to_string());
                } else {
                    mask_sensitive(v);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                mask_sensitive(item);
            }
        }
        _ => {}
    }
}

pub enum ExportFormat {
    Json,
    Yaml,
}

struct State {
    config: AppConfig,
    metadata: HashMap<String, ConfigMetadata>,
}

/// Loads, validates, and re-loads the application configuration tree.
pub struct ConfigManager {
    config_file: Option<PathBuf>,
    state: RwLock<State>,
}

impl ConfigManager {
    /// Build the manager and perform an initial load.
    pub fn new(config_file: Option<impl AsRef<Path>>) -> Result<Self, KafkaOpsError> {
        let config_file = config_file.map(|p| p.as_ref().to_path_buf());
        let (config, metadata) = Self::load(config_file.as_deref())?;
        Ok(Self {
            config_file,
            state: RwLock::new(State { config, metadata }),
        })
    }

    pub fn from_config(config: AppConfig) -> Self {
        Self {
            config_file: None,
            state: RwLock::new(State {
                config,
                metadata: HashMap::new(),
            }),
        }
    }

    fn load(
        config_file: Option<&Path>,
    ) -> Result<(AppConfig, HashMap<String, ConfigMetadata>), KafkaOpsError> {
        let mut metadata = HashMap::new();
        let mut tree = serde_json::to_value(AppConfig::default()).map_err(|e| {
            KafkaOpsError::configuration(format!("failed to seed default config: {e}"), None)
        })?;
        Self::record_metadata(&mut metadata, &tree, ConfigSource::Defaults, None, None);

        if let Some(path) = config_file {
            if let Some(file_data) = Self::load_from_file(path)? {
                merge(&mut tree, file_data.clone());
                Self::record_metadata(
                    &mut metadata,
                    &file_data,
                    ConfigSource::ConfigFile,
                    Some(path.display().to_string()),
                    None,
                );
            } else {
                warn!(path = %path.display(), "configuration file not found, using defaults");
            }
        }

        let mut env_tree = Value::Object(Default::default());
        for (env_var, config_path) in env_mappings() {
            if let Ok(raw) = std::env::var(env_var) {
                let value = convert_env_value(&raw);
                set_nested(&mut env_tree, config_path, value);
                metadata.insert(
                    config_path.to_string(),
                    ConfigMetadata {
                        source: ConfigSource::Environment,
                        file_path: None,
                        env_var: Some(env_var.to_string()),
                    },
                );
                debug!(env_var, config_path, "loaded override from environment");
            }
        }
        merge(&mut tree, env_tree);

        let config: AppConfig = serde_json::from_value(tree).map_err(|e| {
            KafkaOpsError::configuration(format!("configuration validation failed: {e}"), None)
        })?;

        config.validate_strict()?;
        info!("configuration loaded successfully");
        Ok((config, metadata))
    }

    fn load_from_file(path: &Path) -> Result<Option<Value>, KafkaOpsError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            KafkaOpsError::configuration(
                format!("failed to read configuration file {}: {e}", path.display()),
                None,
            )
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let value = match extension.as_str() {
            "json" => serde_json::from_str(&contents).map_err(|e| {
                KafkaOpsError::configuration(format!("invalid JSON configuration: {e}"), None)
            })?,
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                KafkaOpsError::configuration(format!("invalid YAML configuration: {e}"), None)
            })?,
            other => {
                return Err(KafkaOpsError::new(
                    format!("unsupported configuration file format: {other}"),
                    ErrorCode::ConfigurationError,
                ))
            }
        };

        info!(path = %path.display(), "loaded configuration from file");
        Ok(Some(value))
    }

    fn record_metadata(
        metadata: &mut HashMap<String, ConfigMetadata>,
        value: &Value,
        source: ConfigSource,
        file_path: Option<String>,
        prefix: Option<&str>,
    ) {
        if let Value::Object(map) = value {
            for (k, v) in map {
                let full_key = match prefix {
                    Some(p) => format!("{p}.{k}"),
                    None => k.clone(),
                };
                if v.is_object() {
                    Self::record_metadata(metadata, v, source, file_path.clone(), Some(&full_key));
                } else {
                    metadata.insert(
                        full_key,
                        ConfigMetadata {
                            source,
                            file_path: file_path.clone(),
                            env_var: None,
                        },
                    );
                }
            }
        }
    }

    pub fn get(&self) -> AppConfig {
        self.state.read().unwrap().config.clone()
    }

    pub fn reload(&self) -> Result<AppConfig, KafkaOpsError> {
        let (config, metadata) = Self::load(self.config_file.as_deref())?;
        let mut state = self.state.write().unwrap();
        state.config = config.clone();
        state.metadata = metadata;
        Ok(config)
    }

    pub fn metadata_for(&self, key: &str) -> Option<ConfigMetadata> {
        self.state.read().unwrap().metadata.get(key).cloned()
    }

    pub fn all_metadata(&self) -> HashMap<String, ConfigMetadata> {
        self.state.read().unwrap().metadata.clone()
    }

    pub fn validate(&self) -> Vec<String> {
        self.get().validate()
    }

    /// Serialize the live tree, masking sensitive values unless requested.
    pub fn export(&self, format: ExportFormat, include_sensitive: bool) -> Result<String, KafkaOpsError> {
        let config = self.get();
        let mut value = serde_json::to_value(&config).map_err(|e| {
            KafkaOpsError::configuration(format!("failed to serialize configuration: {e}"), None)
        })?;

        if !include_sensitive {
            mask_sensitive(&mut value);
        }

        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&value).map_err(|e| {
                KafkaOpsError::configuration(format!("failed to export configuration: {e}"), None)
            }),
            ExportFormat::Yaml => serde_yaml::to_string(&value).map_err(|e| {
                KafkaOpsError::configuration(format!("failed to export configuration: {e}"), None)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_when_no_file_given() {
        let manager = ConfigManager::new::<&str>(None).unwrap();
        let config = manager.get();
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn export_masks_sensitive_fields_by_default() {
        let mut config = AppConfig::default();
        config.database.password = Some("hunter2".to_string());
        let manager = ConfigManager::from_config(config);

        let exported = manager.export(ExportFormat::Json, false).unwrap();
        assert!(!exported.contains("hunter2"));
        assert!(exported.contains("***MASKED***"));

        let exported_full = manager.export(ExportFormat::Json, true).unwrap();
        assert!(exported_full.contains("hunter2"));
    }

    #[test]
    fn merge_overlays_nested_objects() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        let overlay = serde_json::json!({"a": {"y": 20}, "c": 4});
        merge(&mut base, overlay);
        assert_eq!(base["a"]["x"], 1);
        assert_eq!(base["a"]["y"], 20);
        assert_eq!(base["b"], 3);
        assert_eq!(base["c"], 4);
    }
}
