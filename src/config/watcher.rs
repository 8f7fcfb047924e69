//! Hot-reload file watcher
//!
//! Watches configured paths for changes to recognized config files, debounces
//! rapid changes, diffs the tree, and dispatches a `ConfigChangeEvent` to
//! registered handlers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::manager::ConfigManager;

const RELOAD_DEBOUNCE: Duration = Duration::from_secs(1);
const RECOGNIZED_EXTENSIONS: &[&str] = &["json", "yml", "yaml", "toml"];

#[derive(Debug, Clone)]
pub struct ConfigChangeEvent {
    pub timestamp: DateTime<Utc>,
    pub changed_keys: Vec<String>,
    pub old_values: Vec<(String, Value)>,
    pub new_values: Vec<(String, Value)>,
    pub source: String,
}

pub type ChangeHandler = Arc<dyn Fn(&ConfigChangeEvent) + Send + Sync>;

fn is_config_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| RECOGNIZED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn diff_trees(old: &Value, new: &Value, prefix: &str, out: &mut ConfigChangeEvent) {
    let (Value::Object(old_map), Value::Object(new_map)) = (old, new) else {
        if old != new {
            out.changed_keys.push(prefix.to_string());
            out.old_values.push((prefix.to_string(), old.clone()));
            out.new_values.push((prefix.to_string(), new.clone()));
        }
        return;
    };

    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let old_value = old_map.get(key).cloned().unwrap_or(Value::Null);
        let new_value = new_map.get(key).cloned().unwrap_or(Value::Null);

        if old_value == new_value {
            continue;
        }
        if old_value.is_object() && new_value.is_object() {
            diff_trees(&old_value, &new_value, &full_key, out);
        } else {
            out.changed_keys.push(full_key.clone());
            out.old_values.push((full_key.clone(), old_value));
            out.new_values.push((full_key, new_value));
        }
    }
}

/// Watches configuration files and reloads `manager` on change, notifying
/// registered handlers with a diff of what changed.
pub struct ConfigFileWatcher {
    manager: Arc<ConfigManager>,
    handlers: Arc<Mutex<Vec<ChangeHandler>>>,
    last_reload: Arc<Mutex<Instant>>,
    _watcher: Option<RecommendedWatcher>,
}

impl ConfigFileWatcher {
    pub fn new(manager: Arc<ConfigManager>) -> Self {
        let mut handlers: Vec<ChangeHandler> = Vec::new();
        handlers.push(Arc::new(log_level_handler));
        handlers.push(Arc::new(restart_required_handler("database.")));
        handlers.push(Arc::new(restart_required_handler("api.")));

        Self {
            manager,
            handlers: Arc::new(Mutex::new(handlers)),
            last_reload: Arc::new(Mutex::new(Instant::now() - RELOAD_DEBOUNCE)),
            _watcher: None,
        }
    }

    pub fn register_handler(&self, handler: ChangeHandler) {
        self.handlers.lock().unwrap().push(handler);
    }

    /// Start watching `paths` (only those that exist) in the background.
    pub fn start(&mut self, paths: &[PathBuf]) -> notify::Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;

        for path in paths {
            if path.exists() {
                watcher.watch(path, RecursiveMode::Recursive)?;
                info!(path = %path.display(), "watching configuration path");
            }
        }

        let manager = self.manager.clone();
        let handlers = self.handlers.clone();
        let last_reload = self.last_reload.clone();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !matches!(event.kind, EventKind::Modify(_)) {
                    continue;
                }
                let Some(changed_path) = event.paths.first() else {
                    continue;
                };
                if !is_config_file(changed_path) {
                    continue;
                }

                {
                    let mut last = last_reload.lock().unwrap();
                    if last.elapsed() < RELOAD_DEBOUNCE {
                        continue;
                    }
                    *last = Instant::now();
                }

                info!(path = %changed_path.display(), "configuration file changed");
                reload_and_notify(&manager, &handlers, changed_path.display().to_string()).await;
            }
        });

        self._watcher = Some(watcher);
        Ok(())
    }
}

async fn reload_and_notify(manager: &Arc<ConfigManager>, handlers: &Arc<Mutex<Vec<ChangeHandler>>>, source: String) {
    let old_value = match serde_json::to_value(manager.get()) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to snapshot configuration before reload");
            return;
        }
    };

    let new_config = match manager.reload() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to reload configuration");
            return;
        }
    };

    let new_value = match serde_json::to_value(&new_config) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "failed to snapshot reloaded configuration");
            return;
        }
    };

    let mut event = ConfigChangeEvent {
        timestamp: Utc::now(),
        changed_keys: Vec::new(),
        old_values: Vec::new(),
        new_values: Vec::new(),
        source,
    };
    diff_trees(&old_value, &new_value, "", &mut event);

    if event.changed_keys.is_empty() {
        return;
    }

    info!(changed = event.changed_keys.len(), "configuration changed");
    for handler in handlers.lock().unwrap().iter() {
        handler(&event);
    }
}

fn log_level_handler(event: &ConfigChangeEvent) {
    if let Some((_, new_value)) = event.new_values.iter().find(|(k, _)| k == "logging.level") {
        if let Some(level) = new_value.as_str() {
            info!(level, "log level updated via hot reload");
        }
    }
}

fn restart_required_handler(prefix: &'static str) -> impl Fn(&ConfigChangeEvent) + Send + Sync {
    move |event: &ConfigChangeEvent| {
        if event.changed_keys.iter().any(|k| k.starts_with(prefix)) {
            warn!(prefix, "configuration changed, restart may be required");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_finds_leaf_changes_only() {
        let old = serde_json::json!({"a": {"x": 1, "y": 2}, "b": "same"});
        let new = serde_json::json!({"a": {"x": 1, "y": 3}, "b": "same"});
        let mut event = ConfigChangeEvent {
            timestamp: Utc::now(),
            changed_keys: Vec::new(),
            old_values: Vec::new(),
            new_values: Vec::new(),
            source: "test".into(),
        };
        diff_trees(&old, &new, "", &mut event);
        assert_eq!(event.changed_keys, vec!["a.y".to_string()]);
    }

    #[test]
    fn unchanged_tree_produces_no_diff() {
        let same = serde_json::json!({"a": 1, "b": {"c": 2}});
        let mut event = ConfigChangeEvent {
            timestamp: Utc::now(),
            changed_keys: Vec::new(),
            old_values: Vec::new(),
            new_values: Vec::new(),
            source: "test".into(),
        };
        diff_trees(&same, &same.clone(), "", &mut event);
        assert!(event.changed_keys.is_empty());
    }
}
