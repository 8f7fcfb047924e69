//! Container-engine runtime provider.
//!
//! Renders a compose-style manifest (coordinator + N uniquely-named broker
//! containers, per-instance bridge network, named volumes) and shells out to
//! the engine's compose CLI, mirroring `original_source`'s `DockerProvider`
//! (which itself shells to `docker-compose` for bring-up/teardown while only
//! using its SDK client for read-only container/volume/network queries —
//! here everything goes through the CLI so no extra client crate is needed).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::error::{ErrorCode, KafkaOpsError, Result};
use crate::storage::ConnectionInfo;

use super::{ClusterConfig, DeprovisioningResult, ProvisioningResult, ProvisioningStatus, RuntimeProvider};

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const READY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const STOP_GRACE: Duration = Duration::from_secs(30);
const COORDINATOR_PORT: u16 = 2181;
const BROKER_BASE_PORT: u16 = 9092;

#[derive(Debug, Serialize, Deserialize)]
struct ComposeFile {
    version: String,
    services: HashMap<String, ComposeService>,
    volumes: HashMap<String, serde_yaml::Value>,
    networks: HashMap<String, NetworkDef>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ComposeService {
    image: String,
    container_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    ports: Vec<String>,
    environment: HashMap<String, String>,
    volumes: Vec<String>,
    networks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkDef {
    driver: String,
}

pub struct ContainerEngineProvider {
    manifest_root: PathBuf,
    compose_binary: String,
}

impl ContainerEngineProvider {
    pub fn new(manifest_root: impl Into<PathBuf>) -> Self {
        Self {
            manifest_root: manifest_root.into(),
            compose_binary: "docker".to_string(),
        }
    }

    fn instance_dir(&self, instance_id: &str) -> PathBuf {
        self.manifest_root.join(instance_id)
    }

    fn manifest_path(&self, instance_id: &str) -> PathBuf {
        self.instance_dir(instance_id).join("compose.yml")
    }

    fn network_name(instance_id: &str) -> String {
        format!("{instance_id}-network")
    }

    fn generate_manifest(instance_id: &str, config: &ClusterConfig) -> ComposeFile {
        let network = Self::network_name(instance_id);
        let mut services = HashMap::new();
        let mut volumes = HashMap::new();

        services.insert(
            "coordinator".to_string(),
            ComposeService {
                image: "confluentinc/cp-zookeeper:7.4.0".to_string(),
                container_name: format!("{instance_id}-coordinator"),
                depends_on: Vec::new(),
                ports: vec![format!("{COORDINATOR_PORT}:{COORDINATOR_PORT}")],
                environment: HashMap::from([
                    ("ZOOKEEPER_CLIENT_PORT".to_string(), COORDINATOR_PORT.to_string()),
                    ("ZOOKEEPER_TICK_TIME".to_string(), "2000".to_string()),
                ]),
                volumes: vec![format!("{instance_id}-coordinator-data:/var/lib/zookeeper/data")],
                networks: vec![network.clone()],
            },
        );
        volumes.insert(format!("{instance_id}-coordinator-data"), serde_yaml::Value::Null);

        for i in 0..config.cluster_size {
            let broker_id = i + 1;
            let host_port = BROKER_BASE_PORT + i as u16;
            let mut env = HashMap::from([
                ("KAFKA_BROKER_ID".to_string(), broker_id.to_string()),
                ("KAFKA_ZOOKEEPER_CONNECT".to_string(), format!("{instance_id}-coordinator:{COORDINATOR_PORT}")),
                ("KAFKA_ADVERTISED_LISTENERS".to_string(), format!("PLAINTEXT://localhost:{host_port}")),
                ("KAFKA_LISTENER_SECURITY_PROTOCOL_MAP".to_string(), "PLAINTEXT:PLAINTEXT".to_string()),
                ("KAFKA_INTER_BROKER_LISTENER_NAME".to_string(), "PLAINTEXT".to_string()),
                (
                    "KAFKA_OFFSETS_TOPIC_REPLICATION_FACTOR".to_string(),
                    config.replication_factor.min(config.cluster_size).to_string(),
                ),
                ("KAFKA_LOG_RETENTION_HOURS".to_string(), config.retention_hours.to_string()),
                ("KAFKA_NUM_PARTITIONS".to_string(), config.partition_count.to_string()),
            ]);
            for (key, value) in &config.custom_properties {
                env.insert(format!("KAFKA_{}", key.to_uppercase().replace('.', "_")), value.clone());
            }

            let name = format!("broker-{broker_id}");
            services.insert(
                name.clone(),
                ComposeService {
                    image: "confluentinc/cp-kafka:7.4.0".to_string(),
                    container_name: format!("{instance_id}-{name}"),
                    depends_on: vec!["coordinator".to_string()],
                    ports: vec![format!("{host_port}:9092")],
                    environment: env,
                    volumes: vec![format!("{instance_id}-{name}-data:/var/lib/kafka/data")],
                    networks: vec![network.clone()],
                },
            );
            volumes.insert(format!("{instance_id}-{name}-data"), serde_yaml::Value::Null);
        }

        let mut networks = HashMap::new();
        networks.insert(network, NetworkDef { driver: "bridge".to_string() });

        ComposeFile {
            version: "3.8".to_string(),
            services,
            volumes,
            networks,
        }
    }

    async fn write_manifest(&self, instance_id: &str, manifest: &ComposeFile) -> Result<PathBuf> {
        let dir = self.instance_dir(instance_id);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            KafkaOpsError::new(format!("failed to create manifest directory: {e}"), ErrorCode::ProviderOperationFailed)
        })?;

        let path = self.manifest_path(instance_id);
        let contents = serde_yaml::to_string(manifest)
            .map_err(|e| KafkaOpsError::new(format!("failed to render compose manifest: {e}"), ErrorCode::ProviderOperationFailed))?;
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| KafkaOpsError::new(format!("failed to write compose manifest: {e}"), ErrorCode::ProviderOperationFailed))?;

        info!(instance_id, path = %path.display(), "wrote compose manifest");
        Ok(path)
    }

    async fn run_compose(&self, manifest_path: &Path, args: &[&str]) -> Result<()> {
        let output = Command::new(&self.compose_binary)
            .arg("compose")
            .arg("-f")
            .arg(manifest_path)
            .args(args)
            .output()
            .await
            .map_err(|e| KafkaOpsError::new(format!("failed to invoke compose: {e}"), ErrorCode::ProviderOperationFailed))?;

        if !output.status.success() {
            return Err(KafkaOpsError::new(
                format!("compose {:?} failed: {}", args, String::from_utf8_lossy(&output.stderr)),
                ErrorCode::ProviderOperationFailed,
            ));
        }
        Ok(())
    }

    async fn container_names(&self, instance_id: &str) -> Vec<String> {
        let output = Command::new(&self.compose_binary)
            .args(["ps", "-a", "--filter", &format!("name={instance_id}-"), "--format", "{{.Names}}"])
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    async fn inspect(&self, names: &[String]) -> Vec<serde_json::Value> {
        if names.is_empty() {
            return Vec::new();
        }
        let output = Command::new(&self.compose_binary).arg("inspect").args(names).output().await;

        match output {
            Ok(out) if out.status.success() => serde_json::from_slice(&out.stdout).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    async fn wait_for_ready(&self, instance_id: &str) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            if matches!(self.status_from_containers(instance_id).await, ProvisioningStatus::Succeeded) {
                return Ok(());
            }
            if started.elapsed() > READY_TIMEOUT {
                return Err(KafkaOpsError::new(
                    format!("cluster {instance_id} did not become ready within {READY_TIMEOUT:?}"),
                    ErrorCode::ClusterProvisioningFailed,
                ));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn status_from_containers(&self, instance_id: &str) -> ProvisioningStatus {
        let names = self.container_names(instance_id).await;
        if names.is_empty() {
            return ProvisioningStatus::Failed;
        }
        let rows = self.inspect(&names).await;
        if rows.len() != names.len() {
            return ProvisioningStatus::InProgress;
        }
        let all_running = rows
            .iter()
            .all(|row| row["State"]["Status"].as_str() == Some("running"));
        if all_running {
            ProvisioningStatus::Succeeded
        } else {
            ProvisioningStatus::InProgress
        }
    }

    async fn connection_info_from_containers(&self, instance_id: &str) -> Option<ConnectionInfo> {
        let names = self.container_names(instance_id).await;
        let broker_names: Vec<String> = names.iter().filter(|n| n.contains("broker-")).cloned().collect();
        if broker_names.is_empty() {
            return None;
        }
        let rows = self.inspect(&broker_names).await;

        let mut bootstrap_servers = Vec::new();
        for row in &rows {
            if let Some(host_port) = row["NetworkSettings"]["Ports"]["9092/tcp"][0]["HostPort"].as_str() {
                bootstrap_servers.push(format!("localhost:{host_port}"));
            }
        }
        if bootstrap_servers.is_empty() {
            return None;
        }

        Some(ConnectionInfo {
            bootstrap_servers,
            coordinator_connect: format!("localhost:{COORDINATOR_PORT}"),
            ssl: None,
            sasl: None,
        })
    }

    async fn cleanup(&self, instance_id: &str) {
        let manifest_path = self.manifest_path(instance_id);
        if manifest_path.exists() {
            if let Err(e) = self.run_compose(&manifest_path, &["down", "--volumes", "--remove-orphans", "--timeout", &STOP_GRACE.as_secs().to_string()]).await {
                warn!(instance_id, error = %e, "compose down reported a failure during cleanup");
            }
        }

        let network = Self::network_name(instance_id);
        let _ = Command::new(&self.compose_binary).args(["network", "rm", &network]).output().await;

        let dir = self.instance_dir(instance_id);
        if dir.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                warn!(instance_id, error = %e, "failed to remove manifest directory during cleanup");
            }
        }
    }
}

#[async_trait]
impl RuntimeProvider for ContainerEngineProvider {
    async fn provision(&self, instance_id: &str, config: &ClusterConfig) -> Result<ProvisioningResult> {
        info!(instance_id, "starting container-engine provisioning");
        let manifest = Self::generate_manifest(instance_id, config);
        let manifest_path = match self.write_manifest(instance_id, &manifest).await {
            Ok(p) => p,
            Err(e) => {
                self.cleanup(instance_id).await;
                return Ok(ProvisioningResult::failed(instance_id, e.message));
            }
        };

        if let Err(e) = self.run_compose(&manifest_path, &["up", "-d"]).await {
            self.cleanup(instance_id).await;
            return Ok(ProvisioningResult::failed(instance_id, e.message));
        }

        if let Err(e) = timeout(READY_TIMEOUT + Duration::from_secs(5), self.wait_for_ready(instance_id))
            .await
            .map_err(|_| KafkaOpsError::new("timed out waiting for container-engine readiness", ErrorCode::ClusterProvisioningFailed))
            .and_then(|inner| inner)
        {
            self.cleanup(instance_id).await;
            return Ok(ProvisioningResult::failed(instance_id, e.message));
        }

        match self.connection_info_from_containers(instance_id).await {
            Some(info) => {
                info!(instance_id, "container-engine cluster ready");
                Ok(ProvisioningResult::succeeded(instance_id, info))
            }
            None => {
                self.cleanup(instance_id).await;
                Ok(ProvisioningResult::failed(instance_id, "cluster became ready but no connection info could be derived"))
            }
        }
    }

    async fn deprovision(&self, instance_id: &str) -> Result<DeprovisioningResult> {
        info!(instance_id, "starting container-engine deprovisioning");
        self.cleanup(instance_id).await;
        Ok(DeprovisioningResult::succeeded(instance_id))
    }

    async fn get_status(&self, instance_id: &str) -> ProvisioningStatus {
        self.status_from_containers(instance_id).await
    }

    async fn get_connection_info(&self, instance_id: &str) -> Option<ConnectionInfo> {
        self.connection_info_from_containers(instance_id).await
    }

    async fn health_check(&self, instance_id: &str) -> bool {
        matches!(self.status_from_containers(instance_id).await, ProvisioningStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_has_one_entry_per_broker_plus_coordinator() {
        let config = ClusterConfig {
            cluster_size: 3,
            ..ClusterConfig::default()
        };
        let manifest = ContainerEngineProvider::generate_manifest("i-1", &config);
        assert_eq!(manifest.services.len(), 4);
        assert!(manifest.services.contains_key("coordinator"));
        assert!(manifest.services.contains_key("broker-3"));
    }

    #[test]
    fn each_broker_gets_a_unique_host_port() {
        let config = ClusterConfig {
            cluster_size: 2,
            ..ClusterConfig::default()
        };
        let manifest = ContainerEngineProvider::generate_manifest("i-1", &config);
        let p1 = &manifest.services["broker-1"].ports[0];
        let p2 = &manifest.services["broker-2"].ports[0];
        assert_ne!(p1, p2);
    }
}
