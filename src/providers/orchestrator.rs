//! Orchestrator (Kubernetes) runtime provider.
//!
//! Generates `StatefulSet`/`Service` objects as typed Rust structs via
//! `kube`/`k8s-openapi` rather than rendering YAML, mirroring
//! `original_source`'s `KubernetesProvider` (coordinator StatefulSet with a
//! single replica, broker StatefulSet with `cluster_size` replicas, two
//! headless/ClusterIP services, per-replica PVCs) one-for-one in Rust types.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, Service, ServicePort, ServiceSpec, TCPSocketAction,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{ErrorCode, KafkaOpsError, Result};
use crate::storage::ConnectionInfo;

use super::{ClusterConfig, DeprovisioningResult, ProvisioningResult, ProvisioningStatus, RuntimeProvider};

const POLL_INTERVAL: Duration = Duration::from_secs(15);
const READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const COORDINATOR_PORT: i32 = 2181;
const BROKER_PORT: i32 = 9092;
const MANAGER: &str = "kafka-ops-agent";

pub struct OrchestratorProvider {
    client: Client,
    namespace: String,
}

impl OrchestratorProvider {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self { client, namespace: namespace.into() }
    }

    fn labels(instance_id: &str, app: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("app".to_string(), app.to_string()), ("cluster".to_string(), instance_id.to_string())])
    }

    fn coordinator_name(instance_id: &str) -> String {
        format!("{instance_id}-coordinator")
    }

    fn broker_name(instance_id: &str) -> String {
        format!("{instance_id}-broker")
    }

    fn coordinator_service(&self, instance_id: &str) -> Service {
        let name = Self::coordinator_name(instance_id);
        Service {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(Self::labels(instance_id, "coordinator")),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                selector: Some(Self::labels(instance_id, "coordinator")),
                ports: Some(vec![
                    ServicePort { name: Some("client".to_string()), port: COORDINATOR_PORT, target_port: None, ..Default::default() },
                    ServicePort { name: Some("follower".to_string()), port: 2888, target_port: None, ..Default::default() },
                    ServicePort { name: Some("election".to_string()), port: 3888, target_port: None, ..Default::default() },
                ]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn coordinator_statefulset(&self, instance_id: &str, config: &ClusterConfig) -> StatefulSet {
        let name = Self::coordinator_name(instance_id);
        let labels = Self::labels(instance_id, "coordinator");

        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                service_name: name.clone(),
                replicas: Some(1),
                selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "coordinator".to_string(),
                            image: Some("confluentinc/cp-zookeeper:7.4.0".to_string()),
                            ports: Some(vec![ContainerPort { name: Some("client".to_string()), container_port: COORDINATOR_PORT, ..Default::default() }]),
                            env: Some(vec![
                                env("ZOOKEEPER_CLIENT_PORT", &COORDINATOR_PORT.to_string()),
                                env("ZOOKEEPER_TICK_TIME", "2000"),
                            ]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "coordinator-data".to_string(),
                                mount_path: "/var/lib/zookeeper/data".to_string(),
                                ..Default::default()
                            }]),
                            readiness_probe: Some(tcp_probe(COORDINATOR_PORT, 10)),
                            liveness_probe: Some(tcp_probe(COORDINATOR_PORT, 30)),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                volume_claim_templates: Some(vec![pvc("coordinator-data", config.storage_size_gb)]),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn broker_service(&self, instance_id: &str) -> Service {
        let name = Self::broker_name(instance_id);
        Service {
            metadata: ObjectMeta {
                name: Some(name),
                namespace: Some(self.namespace.clone()),
                labels: Some(Self::labels(instance_id, "broker")),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(Self::labels(instance_id, "broker")),
                ports: Some(vec![ServicePort { name: Some("kafka".to_string()), port: BROKER_PORT, target_port: None, ..Default::default() }]),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn broker_statefulset(&self, instance_id: &str, config: &ClusterConfig) -> StatefulSet {
        let name = Self::broker_name(instance_id);
        let labels = Self::labels(instance_id, "broker");

        let mut env_vars = vec![
            env("KAFKA_ZOOKEEPER_CONNECT", &format!("{}.{}.svc.cluster.local:{COORDINATOR_PORT}", Self::coordinator_name(instance_id), self.namespace)),
            env("KAFKA_LISTENER_SECURITY_PROTOCOL_MAP", "PLAINTEXT:PLAINTEXT"),
            env("KAFKA_INTER_BROKER_LISTENER_NAME", "PLAINTEXT"),
            env("KAFKA_OFFSETS_TOPIC_REPLICATION_FACTOR", &config.replication_factor.min(config.cluster_size).to_string()),
            env("KAFKA_LOG_RETENTION_HOURS", &config.retention_hours.to_string()),
            env("KAFKA_NUM_PARTITIONS", &config.partition_count.to_string()),
            env("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true"),
        ];
        for (key, value) in &config.custom_properties {
            env_vars.push(env(&format!("KAFKA_{}", key.to_uppercase().replace('.', "_")), value));
        }

        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                service_name: name,
                replicas: Some(config.cluster_size as i32),
                selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "broker".to_string(),
                            image: Some("confluentinc/cp-kafka:7.4.0".to_string()),
                            ports: Some(vec![ContainerPort { name: Some("kafka".to_string()), container_port: BROKER_PORT, ..Default::default() }]),
                            env: Some(env_vars),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "broker-data".to_string(),
                                mount_path: "/var/lib/kafka/data".to_string(),
                                ..Default::default()
                            }]),
                            resources: Some(ResourceRequirements {
                                requests: Some(BTreeMap::from([
                                    ("memory".to_string(), Quantity("1Gi".to_string())),
                                    ("cpu".to_string(), Quantity("500m".to_string())),
                                ])),
                                limits: Some(BTreeMap::from([
                                    ("memory".to_string(), Quantity("2Gi".to_string())),
                                    ("cpu".to_string(), Quantity("1000m".to_string())),
                                ])),
                                ..Default::default()
                            }),
                            readiness_probe: Some(tcp_probe(BROKER_PORT, 30)),
                            liveness_probe: Some(tcp_probe(BROKER_PORT, 60)),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                volume_claim_templates: Some(vec![pvc("broker-data", config.storage_size_gb)]),
                ..Default::default()
            }),
            status: None,
        }
    }

    async fn apply(&self, instance_id: &str, config: &ClusterConfig) -> Result<()> {
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let patch_params = PatchParams::apply(MANAGER).force();

        for (name, obj) in [
            (Self::coordinator_name(instance_id), self.coordinator_statefulset(instance_id, config)),
            (Self::broker_name(instance_id), self.broker_statefulset(instance_id, config)),
        ] {
            statefulsets
                .patch(&name, &patch_params, &Patch::Apply(&obj))
                .await
                .map_err(|e| KafkaOpsError::new(format!("failed to apply StatefulSet {name}: {e}"), ErrorCode::ProviderOperationFailed))?;
        }

        for (name, obj) in [
            (Self::coordinator_name(instance_id), self.coordinator_service(instance_id)),
            (Self::broker_name(instance_id), self.broker_service(instance_id)),
        ] {
            services
                .patch(&name, &patch_params, &Patch::Apply(&obj))
                .await
                .map_err(|e| KafkaOpsError::new(format!("failed to apply Service {name}: {e}"), ErrorCode::ProviderOperationFailed))?;
        }

        Ok(())
    }

    async fn statefulsets(&self, instance_id: &str) -> Vec<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let lp = ListParams::default().labels(&format!("cluster={instance_id}"));
        api.list(&lp).await.map(|l| l.items).unwrap_or_default()
    }

    async fn status_from_statefulsets(&self, instance_id: &str) -> ProvisioningStatus {
        let sets = self.statefulsets(instance_id).await;
        if sets.is_empty() {
            return ProvisioningStatus::Failed;
        }
        let all_ready = sets.iter().all(|sts| {
            let wanted = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
            let ready = sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
            wanted > 0 && ready >= wanted
        });
        if all_ready {
            ProvisioningStatus::Succeeded
        } else {
            ProvisioningStatus::InProgress
        }
    }

    async fn wait_for_ready(&self, instance_id: &str) -> Result<()> {
        let started = tokio::time::Instant::now();
        loop {
            if matches!(self.status_from_statefulsets(instance_id).await, ProvisioningStatus::Succeeded) {
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

    async fn connection_info(&self, instance_id: &str) -> Option<ConnectionInfo> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let broker_svc = services.get(&Self::broker_name(instance_id)).await.ok()?;
        let spec = broker_svc.spec?;

        let bootstrap_servers = match spec.type_.as_deref() {
            Some("LoadBalancer") => {
                let ip = broker_svc
                    .status
                    .and_then(|s| s.load_balancer)
                    .and_then(|lb| lb.ingress)
                    .and_then(|mut ingress| ingress.pop())
                    .and_then(|ing| ing.ip)?;
                vec![format!("{ip}:{BROKER_PORT}")]
            }
            _ => {
                let cluster_ip = spec.cluster_ip.filter(|ip| ip != "None")?;
                vec![format!("{cluster_ip}:{BROKER_PORT}")]
            }
        };

        Some(ConnectionInfo {
            bootstrap_servers,
            coordinator_connect: format!("{}.{}.svc.cluster.local:{COORDINATOR_PORT}", Self::coordinator_name(instance_id), self.namespace),
            ssl: None,
            sasl: None,
        })
    }

    async fn cleanup(&self, instance_id: &str) {
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &self.namespace);
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &self.namespace);
        let lp = ListParams::default().labels(&format!("cluster={instance_id}"));
        let dp = DeleteParams::default();

        for sts in statefulsets.list(&lp).await.map(|l| l.items).unwrap_or_default() {
            if let Err(e) = statefulsets.delete(&sts.name_any(), &dp).await {
                warn!(instance_id, name = %sts.name_any(), error = %e, "failed to delete StatefulSet during cleanup");
            }
        }
        for svc in services.list(&lp).await.map(|l| l.items).unwrap_or_default() {
            if let Err(e) = services.delete(&svc.name_any(), &dp).await {
                warn!(instance_id, name = %svc.name_any(), error = %e, "failed to delete Service during cleanup");
            }
        }
        for pvc in pvcs.list(&lp).await.map(|l| l.items).unwrap_or_default() {
            if let Err(e) = pvcs.delete(&pvc.name_any(), &dp).await {
                warn!(instance_id, name = %pvc.name_any(), error = %e, "failed to delete PVC during cleanup");
            }
        }
    }
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), value_from: None }
}

fn tcp_probe(port: i32, initial_delay: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction { port: k8s_openapi::apimachinery::pkg::util::intstr::IntOrString::Int(port), host: None }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        ..Default::default()
    }
}

fn pvc(name: &str, storage_size_gb: u32) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(format!("{storage_size_gb}Gi")))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    }
}

#[async_trait]
impl RuntimeProvider for OrchestratorProvider {
    async fn provision(&self, instance_id: &str, config: &ClusterConfig) -> Result<ProvisioningResult> {
        info!(instance_id, namespace = %self.namespace, "starting orchestrator provisioning");

        if let Err(e) = self.apply(instance_id, config).await {
            self.cleanup(instance_id).await;
            return Ok(ProvisioningResult::failed(instance_id, e.message));
        }

        if let Err(e) = self.wait_for_ready(instance_id).await {
            self.cleanup(instance_id).await;
            return Ok(ProvisioningResult::failed(instance_id, e.message));
        }

        match self.connection_info(instance_id).await {
            Some(info) => {
                info!(instance_id, "orchestrator cluster ready");
                Ok(ProvisioningResult::succeeded(instance_id, info))
            }
            None => {
                self.cleanup(instance_id).await;
                Ok(ProvisioningResult::failed(instance_id, "cluster became ready but no connection info could be derived"))
            }
        }
    }

    async fn deprovision(&self, instance_id: &str) -> Result<DeprovisioningResult> {
        info!(instance_id, "starting orchestrator deprovisioning");
        self.cleanup(instance_id).await;
        Ok(DeprovisioningResult::succeeded(instance_id))
    }

    async fn get_status(&self, instance_id: &str) -> ProvisioningStatus {
        self.status_from_statefulsets(instance_id).await
    }

    async fn get_connection_info(&self, instance_id: &str) -> Option<ConnectionInfo> {
        self.connection_info(instance_id).await
    }

    async fn health_check(&self, instance_id: &str) -> bool {
        if !matches!(self.status_from_statefulsets(instance_id).await, ProvisioningStatus::Succeeded) {
            return false;
        }
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let lp = ListParams::default().labels(&format!("cluster={instance_id}"));
        !services.list(&lp).await.map(|l| l.items.is_empty()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ClusterConfig {
        ClusterConfig { cluster_size: 3, ..ClusterConfig::default() }
    }

    #[test]
    fn resource_names_are_namespaced_by_instance() {
        assert_eq!(OrchestratorProvider::coordinator_name("i-1"), "i-1-coordinator");
        assert_eq!(OrchestratorProvider::broker_name("i-1"), "i-1-broker");
    }

    #[test]
    fn labels_include_cluster_and_app() {
        let labels = OrchestratorProvider::labels("i-1", "broker");
        assert_eq!(labels.get("cluster"), Some(&"i-1".to_string()));
        assert_eq!(labels.get("app"), Some(&"broker".to_string()));
    }

    #[test]
    fn broker_pvc_storage_matches_config() {
        let claim = pvc("broker-data", sample_config().storage_size_gb);
        let requests = claim.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("10Gi".to_string())));
    }
}
