//! Pooled Kafka admin connections, keyed by `instance_id`.
//!
//! Grounded on `original_source`'s `KafkaClientManager`/`KafkaClientConnection`:
//! a `DashMap` stands in for the Python manager's single `threading.RLock`
//! plus dict (the map's own sharded locking is the "one internal lock [that]
//! protects the pool map"), and each entry carries its own stats under a
//! `parking_lot::RwLock` so an admin operation only holds the pool-level lock
//! long enough to look up and bump them, matching §4.5's concurrency note.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use rdkafka::admin::AdminClient;
use rdkafka::client::{Client, DefaultClientContext};
use rdkafka::config::ClientConfig as RdKafkaConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ErrorCode, KafkaOpsError, Result};
use crate::storage::{ConnectionInfo, SaslMechanism};

const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(120);
const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(300);
const METADATA_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

fn sasl_mechanism_str(mechanism: SaslMechanism) -> &'static str {
    match mechanism {
        SaslMechanism::Plain => "PLAIN",
        SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
        SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
        SaslMechanism::Gssapi => "GSSAPI",
    }
}

/// One pooled admin connection plus its usage/health bookkeeping.
pub struct PooledConnection {
    pub instance_id: String,
    admin: AdminClient<DefaultClientContext>,
    bootstrap_servers: String,
    created_at: Instant,
    last_used: RwLock<Instant>,
    use_count: AtomicU64,
    healthy: AtomicBool,
}

impl PooledConnection {
    fn new(instance_id: &str, connection_info: &ConnectionInfo) -> Result<Self> {
        let mut client_config = RdKafkaConfig::new();
        client_config
            .set("bootstrap.servers", connection_info.bootstrap_servers.join(","))
            .set("client.id", format!("kafka-ops-agent-{instance_id}"));

        let security_protocol = match (&connection_info.ssl, &connection_info.sasl) {
            (Some(_), Some(_)) => "SASL_SSL",
            (Some(_), None) => "SSL",
            (None, Some(_)) => "SASL_PLAINTEXT",
            (None, None) => "PLAINTEXT",
        };
        client_config.set("security.protocol", security_protocol);

        if let Some(ssl) = &connection_info.ssl {
            if let Some(keystore) = &ssl.keystore_location {
                client_config.set("ssl.keystore.location", keystore);
            }
            if let Some(password) = &ssl.keystore_password {
                client_config.set("ssl.keystore.password", password);
            }
            if let Some(truststore) = &ssl.truststore_location {
                client_config.set("ssl.ca.location", truststore);
            }
            if let Some(key_password) = &ssl.key_password {
                client_config.set("ssl.key.password", key_password);
            }
        }

        if let Some(sasl) = &connection_info.sasl {
            client_config.set("sasl.mechanism", sasl_mechanism_str(sasl.mechanism));
            if let Some(username) = &sasl.username {
                client_config.set("sasl.username", username);
            }
            if let Some(password) = &sasl.password {
                client_config.set("sasl.password", password);
            }
        }

        let admin: AdminClient<DefaultClientContext> = client_config
            .create()
            .map_err(|e| KafkaOpsError::new(format!("failed to create admin client for {instance_id}: {e}"), ErrorCode::KafkaConnectionError))?;

        let now = Instant::now();
        Ok(Self {
            instance_id: instance_id.to_string(),
            admin,
            bootstrap_servers: connection_info.bootstrap_servers.join(","),
            created_at: now,
            last_used: RwLock::new(now),
            use_count: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn admin_client(&self) -> &AdminClient<DefaultClientContext> {
        self.touch();
        &self.admin
    }

    pub fn bootstrap_servers(&self) -> &str {
        &self.bootstrap_servers
    }

    fn touch(&self) {
        *self.last_used.write() = Instant::now();
        self.use_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    fn is_expired(&self, max_idle_time: Duration) -> bool {
        self.last_used.read().elapsed() > max_idle_time
    }

    async fn health_check(&self) -> bool {
        let healthy = self.admin.fetch_metadata(None, METADATA_FETCH_TIMEOUT).is_ok();
        self.healthy.store(healthy, Ordering::Release);
        healthy
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            instance_id: self.instance_id.clone(),
            created_at: self.created_at,
            last_used: *self.last_used.read(),
            use_count: self.use_count.load(Ordering::Relaxed),
            is_healthy: self.is_healthy(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub instance_id: String,
    pub created_at: Instant,
    pub last_used: Instant,
    pub use_count: u64,
    pub is_healthy: bool,
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub max_connections: usize,
    pub registered_clusters: usize,
    pub connections: Vec<ConnectionStats>,
}

/// Pool of pooled admin connections, one per `instance_id`.
pub struct KafkaClientPool {
    connections: DashMap<String, Arc<PooledConnection>>,
    registry: DashMap<String, ConnectionInfo>,
    max_connections: usize,
    health_check_interval: Duration,
    cleanup_interval: Duration,
    max_idle_time: Duration,
    running: AtomicBool,
}

impl KafkaClientPool {
    pub fn new(max_connections: usize) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            registry: DashMap::new(),
            max_connections,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            running: AtomicBool::new(true),
        })
    }

    /// Stores the address book entry used to build a connection on demand.
    pub fn register_cluster(&self, instance_id: &str, connection_info: ConnectionInfo) {
        info!(instance_id, brokers = connection_info.bootstrap_servers.len(), "registered cluster with admin pool");
        self.registry.insert(instance_id.to_string(), connection_info);
    }

    pub fn remove_cluster(&self, instance_id: &str) {
        if let Some((_, conn)) = self.connections.remove(instance_id) {
            drop(conn);
        }
        self.registry.remove(instance_id);
        info!(instance_id, "removed cluster from admin pool");
    }

    /// Returns a healthy pooled connection for `instance_id`, constructing
    /// one on first use. Evicts unhealthy connections before retrying;
    /// evicts idle connections before rejecting for capacity.
    pub fn get(&self, instance_id: &str) -> Option<Arc<PooledConnection>> {
        if let Some(existing) = self.connections.get(instance_id) {
            if existing.is_healthy() {
                return Some(existing.clone());
            }
            warn!(instance_id, "evicting unhealthy pooled connection");
            drop(existing);
            self.connections.remove(instance_id);
        }

        let connection_info = self.registry.get(instance_id)?.clone();

        if self.connections.len() >= self.max_connections {
            self.cleanup_expired();
            if self.connections.len() >= self.max_connections {
                warn!(instance_id, capacity = self.max_connections, "admin pool at capacity, refusing new connection");
                return None;
            }
        }

        match PooledConnection::new(instance_id, &connection_info) {
            Ok(conn) => {
                let conn = Arc::new(conn);
                self.connections.insert(instance_id.to_string(), conn.clone());
                info!(instance_id, "created new pooled admin connection");
                Some(conn)
            }
            Err(e) => {
                warn!(instance_id, error = %e, "failed to create pooled admin connection");
                None
            }
        }
    }

    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let snapshot: Vec<(String, Arc<PooledConnection>)> =
            self.connections.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect();

        let mut results = HashMap::with_capacity(snapshot.len());
        for (instance_id, conn) in snapshot {
            let healthy = conn.health_check().await;
            results.insert(instance_id.clone(), healthy);
            if !healthy {
                warn!(instance_id, "evicting connection that failed health check");
                self.connections.remove(&instance_id);
            }
        }
        results
    }

    fn cleanup_expired(&self) {
        let expired: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_expired(self.max_idle_time))
            .map(|entry| entry.key().clone())
            .collect();

        for instance_id in expired {
            debug!(instance_id, "evicting idle pooled connection");
            self.connections.remove(&instance_id);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let connections: Vec<ConnectionStats> = self.connections.iter().map(|entry| entry.value().stats()).collect();
        PoolStats {
            total_connections: connections.len(),
            max_connections: self.max_connections,
            registered_clusters: self.registry.len(),
            connections,
        }
    }

    /// Spawns the health-check and idle-cleanup background loops. Returned
    /// handles are owned by the caller; `shutdown` stops both loops and
    /// drops every pooled connection.
    pub fn spawn_background_tasks(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        let health_pool = self.clone();
        let health_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(health_pool.health_check_interval);
            interval.tick().await;
            while health_pool.running.load(Ordering::Acquire) {
                interval.tick().await;
                if !health_pool.running.load(Ordering::Acquire) {
                    break;
                }
                debug!("running background admin pool health checks");
                health_pool.health_check_all().await;
            }
        });

        let cleanup_pool = self.clone();
        let cleanup_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_pool.cleanup_interval);
            interval.tick().await;
            while cleanup_pool.running.load(Ordering::Acquire) {
                interval.tick().await;
                if !cleanup_pool.running.load(Ordering::Acquire) {
                    break;
                }
                debug!("running background admin pool idle cleanup");
                cleanup_pool.cleanup_expired();
            }
        });

        (health_task, cleanup_task)
    }

    pub fn shutdown(&self) {
        info!("shutting down admin pool");
        self.running.store(false, Ordering::Release);
        self.connections.clear();
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SaslMaterial, SslMaterial};

    fn plaintext_info() -> ConnectionInfo {
        ConnectionInfo {
            bootstrap_servers: vec!["localhost:9092".to_string()],
            coordinator_connect: "localhost:2181".to_string(),
            ssl: None,
            sasl: None,
        }
    }

    #[test]
    fn registering_without_getting_does_not_create_a_connection() {
        let pool = KafkaClientPool::new(4);
        pool.register_cluster("i-1", plaintext_info());
        assert_eq!(pool.stats().total_connections, 0);
        assert_eq!(pool.stats().registered_clusters, 1);
    }

    #[test]
    fn get_without_register_returns_none() {
        let pool = KafkaClientPool::new(4);
        assert!(pool.get("unregistered").is_none());
    }

    #[test]
    fn get_constructs_and_caches_a_connection() {
        let pool = KafkaClientPool::new(4);
        pool.register_cluster("i-1", plaintext_info());
        let first = pool.get("i-1").expect("connection should be constructible for plaintext config");
        let second = pool.get("i-1").expect("second get should reuse the cached connection");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn remove_cluster_drops_connection_and_registration() {
        let pool = KafkaClientPool::new(4);
        pool.register_cluster("i-1", plaintext_info());
        let _ = pool.get("i-1");
        pool.remove_cluster("i-1");
        assert_eq!(pool.stats().total_connections, 0);
        assert_eq!(pool.stats().registered_clusters, 0);
    }

    #[test]
    fn security_protocol_is_derived_from_ssl_and_sasl_presence() {
        let mut info = plaintext_info();
        info.ssl = Some(SslMaterial::default());
        info.sasl = Some(SaslMaterial { mechanism: SaslMechanism::ScramSha512, username: Some("u".to_string()), password: Some("p".to_string()) });
        let conn = PooledConnection::new("i-2", &info).expect("admin client creation should not require a live broker");
        assert!(conn.is_healthy());
    }
}
