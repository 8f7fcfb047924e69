//! Kafka admin client pool (C5)
//!
//! Pooled, health-monitored `rdkafka` admin connections keyed by
//! `instance_id`. The topic management service (`crate::topics`) is the
//! only consumer; this module knows nothing about topics, only connections.

pub mod pool;

pub use pool::{KafkaClientPool, PoolStats, PooledConnection};
