//! Topic management service (C6)
//!
//! Sits on top of the admin pool (`crate::kafka`) and the metadata/audit
//! store (`crate::storage`): validates topic specs, drives `rdkafka`'s
//! admin API, and logs one audit entry per operation.

pub mod model;
pub mod service;

pub use model::{
    BrokerInfo, BulkOperationSummary, CleanupPolicy, ClusterInfo, CompressionType, PartitionDetail,
    TopicDescription, TopicOperationResult, TopicSpec, TopicSummary, UPDATABLE_CONFIG_KEYS,
};
pub use service::TopicService;
