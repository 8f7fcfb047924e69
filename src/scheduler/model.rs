//! Scheduler data model (C8)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, KafkaOpsError, Result};

use super::cron::next_run_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    TopicCleanup,
    ClusterCleanup,
    HealthCheck,
    MetadataCleanup,
    Custom,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::TopicCleanup => "topic-cleanup",
            TaskType::ClusterCleanup => "cluster-cleanup",
            TaskType::HealthCheck => "health-check",
            TaskType::MetadataCleanup => "metadata-cleanup",
            TaskType::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A registered recurring job. `next_run` is recomputed from
/// `cron_expression` every time the task fires or is (re-)enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub task_type: TaskType,
    pub name: String,
    pub description: Option<String>,
    pub cron_expression: String,
    pub enabled: bool,
    pub target_cluster: Option<String>,
    pub parameters: HashMap<String, Value>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
}

impl ScheduledTask {
    pub fn new(task_id: impl Into<String>, task_type: TaskType, name: impl Into<String>, cron_expression: impl Into<String>) -> Result<Self> {
        let cron_expression = cron_expression.into();
        let next_run = Some(next_run_time(&cron_expression, Utc::now())?);
        Ok(Self {
            task_id: task_id.into(),
            task_type,
            name: name.into(),
            description: None,
            cron_expression,
            enabled: true,
            target_cluster: None,
            parameters: HashMap::new(),
            next_run,
            last_run: None,
            run_count: 0,
            failure_count: 0,
        })
    }

    /// Recomputes `next_run` from the stored cron expression, anchored at
    /// `from`. Disabled tasks never get a `next_run`.
    pub fn reschedule(&mut self, from: DateTime<Utc>) -> Result<()> {
        self.next_run = if self.enabled { Some(next_run_time(&self.cron_expression, from)?) } else { None };
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.next_run.is_some_and(|run| run <= now)
    }
}

/// One run of a `ScheduledTask`, retained in bounded in-memory history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub execution_id: String,
    pub task_id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub logs: Vec<String>,
}

impl TaskExecution {
    pub fn start(execution_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            task_id: task_id.into(),
            status: TaskStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error_message: None,
            logs: Vec::new(),
        }
    }

    pub fn log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
    }

    pub fn complete(&mut self, result: Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn fail(&mut self, error_message: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error_message.into());
    }
}

/// Raised when a handler needs a `target_cluster` the task wasn't given one.
pub fn require_target_cluster(task: &ScheduledTask) -> Result<&str> {
    task.target_cluster
        .as_deref()
        .ok_or_else(|| KafkaOpsError::new(format!("task '{}' requires target_cluster", task.task_id), ErrorCode::ValidationError))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub total_tasks: usize,
    pub enabled_tasks: usize,
    pub running_tasks: usize,
    pub failed_tasks: usize,
    pub scheduler_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_expected_defaults() {
        let task = ScheduledTask::new("t-1", TaskType::HealthCheck, "check", "*/5 * * * *").unwrap();
        assert!(task.enabled);
        assert_eq!(task.run_count, 0);
        assert_eq!(task.failure_count, 0);
        assert!(task.next_run.is_some());
    }

    #[test]
    fn disabling_then_rescheduling_clears_next_run() {
        let mut task = ScheduledTask::new("t-1", TaskType::TopicCleanup, "cleanup", "0 * * * *").unwrap();
        task.enabled = false;
        task.reschedule(Utc::now()).unwrap();
        assert!(task.next_run.is_none());
    }

    #[test]
    fn missing_target_cluster_is_rejected() {
        let task = ScheduledTask::new("t-1", TaskType::TopicCleanup, "cleanup", "0 * * * *").unwrap();
        let err = require_target_cluster(&task).unwrap_err();
        assert!(err.message.contains("requires target_cluster"));
    }
}
