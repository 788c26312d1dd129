// Broker Port (Interface)
// Durable named queues plus a result store keyed by job id

pub mod memory;

use crate::domain::{Job, JobId, JobKind, JobPayload, TaskOutcome};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message placed on a named queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub task_name: String,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub queue: String,
    pub routing_key: String,
}

impl TaskMessage {
    /// Build a message with its route fixed at construction
    pub fn for_job(kind: JobKind, payload: JobPayload) -> Self {
        let route = kind.route();
        Self {
            task_name: route.task_name.to_string(),
            kind,
            payload,
            queue: route.queue.to_string(),
            routing_key: route.routing_key,
        }
    }
}

/// Broker-native state plus optional progress metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub state: String,
    pub info: Option<serde_json::Value>,
}

impl StateSnapshot {
    pub fn of(job: &Job) -> Self {
        Self {
            state: job.state.as_str().to_string(),
            info: job.info.clone(),
        }
    }
}

/// Longest single blocking read; larger budgets are clamped (1 day)
pub const MAX_BLOCKING_WAIT: Duration = Duration::from_secs(24 * 3600);

/// Deadline for a blocking read starting now, budget clamped to `MAX_BLOCKING_WAIT`
pub fn wait_deadline(timeout: Duration) -> tokio::time::Instant {
    tokio::time::Instant::now() + timeout.min(MAX_BLOCKING_WAIT)
}

/// Result of a bounded blocking read
#[derive(Debug, Clone, PartialEq)]
pub enum BlockingGet {
    Ready(TaskOutcome),
    /// Budget elapsed; stored state is untouched
    TimedOut,
}

/// Producer/result-store side, used by the gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a message and return the broker-assigned id
    async fn enqueue(&self, message: TaskMessage) -> Result<JobId>;

    /// Native state of a job, None if the broker has no record
    async fn get_state(&self, job_id: &str) -> Result<Option<StateSnapshot>>;

    /// Terminal outcome, None while in flight
    ///
    /// # Errors
    /// - AppError::NotFound if the broker has no record
    async fn get_result(&self, job_id: &str) -> Result<Option<TaskOutcome>>;

    /// Wait up to `timeout` (at most `MAX_BLOCKING_WAIT`) for a terminal outcome
    ///
    /// # Errors
    /// - AppError::NotFound if the broker has no record
    async fn blocking_get(&self, job_id: &str, timeout: Duration) -> Result<BlockingGet>;
}

/// Consumer side, used by workers and maintenance
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Reserve the oldest PENDING job in any of `queues` (PENDING -> RECEIVED)
    async fn reserve(&self, queues: &[String]) -> Result<Option<Job>>;

    /// Record the start of an attempt (1-based)
    async fn mark_started(&self, job_id: &str, attempt: u32) -> Result<()>;

    /// Record a failed attempt that will be retried after `retry_in_ms`
    async fn mark_retry(&self, job_id: &str, attempt: u32, error: &str, retry_in_ms: u64)
        -> Result<()>;

    /// Write the terminal outcome.
    ///
    /// Returns false (and changes nothing) if the job is already terminal,
    /// so an outcome is stored exactly once.
    async fn store_outcome(&self, job_id: &str, outcome: TaskOutcome) -> Result<bool>;

    /// Put reserved, non-terminal jobs received before `received_before` back to PENDING
    async fn requeue_stale(&self, received_before: i64) -> Result<Vec<JobId>>;

    /// Delete terminal jobs finished before `finished_before`
    async fn purge_finished(&self, finished_before: i64) -> Result<u64>;
}
