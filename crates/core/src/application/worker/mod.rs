// Worker - Job execution loop

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::runner::{run_with_policy, AttemptObserver, RunOutcome, TaskPolicy};
use crate::domain::Job;
use crate::error::Result;
use crate::port::{ExecutionFunction, TaskConsumer};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker consuming one or more named queues
pub struct Worker {
    queues: Vec<String>,
    consumer: Arc<dyn TaskConsumer>,
    execution: Arc<dyn ExecutionFunction>,
    policy: Arc<TaskPolicy>,
}

impl Worker {
    /// Create a new worker
    ///
    /// # Arguments
    /// * `queues` - Queue names, checked in FIFO order across all of them
    /// * `consumer` - Broker consumer side
    /// * `execution` - Execution Function
    /// * `policy` - Retry and timeout policy
    pub fn new(
        queues: Vec<String>,
        consumer: Arc<dyn TaskConsumer>,
        execution: Arc<dyn ExecutionFunction>,
        policy: Arc<TaskPolicy>,
    ) -> Self {
        Self {
            queues,
            consumer,
            execution,
            policy,
        }
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// A job already running is finished before the loop exits.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queues = ?self.queues, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!(queues = ?self.queues, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(queues = ?self.queues, "Worker stopped");
        Ok(())
    }

    /// Process next job from the queues (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        // Reserved atomically (PENDING -> RECEIVED)
        let job = match self.consumer.reserve(&self.queues).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            job_id = %job.id,
            job_type = %job.kind,
            queue = %job.queue,
            task = %job.task_name,
            "Processing job"
        );

        let outcome = self.execute(&job).await;
        let attempts = outcome.attempts();
        let succeeded = matches!(outcome, RunOutcome::Succeeded { .. });

        let stored = self
            .consumer
            .store_outcome(&job.id, outcome.into_task_outcome())
            .await?;
        if !stored {
            warn!(job_id = %job.id, "Job already terminal, outcome discarded");
        }

        info!(
            job_id = %job.id,
            job_type = %job.kind,
            attempts = attempts,
            succeeded = succeeded,
            "Job finished"
        );
        Ok(true)
    }

    async fn execute(&self, job: &Job) -> RunOutcome {
        let observer = BrokerObserver {
            consumer: Arc::clone(&self.consumer),
            job_id: job.id.clone(),
        };
        run_with_policy(
            &self.policy,
            Arc::clone(&self.execution),
            &job.id,
            job.kind,
            &job.payload,
            &observer,
        )
        .await
    }
}

/// Persists STARTED/RETRY transitions with structured info
struct BrokerObserver {
    consumer: Arc<dyn TaskConsumer>,
    job_id: String,
}

#[async_trait]
impl AttemptObserver for BrokerObserver {
    async fn on_attempt(&self, attempt: u32) -> Result<()> {
        self.consumer.mark_started(&self.job_id, attempt).await
    }

    async fn on_retry(&self, attempt: u32, error: &str, delay: Duration) -> Result<()> {
        self.consumer
            .mark_retry(&self.job_id, attempt, error, delay.as_millis() as u64)
            .await
    }
}
