// Crash recovery logic
use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{TaskConsumer, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Crash recovery service
///
/// Puts jobs reserved by a worker that died (RECEIVED/STARTED/RETRY) back
/// into their queue. At startup the daemon owns every reservation, so all of
/// them are requeued; while running, only reservations older than the
/// recovery window are. Delivery is therefore at-least-once: a recovered job
/// may run again from its first attempt.
pub struct RecoveryService {
    consumer: Arc<dyn TaskConsumer>,
    time_provider: Arc<dyn TimeProvider>,
    recovery_window: Duration,
}

impl RecoveryService {
    /// Create a new recovery service
    ///
    /// # Arguments
    /// * `consumer` - Broker consumer side
    /// * `time_provider` - Time provider
    /// * `recovery_window` - Minimum age of a reservation before it is considered orphaned
    ///
    /// # Example
    /// ```ignore
    /// let recovery = RecoveryService::new(consumer, time_provider, Duration::from_secs(660));
    /// recovery.recover_orphaned_jobs().await?;
    /// ```
    pub fn new(
        consumer: Arc<dyn TaskConsumer>,
        time_provider: Arc<dyn TimeProvider>,
        recovery_window: Duration,
    ) -> Self {
        Self {
            consumer,
            time_provider,
            recovery_window,
        }
    }

    /// Requeue every reservation regardless of age
    ///
    /// Only valid before any worker of this process has reserved a job.
    pub async fn recover_all_reservations(&self) -> Result<usize> {
        info!("Requeueing every reservation left by the previous process");
        self.requeue_received_before(i64::MAX).await
    }

    /// Requeue reservations older than the recovery window
    ///
    /// # Returns
    /// Number of jobs requeued
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let window_ms = i64::try_from(self.recovery_window.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.time_provider.now_millis().saturating_sub(window_ms);
        self.requeue_received_before(cutoff).await
    }

    /// Sweep for orphaned reservations every `sweep_interval` until shutdown
    pub async fn run(self, sweep_interval: Duration, mut shutdown: ShutdownToken) {
        info!(
            recovery_window_secs = self.recovery_window.as_secs(),
            sweep_interval_secs = sweep_interval.as_secs(),
            "Recovery sweep started"
        );

        let mut tick = interval(sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately; startup recovery already ran
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.recover_orphaned_jobs().await {
                        error!(error = %e, "Recovery sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Recovery sweep stopped");
                    break;
                }
            }
        }
    }

    async fn requeue_received_before(&self, cutoff: i64) -> Result<usize> {
        let requeued = self.consumer.requeue_stale(cutoff).await?;
        for job_id in &requeued {
            info!(job_id = %job_id, "Orphaned job requeued");
        }
        if !requeued.is_empty() {
            info!(recovered_count = requeued.len(), "Orphaned job recovery complete");
        }
        Ok(requeued.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobKind, JobPayload, JobState};
    use crate::port::{Broker, InMemoryBroker, ManualTimeProvider, TaskMessage, UuidProvider};
    use serde_json::json;

    #[tokio::test]
    async fn test_only_old_reservations_are_requeued() {
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let broker = Arc::new(InMemoryBroker::with_providers(
            Arc::new(UuidProvider),
            clock.clone(),
        ));
        let message = || {
            TaskMessage::for_job(
                JobKind::Match,
                JobPayload::new(json!({"resume": "r", "jd": "j"})),
            )
        };
        let llm = vec!["llm".to_string()];

        let old = broker.enqueue(message()).await.unwrap();
        broker.reserve(&llm).await.unwrap();
        broker.mark_started(&old, 1).await.unwrap();

        clock.advance(10 * 60 * 1000);
        let fresh = broker.enqueue(message()).await.unwrap();
        broker.reserve(&llm).await.unwrap();

        let recovery = RecoveryService::new(broker.clone(), clock.clone(), Duration::from_secs(300));
        assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 1);

        assert_eq!(broker.job(&old).unwrap().state, JobState::Pending);
        assert_eq!(broker.job(&fresh).unwrap().state, JobState::Received);
    }

    #[tokio::test]
    async fn test_startup_recovery_ignores_age() {
        let clock = Arc::new(ManualTimeProvider::new(1_000_000));
        let broker = Arc::new(InMemoryBroker::with_providers(
            Arc::new(UuidProvider),
            clock.clone(),
        ));
        let id = broker
            .enqueue(TaskMessage::for_job(
                JobKind::Enhance,
                JobPayload::new(json!({"resume": "r", "jd": "j"})),
            ))
            .await
            .unwrap();
        broker.reserve(&["llm".to_string()]).await.unwrap();
        broker.mark_started(&id, 1).await.unwrap();
        clock.advance(10_000);

        // Well inside the window: the age-based sweep leaves it alone
        let recovery = RecoveryService::new(broker.clone(), clock.clone(), Duration::from_secs(660));
        assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 0);
        assert_eq!(broker.job(&id).unwrap().state, JobState::Started);

        assert_eq!(recovery.recover_all_reservations().await.unwrap(), 1);
        assert_eq!(broker.job(&id).unwrap().state, JobState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_requeues_once_window_passes() {
        let clock = Arc::new(ManualTimeProvider::new(0));
        let broker = Arc::new(InMemoryBroker::with_providers(
            Arc::new(UuidProvider),
            clock.clone(),
        ));
        let id = broker
            .enqueue(TaskMessage::for_job(
                JobKind::Match,
                JobPayload::new(json!({"resume": "r", "jd": "j"})),
            ))
            .await
            .unwrap();
        broker.reserve(&["llm".to_string()]).await.unwrap();

        let (shutdown_tx, shutdown) = crate::application::shutdown_channel();
        let recovery = RecoveryService::new(broker.clone(), clock.clone(), Duration::from_secs(120));
        let sweep = tokio::spawn(recovery.run(Duration::from_secs(60), shutdown));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(broker.job(&id).unwrap().state, JobState::Received);

        clock.advance(180_000);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(broker.job(&id).unwrap().state, JobState::Pending);

        shutdown_tx.shutdown();
        sweep.await.unwrap();
    }
}
