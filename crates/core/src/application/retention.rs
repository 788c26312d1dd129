// Retention Service
// Periodic purge of expired terminal results

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{TaskConsumer, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

/// Retention scheduler
///
/// Deletes SUCCESS/FAILURE/REVOKED jobs whose result is older than
/// `result_expires`, every `sweep_interval`.
pub struct RetentionScheduler {
    consumer: Arc<dyn TaskConsumer>,
    time_provider: Arc<dyn TimeProvider>,
    result_expires: Duration,
    sweep_interval: Duration,
}

impl RetentionScheduler {
    pub fn new(
        consumer: Arc<dyn TaskConsumer>,
        time_provider: Arc<dyn TimeProvider>,
        result_expires: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            time_provider,
            result_expires,
            sweep_interval,
        }
    }

    /// Run retention loop until shutdown (background task)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            result_expires_secs = self.result_expires.as_secs(),
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "Retention scheduler started"
        );

        let mut tick = interval(self.sweep_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Retention scheduler stopped");
                    break;
                }
            }
        }
    }

    /// Purge expired results immediately; returns the number removed
    pub async fn run_now(&self) -> Result<u64> {
        let cutoff = self.time_provider.now_millis() - self.result_expires.as_millis() as i64;
        let purged = self.consumer.purge_finished(cutoff).await?;
        if purged > 0 {
            info!(purged = purged, "Expired results purged");
        }
        Ok(purged)
    }
}
