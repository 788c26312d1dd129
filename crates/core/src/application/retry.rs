// Retry logic
// Exponential backoff with random jitter, to avoid retry storms against the shared LLM backend
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Default extra attempts after the first
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default backoff base
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 2_000;
/// Default backoff cap
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
/// Default jitter (± fraction of the computed delay)
pub const DEFAULT_JITTER: f64 = 0.25;

/// Retry decision result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job after the given backoff
    Retry(Duration),
    /// Do not retry, job has failed permanently
    Failed,
}

/// Retry policy
///
/// delay(n) = min(base * 2^(n-1), max) * (1 ± jitter * U[0,1])
/// where n is the 1-based number of the attempt that just failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts allowed (first attempt + retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide what happens after `attempt` (1-based) failed
    ///
    /// # Example
    /// ```text
    /// match policy.should_retry(job_id, 1) {
    ///     RetryDecision::Retry(delay) => sleep(delay).await,
    ///     RetryDecision::Failed => store failure,
    /// }
    /// ```
    pub fn should_retry(&self, job_id: &str, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts() {
            warn!(
                job_id = %job_id,
                attempts = attempt,
                max_attempts = self.max_attempts(),
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let delay = self.backoff_for(attempt);
        info!(
            job_id = %job_id,
            attempt = attempt,
            max_attempts = self.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay)
    }

    /// Jittered backoff after the given failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.backoff_base.as_secs_f64() * 2f64.powi(exponent);
        let capped = raw.min(self.backoff_max.as_secs_f64());

        let jitter = self.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
        } else {
            1.0
        };

        Duration::from_secs_f64((capped * factor).max(0.0))
    }
}
