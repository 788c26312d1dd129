// Task Runner - run-with-policy wrapper around the Execution Function

use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{JobKind, JobPayload, TaskOutcome};
use crate::error::{AppError, Result};
use crate::port::{ExecutionContext, ExecutionError, ExecutionFunction};
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

/// Default soft limit (10 minutes)
pub const DEFAULT_SOFT_TIME_LIMIT: Duration = Duration::from_secs(600);

/// Minimum gap between soft and hard limit, leaves room for cleanup paths
pub const HARD_TIMEOUT_BUFFER: Duration = Duration::from_secs(60);

/// Soft/hard time limits for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    soft: Duration,
    hard: Duration,
}

impl TimeoutPolicy {
    /// Build a policy; `hard` defaults to `soft + HARD_TIMEOUT_BUFFER`
    ///
    /// # Errors
    /// - AppError::Config if the hard limit is below `soft + HARD_TIMEOUT_BUFFER`
    pub fn new(soft: Duration, hard: Option<Duration>) -> Result<Self> {
        let minimum_hard = soft + HARD_TIMEOUT_BUFFER;
        let hard = hard.unwrap_or(minimum_hard);
        if hard < minimum_hard {
            return Err(AppError::Config(format!(
                "hard time limit ({}s) must be at least soft limit ({}s) + {}s",
                hard.as_secs(),
                soft.as_secs(),
                HARD_TIMEOUT_BUFFER.as_secs()
            )));
        }
        Ok(Self { soft, hard })
    }

    pub fn soft(&self) -> Duration {
        self.soft
    }

    pub fn hard(&self) -> Duration {
        self.hard
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            soft: DEFAULT_SOFT_TIME_LIMIT,
            hard: DEFAULT_SOFT_TIME_LIMIT + HARD_TIMEOUT_BUFFER,
        }
    }
}

/// Retry + timeout policy applied to every job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPolicy {
    pub retry: RetryPolicy,
    pub timeout: TimeoutPolicy,
}

impl TaskPolicy {
    /// Longest a job can stay reserved while its worker is alive: every
    /// attempt runs to the hard limit and every backoff hits its cap
    pub fn max_job_lifetime(&self) -> Duration {
        let retries = self.retry.max_retries;
        self.timeout
            .hard()
            .saturating_mul(retries.saturating_add(1))
            .saturating_add(self.retry.backoff_max.saturating_mul(retries))
    }
}

/// Receives attempt progress (the worker persists it in the broker)
#[async_trait]
pub trait AttemptObserver: Send + Sync {
    /// Attempt `attempt` (1-based) is about to start
    async fn on_attempt(&self, attempt: u32) -> Result<()>;

    /// Attempt `attempt` failed and will be retried after `delay`
    async fn on_retry(&self, attempt: u32, error: &str, delay: Duration) -> Result<()>;
}

/// Observer that records nothing
pub struct NoopObserver;

#[async_trait]
impl AttemptObserver for NoopObserver {
    async fn on_attempt(&self, _attempt: u32) -> Result<()> {
        Ok(())
    }

    async fn on_retry(&self, _attempt: u32, _error: &str, _delay: Duration) -> Result<()> {
        Ok(())
    }
}

/// Final result of running a job under a policy
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded { value: Value, attempts: u32 },
    Failed { error: String, attempts: u32 },
}

impl RunOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RunOutcome::Succeeded { attempts, .. } | RunOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_task_outcome(self) -> TaskOutcome {
        match self {
            RunOutcome::Succeeded { value, .. } => TaskOutcome::Success(value),
            RunOutcome::Failed { error, .. } => TaskOutcome::Failure(error),
        }
    }
}

/// Run the Execution Function under `policy`.
///
/// Every failure mode (error, panic, hard timeout) is retried while the
/// retry budget lasts; the last failure message becomes the job error.
/// Never panics and never returns an error.
///
/// # Arguments
/// * `policy` - Retry and timeout policy
/// * `execution` - Execution Function, invoked once per attempt
/// * `job_id` - Job being executed (logging and context)
/// * `kind` - Job kind
/// * `payload` - Job payload, cloned into every attempt
/// * `observer` - Attempt progress sink
pub async fn run_with_policy(
    policy: &TaskPolicy,
    execution: Arc<dyn ExecutionFunction>,
    job_id: &str,
    kind: JobKind,
    payload: &JobPayload,
    observer: &dyn AttemptObserver,
) -> RunOutcome {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;

        if let Err(e) = observer.on_attempt(attempt).await {
            warn!(job_id = %job_id, attempt = attempt, error = %e, "Failed to record attempt start");
        }
        info!(job_id = %job_id, job_type = %kind, attempt = attempt, "Attempt started");

        let started = Instant::now();
        let error = match run_attempt(&policy.timeout, &execution, job_id, kind, payload, attempt).await
        {
            Ok(value) => {
                info!(
                    job_id = %job_id,
                    job_type = %kind,
                    attempt = attempt,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Attempt succeeded"
                );
                return RunOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        warn!(job_id = %job_id, job_type = %kind, attempt = attempt, error = %error, "Attempt failed");

        match policy.retry.should_retry(job_id, attempt) {
            RetryDecision::Retry(delay) => {
                if let Err(e) = observer.on_retry(attempt, &error, delay).await {
                    warn!(job_id = %job_id, attempt = attempt, error = %e, "Failed to record retry");
                }
                sleep(delay).await;
            }
            RetryDecision::Failed => {
                error!(
                    job_id = %job_id,
                    job_type = %kind,
                    attempts = attempt,
                    error = %error,
                    "Job failed after exhausting retries"
                );
                return RunOutcome::Failed {
                    error,
                    attempts: attempt,
                };
            }
        }
    }
}

/// One attempt in its own task: soft limit signalled, hard limit aborts
async fn run_attempt(
    timeout: &TimeoutPolicy,
    execution: &Arc<dyn ExecutionFunction>,
    job_id: &str,
    kind: JobKind,
    payload: &JobPayload,
    attempt: u32,
) -> std::result::Result<Value, String> {
    let (soft_tx, soft_rx) = watch::channel(false);
    let ctx = ExecutionContext::new(job_id, attempt, soft_rx);
    let execution = Arc::clone(execution);
    let payload = payload.clone();

    let mut handle = tokio::spawn(async move { execution.execute(kind, payload, ctx).await });

    let soft = sleep(timeout.soft());
    let hard = sleep(timeout.hard());
    tokio::pin!(soft);
    tokio::pin!(hard);
    let mut soft_signalled = false;

    loop {
        tokio::select! {
            biased;
            joined = &mut handle => {
                return match joined {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(join_err) if join_err.is_panic() => {
                        Err(format!("execution panicked: {}", panic_message(join_err.into_panic())))
                    }
                    Err(_) => Err(ExecutionError::Aborted("execution cancelled".to_string()).to_string()),
                };
            }
            _ = &mut hard => {
                handle.abort();
                error!(
                    job_id = %job_id,
                    attempt = attempt,
                    hard_limit_secs = timeout.hard().as_secs(),
                    "Hard time limit exceeded, attempt aborted"
                );
                return Err(ExecutionError::Aborted(format!(
                    "hard time limit exceeded ({}s)",
                    timeout.hard().as_secs()
                ))
                .to_string());
            }
            _ = &mut soft, if !soft_signalled => {
                soft_signalled = true;
                warn!(
                    job_id = %job_id,
                    attempt = attempt,
                    soft_limit_secs = timeout.soft().as_secs(),
                    "Soft time limit exceeded, asking execution to wrap up"
                );
                let _ = soft_tx.send(true);
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::execution::mocks::{ScriptedExecution, Step};
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AttemptObserver for RecordingObserver {
        async fn on_attempt(&self, attempt: u32) -> Result<()> {
            self.events.lock().unwrap().push(format!("start:{}", attempt));
            Ok(())
        }

        async fn on_retry(&self, attempt: u32, error: &str, _delay: Duration) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(format!("retry:{}:{}", attempt, error));
            Ok(())
        }
    }

    fn payload() -> JobPayload {
        JobPayload::new(json!({"resume": "r", "jd": "j"}))
    }

    async fn run(policy: &TaskPolicy, exec: &ScriptedExecution, observer: &RecordingObserver) -> RunOutcome {
        run_with_policy(
            policy,
            Arc::new(exec.clone()),
            "job-1",
            JobKind::Match,
            &payload(),
            observer,
        )
        .await
    }

    #[test]
    fn test_hard_limit_must_exceed_soft_by_buffer() {
        let soft = Duration::from_secs(600);
        assert_eq!(TimeoutPolicy::new(soft, None).unwrap().hard(), Duration::from_secs(660));
        assert!(TimeoutPolicy::new(soft, Some(Duration::from_secs(700))).is_ok());
        assert!(matches!(
            TimeoutPolicy::new(soft, Some(Duration::from_secs(630))),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_success_ends_in_success() {
        let exec = ScriptedExecution::new([
            Step::Fail("llm overloaded".into()),
            Step::Succeed(json!({"match_score": 80})),
        ]);
        let observer = RecordingObserver::default();

        let outcome = run(&TaskPolicy::default(), &exec, &observer).await;

        assert_eq!(
            outcome,
            RunOutcome::Succeeded {
                value: json!({"match_score": 80}),
                attempts: 2
            }
        );
        assert_eq!(exec.calls(), vec![(JobKind::Match, 1), (JobKind::Match, 2)]);
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start:1", "retry:1:llm overloaded", "start:2"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhaust_with_last_error() {
        let exec = ScriptedExecution::new([Step::Fail("first".into()), Step::Fail("second".into())]);
        let observer = RecordingObserver::default();

        let outcome = run(&TaskPolicy::default(), &exec, &observer).await;

        assert_eq!(
            outcome,
            RunOutcome::Failed {
                error: "second".into(),
                attempts: 2
            }
        );
    }

    #[test]
    fn test_max_job_lifetime_covers_every_attempt() {
        let policy = TaskPolicy {
            retry: RetryPolicy {
                max_retries: 2,
                backoff_max: Duration::from_secs(30),
                ..RetryPolicy::default()
            },
            timeout: TimeoutPolicy::default(),
        };
        assert_eq!(policy.max_job_lifetime(), Duration::from_secs(3 * 660 + 2 * 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_execution_fails_at_hard_limit() {
        let exec = ScriptedExecution::new([Step::Hang]);
        let policy = TaskPolicy {
            retry: RetryPolicy::no_retry(),
            timeout: TimeoutPolicy::default(),
        };
        let started = Instant::now();

        let outcome = run(&policy, &exec, &RecordingObserver::default()).await;

        match outcome {
            RunOutcome::Failed { error, attempts } => {
                assert!(
                    error.starts_with("Attempt aborted: hard time limit exceeded"),
                    "unexpected error: {}",
                    error
                );
                assert_eq!(attempts, 1);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_secs(660));
    }

    #[tokio::test(start_paused = true)]
    async fn test_soft_limit_lets_execution_wrap_up() {
        let exec = ScriptedExecution::new([Step::WrapUpOnSoftLimit(json!({"partial": true}))]);
        let policy = TaskPolicy {
            retry: RetryPolicy::no_retry(),
            timeout: TimeoutPolicy::default(),
        };

        let outcome = run(&policy, &exec, &RecordingObserver::default()).await;

        assert_eq!(
            outcome,
            RunOutcome::Succeeded {
                value: json!({"partial": true}),
                attempts: 1
            }
        );
    }

    #[tokio::test]
    async fn test_panic_is_isolated_and_reported() {
        let exec = ScriptedExecution::new([Step::Panic("pipeline exploded".into())]);
        let policy = TaskPolicy {
            retry: RetryPolicy::no_retry(),
            timeout: TimeoutPolicy::default(),
        };

        let outcome = run(&policy, &exec, &RecordingObserver::default()).await;

        match outcome {
            RunOutcome::Failed { error, .. } => assert!(error.contains("pipeline exploded")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
