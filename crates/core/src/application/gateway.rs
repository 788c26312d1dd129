// Job Gateway - client-facing submit/status/result/wait

use crate::domain::{JobId, JobKind, JobPayload, JobResult, JobState, StatusReport};
use crate::error::{AppError, Result};
use crate::port::{BlockingGet, Broker, TaskMessage, MAX_BLOCKING_WAIT};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default blocking-wait budget (30s)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub default_wait_timeout: Duration,
    pub warmup_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_wait_timeout: DEFAULT_WAIT_TIMEOUT,
            warmup_enabled: true,
        }
    }
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// Job reached a terminal state
    Completed(JobResult),
    /// Budget elapsed; carries the current snapshot
    TimedOut { snapshot: JobResult, waited: Duration },
    /// Broker could not be read; the job itself is unaffected
    BrokerError { job_id: JobId, message: String },
}

impl WaitOutcome {
    /// Wire shape: always a well-formed JobResult
    pub fn into_job_result(self) -> JobResult {
        match self {
            WaitOutcome::Completed(result) => result,
            WaitOutcome::TimedOut { snapshot, waited } => {
                let message = format!(
                    "Timed out after {:.1}s waiting for job; current status {}",
                    waited.as_secs_f64(),
                    snapshot.status
                );
                snapshot.with_error(message)
            }
            WaitOutcome::BrokerError { job_id, message } => {
                JobResult::snapshot(job_id, JobState::Unknown)
                    .with_error(format!("Broker error while waiting: {}", message))
            }
        }
    }
}

/// Client-facing API over an injected broker
pub struct JobGateway {
    broker: Arc<dyn Broker>,
    config: GatewayConfig,
}

impl JobGateway {
    pub fn new(broker: Arc<dyn Broker>, config: GatewayConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Validate and enqueue a job; never blocks on execution
    ///
    /// # Errors
    /// - AppError::Validation for an unknown job type or empty text fields
    pub async fn submit(&self, job_type: &str, payload: Value) -> Result<JobId> {
        let kind = JobKind::parse_submittable(job_type)?;
        let payload = JobPayload::from_submission(payload)?;
        let message = TaskMessage::for_job(kind, payload);
        let queue = message.queue.clone();

        let job_id = self.broker.enqueue(message).await?;
        info!(job_id = %job_id, job_type = %kind, queue = %queue, "Job submitted");
        Ok(job_id)
    }

    /// Non-blocking status
    ///
    /// # Errors
    /// - AppError::NotFound if the broker has no record of `job_id`
    pub async fn status(&self, job_id: &str) -> Result<StatusReport> {
        let snapshot = self
            .broker
            .get_state(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        let status = JobState::from_native(&snapshot.state);
        if status == JobState::Unknown {
            debug!(job_id = %job_id, native_state = %snapshot.state, "Unmapped broker state");
        }

        Ok(StatusReport {
            job_id: job_id.to_string(),
            status,
            info: snapshot.info.filter(Value::is_object),
        })
    }

    /// Non-blocking snapshot
    ///
    /// # Errors
    /// - AppError::NotFound if the broker has no record of `job_id`
    pub async fn result(&self, job_id: &str) -> Result<JobResult> {
        let status = self.status(job_id).await?.status;
        let outcome = if matches!(status, JobState::Success | JobState::Failure) {
            self.broker.get_result(job_id).await?
        } else {
            None
        };
        Ok(JobResult::from_parts(job_id, status, outcome))
    }

    /// Block the calling task until the job is terminal or the budget elapses
    ///
    /// `None` uses the configured default budget; budgets above
    /// `MAX_BLOCKING_WAIT` are clamped. Broker read failures are captured in
    /// the outcome rather than returned.
    ///
    /// # Errors
    /// - AppError::NotFound if the broker has no record of `job_id`
    pub async fn wait(&self, job_id: &str, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let timeout = timeout
            .unwrap_or(self.config.default_wait_timeout)
            .min(MAX_BLOCKING_WAIT);

        match self.broker.get_state(job_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(AppError::NotFound(format!("job {}", job_id))),
            Err(e) => return Ok(broker_error(job_id, e)),
        }

        match self.broker.blocking_get(job_id, timeout).await {
            Ok(BlockingGet::Ready(outcome)) => {
                let status = outcome.state();
                Ok(WaitOutcome::Completed(JobResult::from_parts(
                    job_id,
                    status,
                    Some(outcome),
                )))
            }
            Ok(BlockingGet::TimedOut) => match self.result(job_id).await {
                // Finished between the deadline and the re-read
                Ok(snapshot) if snapshot.is_terminal() => Ok(WaitOutcome::Completed(snapshot)),
                Ok(snapshot) => {
                    debug!(job_id = %job_id, status = %snapshot.status, "Wait timed out");
                    Ok(WaitOutcome::TimedOut {
                        snapshot,
                        waited: timeout,
                    })
                }
                Err(AppError::NotFound(msg)) => Err(AppError::NotFound(msg)),
                Err(e) => Ok(broker_error(job_id, e)),
            },
            Err(AppError::NotFound(msg)) => Err(AppError::NotFound(msg)),
            Err(e) => Ok(broker_error(job_id, e)),
        }
    }

    /// `wait` flattened into the wire shape
    pub async fn wait_for_result(&self, job_id: &str, timeout: Option<Duration>) -> Result<JobResult> {
        Ok(self.wait(job_id, timeout).await?.into_job_result())
    }

    /// Enqueue a model preload task
    ///
    /// # Errors
    /// - AppError::InvalidState if warmup is disabled
    pub async fn submit_warmup(&self) -> Result<JobId> {
        self.ensure_warmup_enabled()?;
        let job_id = self
            .broker
            .enqueue(TaskMessage::for_job(JobKind::Warmup, JobPayload::empty()))
            .await?;
        info!(job_id = %job_id, "Warmup submitted");
        Ok(job_id)
    }

    /// Same polling contract as `wait_for_result`
    pub async fn wait_warmup(&self, job_id: &str, timeout: Option<Duration>) -> Result<JobResult> {
        self.ensure_warmup_enabled()?;
        self.wait_for_result(job_id, timeout).await
    }

    fn ensure_warmup_enabled(&self) -> Result<()> {
        if self.config.warmup_enabled {
            Ok(())
        } else {
            Err(AppError::InvalidState("warmup is disabled".to_string()))
        }
    }
}

fn broker_error(job_id: &str, e: AppError) -> WaitOutcome {
    warn!(job_id = %job_id, error = %e, "Broker error during wait");
    WaitOutcome::BrokerError {
        job_id: job_id.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskOutcome;
    use crate::port::broker::MockBroker;
    use crate::port::{InMemoryBroker, StateSnapshot, TaskConsumer};
    use serde_json::json;

    fn gateway(broker: Arc<InMemoryBroker>) -> JobGateway {
        JobGateway::new(broker, GatewayConfig::default())
    }

    fn body() -> Value {
        json!({"resume": "Senior Rust engineer", "jd": "Rust backend role"})
    }

    async fn finish(broker: &InMemoryBroker, id: &str, outcome: TaskOutcome) {
        broker.reserve(&["llm".to_string()]).await.unwrap();
        broker.mark_started(id, 1).await.unwrap();
        broker.store_outcome(id, outcome).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_rejects_unknown_type_without_enqueue() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());

        for bad in ["poem", "warmup", "", "Match"] {
            let err = gw.submit(bad, body()).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}: {:?}", bad, err);
        }
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_submit_rejects_blank_text() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());

        let err = gw
            .submit("match", json!({"resume": "   ", "jd": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_submit_strips_job_type_and_routes() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());

        let mut payload = body();
        payload["job_type"] = json!("cover_letter");
        let id = gw.submit("enhance", payload).await.unwrap();

        let job = broker.job(&id).unwrap();
        assert_eq!(job.kind, JobKind::Enhance);
        assert_eq!(job.queue, "llm");
        assert_eq!(job.routing_key, "llm.enhance");
        assert!(job.payload.as_value().get("job_type").is_none());
        assert_eq!(gw.status(&id).await.unwrap().status, JobState::Pending);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let gw = gateway(Arc::new(InMemoryBroker::new()));
        assert!(matches!(gw.status("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(gw.result("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            gw.wait_for_result("nope", Some(Duration::ZERO)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_result_is_idempotent_on_terminal_job() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());
        let id = gw.submit("match", body()).await.unwrap();
        finish(&broker, &id, TaskOutcome::Success(json!({"match_score": 85}))).await;

        let first = gw.result(&id).await.unwrap();
        let second = gw.result(&id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, JobState::Success);
        assert!(first.error.is_none());

        let waited = gw.wait_for_result(&id, Some(Duration::ZERO)).await.unwrap();
        assert_eq!(waited, first);
    }

    #[tokio::test]
    async fn test_failed_job_exposes_error_only() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());
        let id = gw.submit("cover_letter", body()).await.unwrap();
        finish(&broker, &id, TaskOutcome::Failure("LLM down".into())).await;

        let result = gw.result(&id).await.unwrap();
        assert_eq!(result.status, JobState::Failure);
        assert_eq!(result.error.as_deref(), Some("LLM down"));
        assert!(result.result.is_none());
    }

    #[tokio::test]
    async fn test_zero_timeout_wait_returns_pending_with_error() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());
        let id = gw.submit("match", body()).await.unwrap();

        let outcome = gw.wait(&id, Some(Duration::ZERO)).await.unwrap();
        assert!(matches!(outcome, WaitOutcome::TimedOut { .. }));

        let result = outcome.into_job_result();
        assert_eq!(result.status, JobState::Pending);
        assert!(result.result.is_none());
        assert!(result.error.unwrap().contains("Timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_wait_budget_is_clamped() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());
        let id = gw.submit("match", body()).await.unwrap();

        let outcome = gw.wait(&id, Some(Duration::from_secs(u64::MAX))).await.unwrap();
        match outcome {
            WaitOutcome::TimedOut { snapshot, waited } => {
                assert_eq!(waited, MAX_BLOCKING_WAIT);
                assert_eq!(snapshot.status, JobState::Pending);
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        finish(&broker, &id, TaskOutcome::Failure("LLM down".into())).await;
        let result = gw.wait_for_result(&id, Some(Duration::MAX)).await.unwrap();
        assert_eq!(result.status, JobState::Failure);
    }

    #[tokio::test]
    async fn test_status_info_only_for_objects() {
        let broker = Arc::new(InMemoryBroker::new());
        let gw = gateway(broker.clone());
        let id = gw.submit("match", body()).await.unwrap();
        broker.reserve(&["llm".to_string()]).await.unwrap();
        broker.mark_started(&id, 1).await.unwrap();

        let status = gw.status(&id).await.unwrap();
        assert_eq!(status.status, JobState::Started);
        assert_eq!(status.info, Some(json!({"attempt": 1})));

        let mut mock = MockBroker::new();
        mock.expect_get_state().returning(|_| {
            Ok(Some(StateSnapshot {
                state: "PROGRESS".to_string(),
                info: Some(json!("halfway")),
            }))
        });
        let gw = JobGateway::new(Arc::new(mock), GatewayConfig::default());
        let status = gw.status("x").await.unwrap();
        assert_eq!(status.status, JobState::Unknown);
        assert!(status.info.is_none());
    }

    #[tokio::test]
    async fn test_broker_error_is_captured_during_wait() {
        let mut mock = MockBroker::new();
        mock.expect_get_state().returning(|_| {
            Ok(Some(StateSnapshot {
                state: "STARTED".to_string(),
                info: None,
            }))
        });
        mock.expect_blocking_get()
            .returning(|_, _| Err(AppError::Broker("connection reset".to_string())));
        let gw = JobGateway::new(Arc::new(mock), GatewayConfig::default());

        let result = gw.wait_for_result("job-9", None).await.unwrap();
        assert_eq!(result.job_id, "job-9");
        assert!(result.result.is_none());
        assert!(result.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_warmup_respects_flag() {
        let broker = Arc::new(InMemoryBroker::new());
        let enabled = gateway(broker.clone());
        let id = enabled.submit_warmup().await.unwrap();
        assert_eq!(broker.job(&id).unwrap().queue, "warmup");

        let disabled = JobGateway::new(
            broker,
            GatewayConfig {
                warmup_enabled: false,
                ..GatewayConfig::default()
            },
        );
        assert!(matches!(
            disabled.submit_warmup().await,
            Err(AppError::InvalidState(_))
        ));
    }
}
