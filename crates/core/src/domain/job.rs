// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::{route, Route};
use crate::domain::result::TaskOutcome;
use serde::{Deserialize, Serialize};

/// Job ID (assigned by the broker at enqueue time)
pub type JobId = String;

/// Payload field holding the resume text
pub const RESUME_FIELD: &str = "resume";

/// Payload field holding the job description text
pub const JD_FIELD: &str = "jd";

/// Key that must never travel inside the payload body
pub const JOB_TYPE_FIELD: &str = "job_type";

/// Job kind (closed set)
///
/// `Warmup` is a degenerate kind used to preload the model on the
/// execution backend; it cannot be submitted through the regular path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Match,
    Enhance,
    CoverLetter,
    Warmup,
}

impl JobKind {
    /// Kinds accepted by `JobGateway::submit`
    pub const SUBMITTABLE: [JobKind; 3] = [JobKind::Match, JobKind::Enhance, JobKind::CoverLetter];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Match => "match",
            JobKind::Enhance => "enhance",
            JobKind::CoverLetter => "cover_letter",
            JobKind::Warmup => "warmup",
        }
    }

    /// Parse any known kind, including `warmup`
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "match" => Ok(JobKind::Match),
            "enhance" => Ok(JobKind::Enhance),
            "cover_letter" => Ok(JobKind::CoverLetter),
            "warmup" => Ok(JobKind::Warmup),
            other => Err(DomainError::UnknownJobKind(other.to_string())),
        }
    }

    /// Parse a client-supplied kind; only the LLM job kinds are accepted
    pub fn parse_submittable(s: &str) -> Result<Self> {
        let kind = Self::parse(s.trim())?;
        if !kind.is_submittable() {
            return Err(DomainError::UnknownJobKind(s.to_string()));
        }
        Ok(kind)
    }

    pub fn is_submittable(&self) -> bool {
        Self::SUBMITTABLE.contains(self)
    }

    /// Routing decision for this kind (immutable once computed)
    pub fn route(&self) -> Route {
        route(*self)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized job state
///
/// Every broker-native state string is mapped into this enumeration;
/// anything unrecognised becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Received,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
    Unknown,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Received => "RECEIVED",
            JobState::Started => "STARTED",
            JobState::Retry => "RETRY",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Revoked => "REVOKED",
            JobState::Unknown => "UNKNOWN",
        }
    }

    /// Map a broker-native state string (case-insensitive)
    pub fn from_native(native: &str) -> Self {
        match native.trim().to_ascii_uppercase().as_str() {
            "PENDING" => JobState::Pending,
            "RECEIVED" => JobState::Received,
            "STARTED" => JobState::Started,
            "RETRY" => JobState::Retry,
            "SUCCESS" => JobState::Success,
            "FAILURE" => JobState::Failure,
            "REVOKED" => JobState::Revoked,
            _ => JobState::Unknown,
        }
    }

    /// SUCCESS, FAILURE and REVOKED never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure | JobState::Revoked)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job Payload (JSON object with at least `resume` and `jd`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Empty payload (warmup jobs carry no input)
    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Validate and clean a client-supplied payload.
    ///
    /// Drops any `job_type` key from the body and requires both text
    /// fields to be non-empty after trimming.
    pub fn from_submission(value: serde_json::Value) -> Result<Self> {
        let mut map = match value {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(DomainError::ValidationError(
                    "payload must be a JSON object".to_string(),
                ))
            }
        };
        map.remove(JOB_TYPE_FIELD);

        for field in [RESUME_FIELD, JD_FIELD] {
            let text = map.get(field).and_then(|v| v.as_str()).unwrap_or_default();
            if text.trim().is_empty() {
                return Err(DomainError::ValidationError(format!(
                    "'{}' must be a non-empty string",
                    field
                )));
            }
        }

        Ok(Self(serde_json::Value::Object(map)))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.as_str())
    }
}

/// Progress info while an attempt runs
pub fn attempt_info(attempt: u32) -> serde_json::Value {
    serde_json::json!({ "attempt": attempt })
}

/// Progress info while waiting for a retry
pub fn retry_info(attempt: u32, error: &str, retry_in_ms: u64) -> serde_json::Value {
    serde_json::json!({
        "attempt": attempt,
        "last_error": error,
        "retry_in_ms": retry_in_ms,
    })
}

/// Job Entity as held by a broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task_name: String,
    pub kind: JobKind,
    pub queue: String,
    pub routing_key: String,
    pub payload: JobPayload,
    pub state: JobState,

    /// Attempts started so far (1-based once running)
    pub attempts: u32,

    pub created_at: i64, // epoch ms
    pub received_at: Option<i64>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    /// Structured progress metadata (attempt, last error, ...)
    pub info: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Job {
    /// Create a new PENDING job with routing derived from `kind`
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `kind` - Job kind
    /// * `payload` - Validated payload
    pub fn new(id: impl Into<String>, created_at: i64, kind: JobKind, payload: JobPayload) -> Self {
        let route = kind.route();
        Self {
            id: id.into(),
            task_name: route.task_name.to_string(),
            kind,
            queue: route.queue.to_string(),
            routing_key: route.routing_key,
            payload,
            state: JobState::Pending,
            attempts: 0,
            created_at,
            received_at: None,
            started_at: None,
            finished_at: None,
            info: None,
            result: None,
            error: None,
        }
    }

    /// PENDING -> RECEIVED (reserved by a worker)
    pub fn receive(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Pending {
            return Err(self.invalid(JobState::Received));
        }
        self.state = JobState::Received;
        self.received_at = Some(now_millis);
        Ok(())
    }

    /// RECEIVED/RETRY -> STARTED for the given attempt
    pub fn start(&mut self, attempt: u32, now_millis: i64) -> Result<()> {
        if !matches!(
            self.state,
            JobState::Received | JobState::Retry | JobState::Started
        ) {
            return Err(self.invalid(JobState::Started));
        }
        self.state = JobState::Started;
        self.attempts = attempt;
        self.started_at = Some(now_millis);
        self.info = Some(attempt_info(attempt));
        Ok(())
    }

    /// STARTED -> RETRY (waiting for the backoff to elapse)
    pub fn retry(&mut self, attempt: u32, error: &str, retry_in_ms: u64) -> Result<()> {
        if self.state != JobState::Started {
            return Err(self.invalid(JobState::Retry));
        }
        self.state = JobState::Retry;
        self.info = Some(retry_info(attempt, error, retry_in_ms));
        Ok(())
    }

    /// Terminal success
    pub fn succeed(&mut self, value: serde_json::Value, now_millis: i64) -> Result<()> {
        self.finish(JobState::Success, now_millis)?;
        self.result = Some(value);
        self.error = None;
        Ok(())
    }

    /// Terminal failure
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        self.finish(JobState::Failure, now_millis)?;
        self.result = None;
        self.error = Some(error.into());
        Ok(())
    }

    /// Put a reserved, non-terminal job back in its queue
    pub fn requeue(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(JobState::Pending));
        }
        self.state = JobState::Pending;
        self.received_at = None;
        self.started_at = None;
        Ok(())
    }

    /// Stored terminal outcome (None while in flight and for REVOKED)
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            JobState::Success => Some(TaskOutcome::Success(
                self.result.clone().unwrap_or(serde_json::Value::Null),
            )),
            JobState::Failure => Some(TaskOutcome::Failure(
                self.error.clone().unwrap_or_default(),
            )),
            _ => None,
        }
    }

    fn finish(&mut self, to: JobState, now_millis: i64) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(to));
        }
        self.state = to;
        self.finished_at = Some(now_millis);
        self.info = None;
        Ok(())
    }

    fn invalid(&self, to: JobState) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
