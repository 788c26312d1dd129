// Execution Function Port
// Black-box pipeline turning (job kind, payload) into a result document

use crate::domain::{JobId, JobKind, JobPayload};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid pipeline output: {0}")]
    InvalidOutput(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Attempt aborted: {0}")]
    Aborted(String),
}

/// Per-attempt context handed to the Execution Function
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub job_id: JobId,
    /// 1-based attempt number; lets the pipeline deduplicate side effects
    pub attempt: u32,
    soft_limit: watch::Receiver<bool>,
}

impl ExecutionContext {
    pub fn new(job_id: impl Into<String>, attempt: u32, soft_limit: watch::Receiver<bool>) -> Self {
        Self {
            job_id: job_id.into(),
            attempt,
            soft_limit,
        }
    }

    /// Context whose soft limit never fires
    pub fn unlimited(job_id: impl Into<String>, attempt: u32) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(job_id, attempt, rx)
    }

    /// True once the soft time limit has elapsed
    pub fn soft_limit_reached(&self) -> bool {
        *self.soft_limit.borrow()
    }

    /// Resolves when the soft time limit elapses; never resolves otherwise
    pub async fn soft_limit_elapsed(&self) {
        let mut rx = self.soft_limit.clone();
        if rx.wait_for(|reached| *reached).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Execution Function
///
/// Implementations:
/// - SubprocessPipeline: external process speaking JSON over stdio
/// - StubPipeline: canned documents for local runs
#[async_trait]
pub trait ExecutionFunction: Send + Sync {
    /// Run one attempt. Invoked exactly once per attempt.
    ///
    /// Implementations should wrap up once `ctx.soft_limit_elapsed()` fires;
    /// the runner aborts the attempt at the hard limit regardless.
    async fn execute(
        &self,
        kind: JobKind,
        payload: JobPayload,
        ctx: ExecutionContext,
    ) -> Result<Value, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// One scripted attempt
    #[derive(Debug, Clone)]
    pub enum Step {
        Succeed(Value),
        Fail(String),
        /// Never returns (hard-limit testing)
        Hang,
        /// Panic with message (panic isolation testing)
        Panic(String),
        /// Sleep, then succeed
        Delay(Duration, Value),
        /// Return the value as soon as the soft limit fires
        WrapUpOnSoftLimit(Value),
    }

    /// Execution Function replaying a script; the last step repeats
    #[derive(Clone)]
    pub struct ScriptedExecution {
        steps: Arc<Mutex<VecDeque<Step>>>,
        last: Arc<Mutex<Step>>,
        calls: Arc<Mutex<Vec<(JobKind, u32)>>>,
    }

    impl ScriptedExecution {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            let steps: VecDeque<Step> = steps.into_iter().collect();
            let last = steps
                .back()
                .cloned()
                .unwrap_or_else(|| Step::Succeed(Value::Null));
            Self {
                steps: Arc::new(Mutex::new(steps)),
                last: Arc::new(Mutex::new(last)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn succeeding(value: Value) -> Self {
            Self::new([Step::Succeed(value)])
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self::new([Step::Fail(message.into())])
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// (kind, attempt) per invocation
        pub fn calls(&self) -> Vec<(JobKind, u32)> {
            self.calls.lock().unwrap().clone()
        }

        fn next_step(&self) -> Step {
            let mut steps = self.steps.lock().unwrap();
            match steps.pop_front() {
                Some(step) => step,
                None => self.last.lock().unwrap().clone(),
            }
        }
    }

    #[async_trait]
    impl ExecutionFunction for ScriptedExecution {
        async fn execute(
            &self,
            kind: JobKind,
            _payload: JobPayload,
            ctx: ExecutionContext,
        ) -> Result<Value, ExecutionError> {
            self.calls.lock().unwrap().push((kind, ctx.attempt));

            match self.next_step() {
                Step::Succeed(value) => Ok(value),
                Step::Fail(msg) => Err(ExecutionError::Failed(msg)),
                Step::Hang => {
                    std::future::pending::<()>().await;
                    Ok(Value::Null)
                }
                Step::Panic(msg) => {
                    panic!("{}", msg);
                }
                Step::Delay(duration, value) => {
                    tokio::time::sleep(duration).await;
                    Ok(value)
                }
                Step::WrapUpOnSoftLimit(value) => {
                    ctx.soft_limit_elapsed().await;
                    Ok(value)
                }
            }
        }
    }
}
