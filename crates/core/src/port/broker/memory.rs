// In-memory broker (tests and `memory://` deployments)

use super::{BlockingGet, Broker, StateSnapshot, TaskConsumer, TaskMessage};
use crate::domain::{Job, JobId, JobState, TaskOutcome};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, SystemTimeProvider, TimeProvider, UuidProvider};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    /// Enqueue order, used for FIFO reservation
    order: VecDeque<JobId>,
}

/// Broker and result store held in process memory
pub struct InMemoryBroker {
    inner: Mutex<Inner>,
    completed: Notify,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_providers(Arc::new(UuidProvider), Arc::new(SystemTimeProvider))
    }

    pub fn with_providers(
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            completed: Notify::new(),
            id_provider,
            time_provider,
        }
    }

    /// Full job record (tests and diagnostics)
    pub fn job(&self, job_id: &str) -> Option<Job> {
        self.lock().ok().and_then(|inner| inner.jobs.get(job_id).cloned())
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Broker("in-memory broker lock poisoned".to_string()))
    }

    fn with_job<T>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> Result<T>) -> Result<T> {
        let mut inner = self.lock()?;
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| AppError::NotFound(job_id.to_string()))?;
        f(job)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn enqueue(&self, message: TaskMessage) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let mut job = Job::new(
            id.clone(),
            self.time_provider.now_millis(),
            message.kind,
            message.payload,
        );
        job.task_name = message.task_name;
        job.queue = message.queue;
        job.routing_key = message.routing_key;

        let mut inner = self.lock()?;
        if inner.jobs.contains_key(&id) {
            return Err(AppError::Conflict(format!("job id already exists: {}", id)));
        }
        inner.jobs.insert(id.clone(), job);
        inner.order.push_back(id.clone());
        debug!(job_id = %id, "Enqueued job in memory");
        Ok(id)
    }

    async fn get_state(&self, job_id: &str) -> Result<Option<StateSnapshot>> {
        Ok(self.lock()?.jobs.get(job_id).map(StateSnapshot::of))
    }

    async fn get_result(&self, job_id: &str) -> Result<Option<TaskOutcome>> {
        self.with_job(job_id, |job| Ok(job.outcome()))
    }

    async fn blocking_get(&self, job_id: &str, timeout: Duration) -> Result<BlockingGet> {
        let deadline = super::wait_deadline(timeout);
        loop {
            // Register interest before checking to avoid missing a wakeup
            let notified = self.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.with_job(job_id, |job| Ok(job.outcome()))? {
                return Ok(BlockingGet::Ready(outcome));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(BlockingGet::TimedOut);
            }
        }
    }
}

#[async_trait]
impl TaskConsumer for InMemoryBroker {
    async fn reserve(&self, queues: &[String]) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let next = inner.order.iter().find(|id| {
            inner
                .jobs
                .get(id.as_str())
                .is_some_and(|job| job.state == JobState::Pending && queues.contains(&job.queue))
        });
        let Some(id) = next.cloned() else {
            return Ok(None);
        };

        match inner.jobs.get_mut(&id) {
            Some(job) => {
                job.receive(now)?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_started(&self, job_id: &str, attempt: u32) -> Result<()> {
        let now = self.time_provider.now_millis();
        self.with_job(job_id, |job| Ok(job.start(attempt, now)?))
    }

    async fn mark_retry(
        &self,
        job_id: &str,
        attempt: u32,
        error: &str,
        retry_in_ms: u64,
    ) -> Result<()> {
        self.with_job(job_id, |job| Ok(job.retry(attempt, error, retry_in_ms)?))
    }

    async fn store_outcome(&self, job_id: &str, outcome: TaskOutcome) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let stored = self.with_job(job_id, |job| {
            if job.state.is_terminal() {
                return Ok(false);
            }
            match outcome {
                TaskOutcome::Success(value) => job.succeed(value, now)?,
                TaskOutcome::Failure(error) => job.fail(error, now)?,
            }
            Ok(true)
        })?;

        if stored {
            self.completed.notify_waiters();
        }
        Ok(stored)
    }

    async fn requeue_stale(&self, received_before: i64) -> Result<Vec<JobId>> {
        let mut inner = self.lock()?;
        let mut requeued = Vec::new();
        for job in inner.jobs.values_mut() {
            let reserved = matches!(
                job.state,
                JobState::Received | JobState::Started | JobState::Retry
            );
            if reserved && job.received_at.is_some_and(|t| t < received_before) {
                job.requeue()?;
                requeued.push(job.id.clone());
            }
        }
        Ok(requeued)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let mut inner = self.lock()?;
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|job| {
                job.state.is_terminal() && job.finished_at.is_some_and(|t| t < finished_before)
            })
            .map(|job| job.id.clone())
            .collect();

        for id in &expired {
            inner.jobs.remove(id);
        }
        inner.order.retain(|id| !expired.contains(id));
        Ok(expired.len() as u64)
    }
}
