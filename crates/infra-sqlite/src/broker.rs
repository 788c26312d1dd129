// SQLite Broker Implementation
// Queue rows and result slots live in the same `tasks` table

use async_trait::async_trait;
use jdmatch_core::domain::job::{attempt_info, retry_info};
use jdmatch_core::domain::{Job, JobId, JobKind, JobPayload, JobState, TaskOutcome};
use jdmatch_core::error::{AppError, Result};
use jdmatch_core::port::{
    wait_deadline, BlockingGet, Broker, IdProvider, StateSnapshot, TaskConsumer, TaskMessage,
    TimeProvider,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default poll interval for `blocking_get`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

const RESERVED_STATES: [JobState; 3] = [JobState::Received, JobState::Started, JobState::Retry];
const TERMINAL_STATES: [JobState; 3] = [JobState::Success, JobState::Failure, JobState::Revoked];

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Conflict(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Broker(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Broker(format!("Database full: {}", db_err.message())),
                    _ => AppError::Broker(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Broker(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Broker("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Broker(format!("Column not found: {}", col)),
        _ => AppError::Broker(err.to_string()),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub struct SqliteBroker {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    poll_interval: Duration,
}

impl SqliteBroker {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override how often `blocking_get` re-reads the result slot
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Full job record (diagnostics and tests)
    pub async fn find(&self, job_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_job).transpose()
    }

    async fn require(&self, job_id: &str) -> Result<Job> {
        self.find(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(job_id.to_string()))
    }

    /// Explain a conditional update that touched no row
    async fn explain_noop(&self, job_id: &str, target: JobState) -> AppError {
        let current: std::result::Result<Option<String>, _> =
            sqlx::query_scalar("SELECT state FROM tasks WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(job_id.to_string()),
            Ok(Some(state)) => AppError::InvalidState(format!(
                "Cannot move job {} from {} to {}",
                job_id, state, target
            )),
            Err(e) => map_sqlx_error(e),
        }
    }
}

#[async_trait]
impl Broker for SqliteBroker {
    async fn enqueue(&self, message: TaskMessage) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();

        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, task_name, kind, queue, routing_key,
                payload, state, attempts, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.task_name)
        .bind(message.kind.as_str())
        .bind(&message.queue)
        .bind(&message.routing_key)
        .bind(message.payload.as_value().to_string())
        .bind(JobState::Pending.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %id, queue = %message.queue, "Enqueued job");
        Ok(id)
    }

    async fn get_state(&self, job_id: &str) -> Result<Option<StateSnapshot>> {
        let row: Option<(String, Option<String>)> =
            sqlx::query_as("SELECT state, info FROM tasks WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(|(state, info)| StateSnapshot {
            state,
            info: info.and_then(|s| serde_json::from_str(&s).ok()),
        }))
    }

    async fn get_result(&self, job_id: &str) -> Result<Option<TaskOutcome>> {
        Ok(self.require(job_id).await?.outcome())
    }

    async fn blocking_get(&self, job_id: &str, timeout: Duration) -> Result<BlockingGet> {
        let deadline = wait_deadline(timeout);
        loop {
            if let Some(outcome) = self.require(job_id).await?.outcome() {
                return Ok(BlockingGet::Ready(outcome));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(BlockingGet::TimedOut);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl TaskConsumer for SqliteBroker {
    async fn reserve(&self, queues: &[String]) -> Result<Option<Job>> {
        if queues.is_empty() {
            return Ok(None);
        }
        let now = self.time_provider.now_millis();

        // Single statement: the row is claimed atomically
        let sql = format!(
            r#"
            UPDATE tasks
            SET state = ?, received_at = ?
            WHERE id = (
                SELECT id FROM tasks
                WHERE state = ? AND queue IN ({})
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING *
            "#,
            placeholders(queues.len())
        );

        let mut query = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(JobState::Received.as_str())
            .bind(now)
            .bind(JobState::Pending.as_str());
        for queue in queues {
            query = query.bind(queue);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(TaskRow::into_job).transpose()
    }

    async fn mark_started(&self, job_id: &str, attempt: u32) -> Result<()> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = ?, attempts = ?, started_at = ?, info = ?
            WHERE id = ? AND state IN (?, ?, ?)
            "#,
        )
        .bind(JobState::Started.as_str())
        .bind(attempt as i64)
        .bind(now)
        .bind(attempt_info(attempt).to_string())
        .bind(job_id)
        .bind(RESERVED_STATES[0].as_str())
        .bind(RESERVED_STATES[1].as_str())
        .bind(RESERVED_STATES[2].as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_noop(job_id, JobState::Started).await);
        }
        Ok(())
    }

    async fn mark_retry(
        &self,
        job_id: &str,
        attempt: u32,
        error: &str,
        retry_in_ms: u64,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET state = ?, info = ? WHERE id = ? AND state = ?")
            .bind(JobState::Retry.as_str())
            .bind(retry_info(attempt, error, retry_in_ms).to_string())
            .bind(job_id)
            .bind(JobState::Started.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_noop(job_id, JobState::Retry).await);
        }
        Ok(())
    }

    async fn store_outcome(&self, job_id: &str, outcome: TaskOutcome) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let state = outcome.state();
        let (result, error) = match outcome {
            TaskOutcome::Success(value) => (Some(value.to_string()), None),
            TaskOutcome::Failure(error) => (None, Some(error)),
        };

        // Conditional write: terminal rows are never touched again
        let written = sqlx::query(
            r#"
            UPDATE tasks
            SET state = ?, finished_at = ?, result = ?, error = ?, info = NULL
            WHERE id = ? AND state NOT IN (?, ?, ?)
            "#,
        )
        .bind(state.as_str())
        .bind(now)
        .bind(result)
        .bind(error)
        .bind(job_id)
        .bind(TERMINAL_STATES[0].as_str())
        .bind(TERMINAL_STATES[1].as_str())
        .bind(TERMINAL_STATES[2].as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if written.rows_affected() == 0 {
            // Missing row is an error; an already-terminal row is not
            self.require(job_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn requeue_stale(&self, received_before: i64) -> Result<Vec<JobId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE tasks
            SET state = ?, received_at = NULL, started_at = NULL
            WHERE state IN (?, ?, ?) AND received_at < ?
            RETURNING id
            "#,
        )
        .bind(JobState::Pending.as_str())
        .bind(RESERVED_STATES[0].as_str())
        .bind(RESERVED_STATES[1].as_str())
        .bind(RESERVED_STATES[2].as_str())
        .bind(received_before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }

    async fn purge_finished(&self, finished_before: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE state IN (?, ?, ?) AND finished_at < ?")
            .bind(TERMINAL_STATES[0].as_str())
            .bind(TERMINAL_STATES[1].as_str())
            .bind(TERMINAL_STATES[2].as_str())
            .bind(finished_before)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    task_name: String,
    kind: String,
    queue: String,
    routing_key: String,
    payload: String,
    state: String,
    attempts: i64,
    created_at: i64,
    received_at: Option<i64>,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    info: Option<String>,
    result: Option<String>,
    error: Option<String>,
}

impl TaskRow {
    fn into_job(self) -> Result<Job> {
        let corrupt = |column: &str, e: &dyn std::fmt::Display| {
            AppError::Broker(format!("corrupt task row {} ({}): {}", self.id, column, e))
        };
        let kind = JobKind::parse(&self.kind).map_err(|e| corrupt("kind", &e))?;
        let payload: serde_json::Value =
            serde_json::from_str(&self.payload).map_err(|e| corrupt("payload", &e))?;
        let result: Option<serde_json::Value> = self
            .result
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()
            .map_err(|e| corrupt("result", &e))?;

        Ok(Job {
            id: self.id,
            task_name: self.task_name,
            kind,
            queue: self.queue,
            routing_key: self.routing_key,
            payload: JobPayload::new(payload),
            state: JobState::from_native(&self.state),
            attempts: self.attempts.max(0) as u32,
            created_at: self.created_at,
            received_at: self.received_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            info: self.info.and_then(|s| serde_json::from_str(&s).ok()),
            result,
            error: self.error,
        })
    }
}
