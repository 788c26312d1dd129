//! Durability: restart, crash recovery and result retention on a file database

use std::sync::Arc;
use std::time::Duration;

use jdmatch_core::application::{
    GatewayConfig, JobGateway, RecoveryService, RetentionScheduler, TaskPolicy, Worker,
};
use jdmatch_core::domain::{JobState, TaskOutcome};
use jdmatch_core::error::AppError;
use jdmatch_core::port::execution::mocks::ScriptedExecution;
use jdmatch_core::port::{
    ManualTimeProvider, SystemTimeProvider, TaskConsumer, TimeProvider, UuidProvider,
};
use jdmatch_infra_sqlite::{create_pool, run_migrations, SqliteBroker};
use serde_json::json;
use tempfile::TempDir;

const START_MILLIS: i64 = 1_700_000_000_000;

fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("broker.db").display())
}

async fn open(url: &str, time_provider: Arc<dyn TimeProvider>) -> Arc<SqliteBroker> {
    let pool = create_pool(url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteBroker::new(pool, Arc::new(UuidProvider), time_provider))
}

fn queues() -> Vec<String> {
    vec!["llm".to_string(), "warmup".to_string()]
}

fn payload() -> serde_json::Value {
    json!({"resume": "Go, Rust", "jd": "Rust"})
}

#[tokio::test]
async fn test_pending_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = db_url(&dir);

    let mut ids = Vec::new();
    {
        let broker = open(&url, Arc::new(SystemTimeProvider)).await;
        let gateway = JobGateway::new(broker, GatewayConfig::default());
        for _ in 0..5 {
            ids.push(gateway.submit("match", payload()).await.unwrap());
        }
        // Pool dropped here
    }

    let broker = open(&url, Arc::new(SystemTimeProvider)).await;
    let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
    for id in &ids {
        assert_eq!(gateway.status(id).await.unwrap().status, JobState::Pending);
    }

    // Oldest first
    let worker = Worker::new(
        queues(),
        broker.clone(),
        Arc::new(ScriptedExecution::succeeding(json!({"kind": "match", "match_score": 100}))),
        Arc::new(TaskPolicy::default()),
    );
    assert!(worker.process_next_job().await.unwrap());
    assert_eq!(gateway.result(&ids[0]).await.unwrap().status, JobState::Success);
    assert_eq!(gateway.status(&ids[1]).await.unwrap().status, JobState::Pending);
}

#[tokio::test]
async fn test_crashed_reservation_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let url = db_url(&dir);
    let clock = Arc::new(ManualTimeProvider::new(START_MILLIS));

    let job_id = {
        let broker = open(&url, clock.clone()).await;
        let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
        let job_id = gateway.submit("enhance", payload()).await.unwrap();

        // Worker reserves and starts, then the process dies
        let job = broker.reserve(&queues()).await.unwrap().unwrap();
        assert_eq!(job.id, job_id);
        broker.mark_started(&job_id, 1).await.unwrap();
        job_id
    };

    clock.advance(10 * 60 * 1000);
    let broker = open(&url, clock.clone()).await;

    // Reservation is younger than an hour
    let strict = RecoveryService::new(broker.clone(), clock.clone(), Duration::from_secs(3600));
    assert_eq!(strict.recover_orphaned_jobs().await.unwrap(), 0);

    let recovery = RecoveryService::new(broker.clone(), clock.clone(), Duration::from_secs(60));
    assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 1);

    let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
    assert_eq!(gateway.status(&job_id).await.unwrap().status, JobState::Pending);

    let script = ScriptedExecution::succeeding(json!({"kind": "enhance", "resume_enhancement_md": "- x"}));
    let worker = Worker::new(
        queues(),
        broker.clone(),
        Arc::new(script.clone()),
        Arc::new(TaskPolicy::default()),
    );
    assert!(worker.process_next_job().await.unwrap());
    assert_eq!(gateway.result(&job_id).await.unwrap().status, JobState::Success);
    // Re-delivered from its first attempt
    assert_eq!(script.calls()[0].1, 1);
}

#[tokio::test]
async fn test_quick_restart_recovers_every_reservation() {
    let dir = tempfile::tempdir().unwrap();
    let url = db_url(&dir);
    let clock = Arc::new(ManualTimeProvider::new(START_MILLIS));
    let policy = TaskPolicy::default();

    let job_id = {
        let broker = open(&url, clock.clone()).await;
        let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
        let job_id = gateway.submit("match", payload()).await.unwrap();
        broker.reserve(&queues()).await.unwrap().unwrap();
        broker.mark_started(&job_id, 1).await.unwrap();
        job_id
    };

    // Back up ten seconds later, long before any age-based window
    clock.advance(10_000);
    let broker = open(&url, clock.clone()).await;
    let recovery = RecoveryService::new(broker.clone(), clock.clone(), policy.max_job_lifetime());
    assert_eq!(recovery.recover_orphaned_jobs().await.unwrap(), 0);
    assert_eq!(recovery.recover_all_reservations().await.unwrap(), 1);

    let worker = Worker::new(
        queues(),
        broker.clone(),
        Arc::new(ScriptedExecution::succeeding(json!({"kind": "match", "match_score": 50}))),
        Arc::new(policy),
    );
    assert!(worker.process_next_job().await.unwrap());

    let gateway = JobGateway::new(broker, GatewayConfig::default());
    let result = gateway
        .wait_for_result(&job_id, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(result.status, JobState::Success);
}

#[tokio::test]
async fn test_terminal_outcome_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let broker = open(&db_url(&dir), Arc::new(SystemTimeProvider)).await;
    let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
    let job_id = gateway.submit("match", payload()).await.unwrap();

    broker.reserve(&queues()).await.unwrap().unwrap();
    let first = TaskOutcome::Success(json!({"match_score": 1}));
    let second = TaskOutcome::Failure("late duplicate".into());
    assert!(broker.store_outcome(&job_id, first).await.unwrap());
    assert!(!broker.store_outcome(&job_id, second).await.unwrap());

    let result = gateway.result(&job_id).await.unwrap();
    assert_eq!(result.status, JobState::Success);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_retention_purges_expired_results_only() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualTimeProvider::new(START_MILLIS));
    let broker = open(&db_url(&dir), clock.clone()).await;
    let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());

    let finished = gateway.submit("match", payload()).await.unwrap();
    let waiting = gateway.submit("match", payload()).await.unwrap();

    let worker = Worker::new(
        queues(),
        broker.clone(),
        Arc::new(ScriptedExecution::succeeding(json!({"kind": "match", "match_score": 5}))),
        Arc::new(TaskPolicy::default()),
    );
    assert!(worker.process_next_job().await.unwrap());

    let retention = RetentionScheduler::new(
        broker.clone(),
        clock.clone(),
        Duration::from_secs(24 * 3600),
        Duration::from_secs(3600),
    );
    assert_eq!(retention.run_now().await.unwrap(), 0);

    clock.advance(25 * 3600 * 1000);
    assert_eq!(retention.run_now().await.unwrap(), 1);

    assert!(matches!(
        gateway.result(&finished).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert_eq!(gateway.status(&waiting).await.unwrap().status, JobState::Pending);
}
