//! Job lifecycle against the SQLite broker
//!
//! submit -> worker -> wait -> result -> download, with the stub pipeline
//! and scripted Execution Functions.

use std::sync::Arc;
use std::time::Duration;

use jdmatch_core::application::{
    GatewayConfig, JobGateway, RetryPolicy, TaskPolicy, TimeoutPolicy, WaitOutcome, Worker,
};
use jdmatch_core::domain::queue::DEFAULT_QUEUES;
use jdmatch_core::domain::JobState;
use jdmatch_core::error::AppError;
use jdmatch_core::port::execution::mocks::{ScriptedExecution, Step};
use jdmatch_core::port::{ExecutionFunction, SystemTimeProvider, UuidProvider};
use jdmatch_infra_pipeline::StubPipeline;
use jdmatch_infra_sqlite::{create_pool, run_migrations, SqliteBroker};
use jdmatch_render::{compose_download, ArtifactEncoding, ArtifactFormat};
use serde_json::json;

const RESUME: &str = "Backend engineer. Rust, Python, PostgreSQL, Kubernetes.";
const JD: &str = "Python, Rust and Terraform.";

struct Harness {
    broker: Arc<SqliteBroker>,
    gateway: JobGateway,
}

async fn harness() -> Harness {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let broker = Arc::new(
        SqliteBroker::new(pool, Arc::new(UuidProvider), Arc::new(SystemTimeProvider))
            .with_poll_interval(Duration::from_millis(10)),
    );
    let gateway = JobGateway::new(broker.clone(), GatewayConfig::default());
    Harness { broker, gateway }
}

fn fast_retry(max_retries: u32) -> TaskPolicy {
    TaskPolicy {
        retry: RetryPolicy {
            max_retries,
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(1),
            jitter: 0.0,
        },
        timeout: TimeoutPolicy::default(),
    }
}

fn worker(h: &Harness, execution: Arc<dyn ExecutionFunction>, policy: TaskPolicy) -> Worker {
    Worker::new(
        DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
        h.broker.clone(),
        execution,
        Arc::new(policy),
    )
}

fn payload() -> serde_json::Value {
    json!({ "resume": RESUME, "jd": JD })
}

#[tokio::test]
async fn test_match_job_end_to_end() {
    let h = harness().await;
    let job_id = h.gateway.submit("match", payload()).await.unwrap();

    let status = h.gateway.status(&job_id).await.unwrap();
    assert_eq!(status.status, JobState::Pending);

    let w = worker(&h, Arc::new(StubPipeline::new()), TaskPolicy::default());
    assert!(w.process_next_job().await.unwrap());

    let result = h
        .gateway
        .wait_for_result(&job_id, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(result.status, JobState::Success);
    assert!(result.error.is_none());

    let document = result.result.clone().unwrap();
    assert_eq!(document["kind"], "match");
    // python and rust are covered, terraform is not
    assert_eq!(document["match_score"], 67);
    assert!(document["gaps"].as_array().unwrap().contains(&json!("terraform")));

    let md = compose_download(&result, ArtifactFormat::Markdown).unwrap();
    assert_eq!(md.filename, format!("{}_match.md", job_id));
    assert!(md.content.contains("**67%**"));
    assert!(md.content.contains("- terraform"));

    let pdf = compose_download(&result, ArtifactFormat::PaginatedDocument).unwrap();
    assert_eq!(pdf.encoding, ArtifactEncoding::Base64);
    let bytes = pdf.bytes().unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    let loaded = lopdf::Document::load_mem(&bytes).unwrap();
    assert_eq!(loaded.get_pages().len(), 1);

    let json_artifact = compose_download(&result, ArtifactFormat::Json).unwrap();
    let round: serde_json::Value = serde_json::from_str(&json_artifact.content).unwrap();
    assert_eq!(round, document);
}

#[tokio::test]
async fn test_every_kind_renders() {
    let h = harness().await;
    let w = worker(&h, Arc::new(StubPipeline::new()), TaskPolicy::default());

    for (kind, heading) in [
        ("enhance", "# Resume Enhancement Suggestions"),
        ("cover_letter", "Dear Hiring Manager"),
    ] {
        let job_id = h.gateway.submit(kind, payload()).await.unwrap();
        assert!(w.process_next_job().await.unwrap());

        let result = h.gateway.result(&job_id).await.unwrap();
        assert_eq!(result.status, JobState::Success, "{} failed", kind);

        let md = compose_download(&result, ArtifactFormat::Markdown).unwrap();
        assert_eq!(md.filename, format!("{}_{}.md", job_id, kind));
        assert!(md.content.contains(heading), "{}: {}", kind, md.content);
    }
}

#[tokio::test]
async fn test_retry_then_success() {
    let h = harness().await;
    let job_id = h.gateway.submit("enhance", payload()).await.unwrap();

    let script = ScriptedExecution::new([
        Step::Fail("model overloaded".into()),
        Step::Succeed(json!({"kind": "enhance", "resume_enhancement_md": "- Add metrics"})),
    ]);
    let w = worker(&h, Arc::new(script.clone()), fast_retry(1));
    assert!(w.process_next_job().await.unwrap());

    let result = h.gateway.result(&job_id).await.unwrap();
    assert_eq!(result.status, JobState::Success);

    let calls: Vec<u32> = script.calls().into_iter().map(|(_, attempt)| attempt).collect();
    assert_eq!(calls, vec![1, 2]);

    let job = h.broker.find(&job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let h = harness().await;
    let job_id = h.gateway.submit("cover_letter", payload()).await.unwrap();

    let script = ScriptedExecution::failing("LLM returned invalid JSON");
    let w = worker(&h, Arc::new(script.clone()), fast_retry(1));
    assert!(w.process_next_job().await.unwrap());
    assert_eq!(script.call_count(), 2);

    let result = h.gateway.result(&job_id).await.unwrap();
    assert_eq!(result.status, JobState::Failure);
    assert!(result.result.is_none());
    assert!(result.error.unwrap().contains("LLM returned invalid JSON"));

    let result = h.gateway.result(&job_id).await.unwrap();
    let err = compose_download(&result, ArtifactFormat::PaginatedDocument).unwrap_err();
    assert!(matches!(err, AppError::JobFailed { .. }));

    let error_artifact = compose_download(&result, ArtifactFormat::Json).unwrap();
    assert_eq!(error_artifact.filename, format!("{}_error.json", job_id));
    let body: serde_json::Value = serde_json::from_str(&error_artifact.content).unwrap();
    assert_eq!(body["status"], "FAILURE");
}

#[tokio::test]
async fn test_panicking_attempt_does_not_kill_worker() {
    let h = harness().await;
    let first = h.gateway.submit("match", payload()).await.unwrap();
    let second = h.gateway.submit("match", payload()).await.unwrap();

    let script = ScriptedExecution::new([
        Step::Panic("segfault in tokenizer".into()),
        Step::Succeed(json!({"kind": "match", "match_score": 10})),
    ]);
    let w = worker(&h, Arc::new(script), fast_retry(0));
    assert!(w.process_next_job().await.unwrap());
    assert!(w.process_next_job().await.unwrap());

    assert_eq!(h.gateway.result(&first).await.unwrap().status, JobState::Failure);
    assert_eq!(h.gateway.result(&second).await.unwrap().status, JobState::Success);
}

#[tokio::test]
async fn test_wait_times_out_without_worker() {
    let h = harness().await;
    let job_id = h.gateway.submit("match", payload()).await.unwrap();

    let outcome = h
        .gateway
        .wait(&job_id, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    match outcome {
        WaitOutcome::TimedOut { snapshot, .. } => assert_eq!(snapshot.status, JobState::Pending),
        other => panic!("expected timeout, got {:?}", other),
    }

    let result = h.gateway.result(&job_id).await.unwrap();
    let err = compose_download(&result, ArtifactFormat::Markdown).unwrap_err();
    assert!(matches!(err, AppError::NotFinished { .. }));
}

#[tokio::test]
async fn test_wait_sees_completion_from_concurrent_worker() {
    let h = harness().await;
    let job_id = h.gateway.submit("match", payload()).await.unwrap();

    let script = ScriptedExecution::new([Step::Delay(
        Duration::from_millis(50),
        json!({"kind": "match", "match_score": 90}),
    )]);
    let w = worker(&h, Arc::new(script), TaskPolicy::default());
    let handle = tokio::spawn(async move { w.process_next_job().await });

    let result = h
        .gateway
        .wait_for_result(&job_id, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(result.status, JobState::Success);
    assert_eq!(result.result.unwrap()["match_score"], 90);
    assert!(handle.await.unwrap().unwrap());
}

#[tokio::test]
async fn test_enhance_status_moves_through_started() {
    let h = harness().await;
    let job_id = h.gateway.submit("enhance", payload()).await.unwrap();
    assert_eq!(h.gateway.status(&job_id).await.unwrap().status, JobState::Pending);

    let script = ScriptedExecution::new([Step::Delay(
        Duration::from_millis(300),
        json!({"kind": "enhance", "resume_enhancement_md": "- Quantify the Kubernetes migration"}),
    )]);
    let w = worker(&h, Arc::new(script), TaskPolicy::default());
    let handle = tokio::spawn(async move { w.process_next_job().await });

    let mut started = None;
    for _ in 0..100 {
        let report = h.gateway.status(&job_id).await.unwrap();
        if report.status == JobState::Started {
            started = Some(report);
            break;
        }
        assert!(
            matches!(report.status, JobState::Pending | JobState::Received),
            "unexpected state before start: {}",
            report.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let started = started.expect("job never reported STARTED");
    assert_eq!(started.info.unwrap()["attempt"], 1);

    let result = h
        .gateway
        .wait_for_result(&job_id, Some(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(result.status, JobState::Success);
    assert!(handle.await.unwrap().unwrap());

    let md = compose_download(&result, ArtifactFormat::Markdown).unwrap();
    assert_eq!(md.filename, format!("{}_enhance.md", job_id));
    assert!(md.content.starts_with("# Resume Enhancement Suggestions"), "{}", md.content);
    assert!(md.content.contains("- Quantify the Kubernetes migration"));
}

#[tokio::test]
async fn test_invalid_submissions_enqueue_nothing() {
    let h = harness().await;

    let err = h.gateway.submit("summarize", payload()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.gateway.submit("warmup", payload()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let w = worker(&h, Arc::new(StubPipeline::new()), TaskPolicy::default());
    assert!(!w.process_next_job().await.unwrap());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness().await;
    assert!(matches!(
        h.gateway.result("no-such-job").await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        h.gateway.status("no-such-job").await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_warmup_runs_on_its_own_queue() {
    let h = harness().await;
    let job_id = h.gateway.submit_warmup().await.unwrap();

    let job = h.broker.find(&job_id).await.unwrap().unwrap();
    assert_eq!(job.queue, "warmup");
    assert_eq!(job.task_name, "warmup_model");

    let w = worker(&h, Arc::new(StubPipeline::new()), TaskPolicy::default());
    assert!(w.process_next_job().await.unwrap());

    let result = h
        .gateway
        .wait_warmup(&job_id, Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(result.status, JobState::Success);
    assert_eq!(result.result.unwrap()["status"], "warmed");
}
