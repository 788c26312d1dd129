// Subprocess pipeline
// Runs the external LLM pipeline as a child process speaking JSON over stdio
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use jdmatch_core::domain::{JobKind, JobPayload};
use jdmatch_core::port::{ExecutionContext, ExecutionError, ExecutionFunction};

/// Variables passed through to the child when no allowlist is configured
pub const DEFAULT_ENV_ALLOWLIST: [&str; 4] = ["PATH", "HOME", "USER", "LANG"];

/// Child process invocation
#[derive(Debug, Clone)]
pub struct PipelineCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Parent environment variables visible to the child
    pub env_allowlist: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl PipelineCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
        }
    }
}

/// Request written to the child's stdin
#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
    job_id: &'a str,
    job_type: JobKind,
    attempt: u32,
    payload: &'a Value,
}

/// Subprocess-backed Execution Function
///
/// Protocol: one JSON request on stdin, the result document as JSON on
/// stdout, exit status 0 on success. On the soft limit the child receives
/// SIGTERM and may still print a partial document; if the runner aborts the
/// attempt at the hard limit the child is killed.
pub struct SubprocessPipeline {
    command: PipelineCommand,
}

impl SubprocessPipeline {
    /// Create a new subprocess pipeline
    ///
    /// # Example
    /// ```ignore
    /// let pipeline = SubprocessPipeline::new(PipelineCommand::new(
    ///     "python3",
    ///     vec!["-m".into(), "agents.run".into()],
    /// ));
    /// ```
    pub fn new(command: PipelineCommand) -> Self {
        Self { command }
    }

    /// Filter environment variables to allowlist only
    fn filter_env(&self, env: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        env.filter(|(k, _)| self.command.env_allowlist.contains(k))
            .collect()
    }

    fn spawn(&self, ctx: &ExecutionContext) -> Result<tokio::process::Child, ExecutionError> {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .env("JDMATCH_JOB_ID", &ctx.job_id)
            .env("JDMATCH_ATTEMPT", ctx.attempt.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.command.working_dir {
            cmd.current_dir(dir);
        }
        cmd.spawn().map_err(|e| ExecutionError::Spawn(e.to_string()))
    }
}

#[async_trait]
impl ExecutionFunction for SubprocessPipeline {
    async fn execute(
        &self,
        kind: JobKind,
        payload: JobPayload,
        ctx: ExecutionContext,
    ) -> Result<Value, ExecutionError> {
        let request = serde_json::to_vec(&PipelineRequest {
            job_id: &ctx.job_id,
            job_type: kind,
            attempt: ctx.attempt,
            payload: payload.as_value(),
        })
        .map_err(|e| ExecutionError::Io(e.to_string()))?;

        info!(
            job_id = %ctx.job_id,
            job_type = %kind,
            attempt = ctx.attempt,
            program = %self.command.program,
            "Starting pipeline subprocess"
        );

        let mut child = self.spawn(&ctx)?;
        let pid = child.id();

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request)
                .await
                .map_err(|e| ExecutionError::Io(e.to_string()))?;
            // Dropping stdin closes the pipe (EOF for the child)
        }

        let output = child.wait_with_output();
        tokio::pin!(output);

        let output = tokio::select! {
            out = &mut output => out,
            _ = ctx.soft_limit_elapsed() => {
                warn!(job_id = %ctx.job_id, pid = ?pid, "Soft limit reached, sending SIGTERM to pipeline");
                if let Some(pid) = pid {
                    terminate(pid);
                }
                output.await
            }
        }
        .map_err(|e| ExecutionError::Io(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .unwrap_or_else(|| format!("pipeline exited with {}", output.status));
            return Err(ExecutionError::Failed(reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let document = parse_document(&stdout)?;

        info!(job_id = %ctx.job_id, job_type = %kind, "Pipeline subprocess completed");
        Ok(document)
    }
}

/// Whole stdout as JSON, else the last non-empty line (pipelines may log to stdout)
fn parse_document(stdout: &str) -> Result<Value, ExecutionError> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        return Ok(value);
    }
    let last = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ExecutionError::InvalidOutput("pipeline produced no output".to_string()))?;
    serde_json::from_str(last.trim()).map_err(|e| ExecutionError::InvalidOutput(e.to_string()))
}

#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid = pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) {
    // No graceful signal; the hard limit still kills the child
    warn!(pid = pid, "Graceful termination unsupported on this platform");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::watch;

    fn sh(script: &str) -> SubprocessPipeline {
        SubprocessPipeline::new(PipelineCommand::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
        ))
    }

    fn payload() -> JobPayload {
        JobPayload::new(json!({"resume": "Rust", "jd": "Rust role"}))
    }

    #[tokio::test]
    async fn test_stdout_document_is_returned() {
        let pipeline = sh(r#"cat > /dev/null; echo 'loading model'; echo '{"kind":"match","match_score":90}'"#);
        let ctx = ExecutionContext::unlimited("job-1", 1);

        let value = pipeline.execute(JobKind::Match, payload(), ctx).await.unwrap();
        assert_eq!(value, json!({"kind": "match", "match_score": 90}));
    }

    #[tokio::test]
    async fn test_request_is_written_to_stdin() {
        let pipeline = sh("cat");
        let ctx = ExecutionContext::unlimited("job-7", 2);

        let echoed = pipeline.execute(JobKind::Enhance, payload(), ctx).await.unwrap();
        assert_eq!(echoed["job_id"], "job-7");
        assert_eq!(echoed["job_type"], "enhance");
        assert_eq!(echoed["attempt"], 2);
        assert_eq!(echoed["payload"]["resume"], "Rust");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let pipeline = sh("cat > /dev/null; echo 'model not loaded' >&2; exit 3");
        let ctx = ExecutionContext::unlimited("job-1", 1);

        let err = pipeline.execute(JobKind::Match, payload(), ctx).await.unwrap_err();
        assert_eq!(err, ExecutionError::Failed("model not loaded".to_string()));
    }

    #[tokio::test]
    async fn test_garbage_output_is_invalid() {
        let pipeline = sh("cat > /dev/null; echo 'not json'");
        let ctx = ExecutionContext::unlimited("job-1", 1);

        let err = pipeline.execute(JobKind::Match, payload(), ctx).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let pipeline = SubprocessPipeline::new(PipelineCommand::new("/nonexistent/pipeline", vec![]));
        let ctx = ExecutionContext::unlimited("job-1", 1);

        let err = pipeline.execute(JobKind::Match, payload(), ctx).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_soft_limit_sends_sigterm() {
        let pipeline = sh(
            r#"cat > /dev/null; trap 'echo "{\"partial\":true}"; exit 0' TERM; while true; do sleep 0.1; done"#,
        );
        let (tx, rx) = watch::channel(false);
        let ctx = ExecutionContext::new("job-1", 1, rx);

        let run = tokio::spawn(async move { pipeline.execute(JobKind::Match, payload(), ctx).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        let value = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(value, json!({"partial": true}));
    }

    #[test]
    fn test_env_filtering() {
        let mut command = PipelineCommand::new("true", vec![]);
        command.env_allowlist = vec!["ALLOWED_VAR".to_string()];
        let pipeline = SubprocessPipeline::new(command);

        let env = vec![
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ];
        let filtered = pipeline.filter_env(env.into_iter());

        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("ALLOWED_VAR"));
    }
}
