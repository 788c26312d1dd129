//! JD Match Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    is_terminal_status, Artifact, DownloadRequest, HealthResponse, JobIdRequest, JobResult,
    JobStatus, SubmitRequest, SubmitResponse, WaitRequest, WarmupResponse,
};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Total polling budget of `wait_with_progress`
pub const DEFAULT_TOTAL_WAIT: Duration = Duration::from_secs(120);
/// Delay between polls of `wait_with_progress`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Slack added to the HTTP timeout of blocking waits
const WAIT_REQUEST_SLACK: Duration = Duration::from_secs(10);

/// JD Match daemon client
///
/// # Example
///
/// ```no_run
/// use jdmatch_sdk::JdMatchClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = JdMatchClient::connect("http://127.0.0.1:9633").await?;
/// let job = client.submit("match", "resume text", "job description").await?;
/// let result = client.wait(&job.job_id, None).await?;
/// println!("{}: {}", result.job_id, result.status);
/// # Ok(())
/// # }
/// ```
pub struct JdMatchClient {
    client: HttpClient,
    url: String,
    request_timeout: Duration,
}

impl JdMatchClient {
    /// Connect to the daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9633`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    /// Connect with a custom per-request timeout
    pub fn with_timeout(url: impl AsRef<str>, request_timeout: Duration) -> Result<Self> {
        let url = url.as_ref();
        let client = build_client(url, request_timeout)?;
        Ok(Self {
            client,
            url: url.to_string(),
            request_timeout,
        })
    }

    /// Submit a job
    ///
    /// # Arguments
    ///
    /// * `job_type` - match | enhance | cover_letter
    pub async fn submit(
        &self,
        job_type: impl Into<String>,
        resume: impl Into<String>,
        jd: impl Into<String>,
    ) -> Result<SubmitResponse> {
        let request = SubmitRequest {
            job_type: job_type.into(),
            resume: resume.into(),
            jd: jd.into(),
        };
        let response: SubmitResponse = self
            .client
            .request("job.submit.v1", rpc_params![request])
            .await?;

        Ok(response)
    }

    /// Non-blocking status
    pub async fn status(&self, job_id: impl Into<String>) -> Result<JobStatus> {
        let request = JobIdRequest { job_id: job_id.into() };
        let response: JobStatus = self.client.request("job.status.v1", rpc_params![request]).await?;

        Ok(response)
    }

    /// Non-blocking snapshot
    pub async fn result(&self, job_id: impl Into<String>) -> Result<JobResult> {
        let request = JobIdRequest { job_id: job_id.into() };
        let response: JobResult = self.client.request("job.result.v1", rpc_params![request]).await?;

        Ok(response)
    }

    /// Block server-side until the job is terminal or `timeout` elapses
    ///
    /// `None` uses the daemon's default budget.
    pub async fn wait(&self, job_id: impl Into<String>, timeout: Option<Duration>) -> Result<JobResult> {
        let request = WaitRequest {
            job_id: job_id.into(),
            timeout: timeout.map(|t| t.as_secs_f64()),
        };
        self.blocking_call("job.wait.v1", request, timeout).await
    }

    /// Download a rendered artifact (`md`, `json` or `pdf`)
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use jdmatch_sdk::JdMatchClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = JdMatchClient::connect("http://127.0.0.1:9633").await?;
    /// let artifact = client.download("job-123", "pdf").await?;
    /// std::fs::write(&artifact.filename, artifact.bytes()?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn download(&self, job_id: impl Into<String>, format: impl Into<String>) -> Result<Artifact> {
        let request = DownloadRequest {
            job_id: job_id.into(),
            format: format.into(),
        };
        let response: Artifact = self
            .client
            .request("job.download.v1", rpc_params![request])
            .await?;

        Ok(response)
    }

    /// Trigger a model preload
    pub async fn submit_warmup(&self) -> Result<WarmupResponse> {
        let response: WarmupResponse = self.client.request("warmup.submit.v1", rpc_params![]).await?;
        Ok(response)
    }

    /// Wait for a model preload
    pub async fn wait_warmup(&self, job_id: impl Into<String>, timeout: Option<Duration>) -> Result<JobResult> {
        let request = WaitRequest {
            job_id: job_id.into(),
            timeout: timeout.map(|t| t.as_secs_f64()),
        };
        self.blocking_call("warmup.wait.v1", request, timeout).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response: HealthResponse = self.client.request("health.v1", rpc_params![]).await?;
        Ok(response)
    }

    /// Poll `result` until terminal, calling `on_tick(elapsed, status)` after
    /// each non-terminal poll. After `total_wait` one final snapshot is returned.
    pub async fn wait_with_progress<F>(
        &self,
        job_id: &str,
        total_wait: Duration,
        poll_interval: Duration,
        on_tick: F,
    ) -> Result<JobResult>
    where
        F: FnMut(Duration, &str),
    {
        poll_until_terminal(|| self.result(job_id), total_wait, poll_interval, on_tick).await
    }

    // Long waits outlive the default request timeout
    async fn blocking_call(
        &self,
        method: &str,
        request: WaitRequest,
        timeout: Option<Duration>,
    ) -> Result<JobResult> {
        let needed = timeout.unwrap_or(Duration::from_secs(30)) + WAIT_REQUEST_SLACK;
        if needed <= self.request_timeout {
            let response: JobResult = self.client.request(method, rpc_params![request]).await?;
            return Ok(response);
        }

        let client = build_client(&self.url, needed)?;
        let response: JobResult = client.request(method, rpc_params![request]).await?;
        Ok(response)
    }
}

fn build_client(url: &str, request_timeout: Duration) -> Result<HttpClient> {
    HttpClientBuilder::default()
        .request_timeout(request_timeout)
        .build(url)
        .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))
}

pub(crate) async fn poll_until_terminal<P, Fut, F>(
    mut fetch: P,
    total_wait: Duration,
    poll_interval: Duration,
    mut on_tick: F,
) -> Result<JobResult>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<JobResult>>,
    F: FnMut(Duration, &str),
{
    let started = Instant::now();
    loop {
        let snapshot = fetch().await?;
        if is_terminal_status(&snapshot.status) {
            return Ok(snapshot);
        }

        let elapsed = started.elapsed();
        on_tick(elapsed, &snapshot.status);
        if elapsed >= total_wait {
            break;
        }
        tokio::time::sleep(poll_interval.min(total_wait - elapsed)).await;
    }

    fetch().await
}
