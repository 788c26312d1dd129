//! RPC Method Handlers
//!
//! Thin adapters from wire types onto the job gateway.

use crate::error::to_rpc_error;
use crate::types::{
    DownloadRequest, HealthResponse, JobIdRequest, SubmitRequest, SubmitResponse, WaitRequest,
    WarmupResponse,
};
use jdmatch_core::application::JobGateway;
use jdmatch_core::domain::{JobResult, JobState, StatusReport, JD_FIELD, RESUME_FIELD};
use jdmatch_core::error::AppError;
use jdmatch_render::{compose_download, Artifact, ArtifactFormat};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    gateway: Arc<JobGateway>,
}

impl RpcHandler {
    pub fn new(gateway: Arc<JobGateway>) -> Self {
        Self { gateway }
    }

    /// job.submit.v1
    pub async fn submit(&self, params: SubmitRequest) -> Result<SubmitResponse, ErrorObjectOwned> {
        let payload = json!({ RESUME_FIELD: params.resume, JD_FIELD: params.jd });
        let job_id = self
            .gateway
            .submit(&params.job_type, payload)
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse {
            job_id,
            status: JobState::Pending.as_str().to_string(),
        })
    }

    /// job.status.v1
    pub async fn status(&self, params: JobIdRequest) -> Result<StatusReport, ErrorObjectOwned> {
        self.gateway.status(&params.job_id).await.map_err(to_rpc_error)
    }

    /// job.result.v1
    pub async fn result(&self, params: JobIdRequest) -> Result<JobResult, ErrorObjectOwned> {
        self.gateway.result(&params.job_id).await.map_err(to_rpc_error)
    }

    /// job.wait.v1
    pub async fn wait(&self, params: WaitRequest) -> Result<JobResult, ErrorObjectOwned> {
        let timeout = parse_timeout(params.timeout).map_err(to_rpc_error)?;
        debug!(job_id = %params.job_id, timeout = ?timeout, "Blocking wait");
        self.gateway
            .wait_for_result(&params.job_id, timeout)
            .await
            .map_err(to_rpc_error)
    }

    /// job.download.v1
    pub async fn download(&self, params: DownloadRequest) -> Result<Artifact, ErrorObjectOwned> {
        let format: ArtifactFormat = params
            .format
            .parse()
            .map_err(|e: jdmatch_render::RenderError| to_rpc_error(e.into()))?;
        let result = self.gateway.result(&params.job_id).await.map_err(to_rpc_error)?;
        compose_download(&result, format).map_err(to_rpc_error)
    }

    /// warmup.submit.v1
    pub async fn submit_warmup(&self) -> Result<WarmupResponse, ErrorObjectOwned> {
        let job_id = self.gateway.submit_warmup().await.map_err(to_rpc_error)?;
        Ok(WarmupResponse { job_id })
    }

    /// warmup.wait.v1
    pub async fn wait_warmup(&self, params: WaitRequest) -> Result<JobResult, ErrorObjectOwned> {
        let timeout = parse_timeout(params.timeout).map_err(to_rpc_error)?;
        self.gateway
            .wait_warmup(&params.job_id, timeout)
            .await
            .map_err(to_rpc_error)
    }

    /// health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: jdmatch_core::VERSION.to_string(),
            warmup_enabled: self.gateway.config().warmup_enabled,
        })
    }
}

/// Seconds on the wire; must be finite and non-negative
///
/// Values too large for a `Duration` saturate; the gateway clamps them anyway.
fn parse_timeout(timeout: Option<f64>) -> Result<Option<Duration>, AppError> {
    match timeout {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
        )),
        Some(secs) => Err(AppError::Validation(format!(
            "timeout must be a non-negative number of seconds, got {}",
            secs
        ))),
    }
}
