//! RPC Request/Response Types
//!
//! Method parameters and results. Status and result responses reuse the
//! core `StatusReport` / `JobResult` shapes directly.

use jsonrpsee::types::error::INVALID_PARAMS_CODE;
use jsonrpsee::types::{ErrorObjectOwned, Params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// job.submit.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub job_type: String,
    pub resume: String,
    pub jd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

/// job.status.v1 / job.result.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// job.wait.v1 / warmup.wait.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitRequest {
    pub job_id: String,
    /// Seconds; server default when absent
    #[serde(default)]
    pub timeout: Option<f64>,
}

/// job.download.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub job_id: String,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "md".to_string()
}

/// warmup.submit.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupResponse {
    pub job_id: String,
}

/// health.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub warmup_enabled: bool,
}

/// Parse method params sent either as a named object or as a one-element array
pub fn parse_params<T: DeserializeOwned>(params: Params<'_>) -> Result<T, ErrorObjectOwned> {
    let value: Value = params.parse()?;
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };
    serde_json::from_value(value)
        .map_err(|e| ErrorObjectOwned::owned(INVALID_PARAMS_CODE, e.to_string(), None::<()>))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params_accepts_object_and_array() {
        let named: JobIdRequest = parse_params(Params::new(Some(r#"{"job_id":"a"}"#))).unwrap();
        assert_eq!(named.job_id, "a");

        let positional: JobIdRequest = parse_params(Params::new(Some(r#"[{"job_id":"b"}]"#))).unwrap();
        assert_eq!(positional.job_id, "b");

        let err = parse_params::<JobIdRequest>(Params::new(Some(r#"{"id":"c"}"#))).unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS_CODE);
    }

    #[test]
    fn test_download_format_defaults_to_markdown() {
        let req: DownloadRequest = serde_json::from_str(r#"{"job_id":"a"}"#).unwrap();
        assert_eq!(req.format, "md");
    }
}
