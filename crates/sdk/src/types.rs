//! SDK Request/Response Types
//!
//! Mirrors the JSON-RPC types from api-rpc crate.

use crate::error::{Result, SdkError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Request to submit a job
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// match | enhance | cover_letter
    pub job_type: String,
    pub resume: String,
    pub jd: String,
}

/// Response from submit operation
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JobIdRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WaitRequest {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DownloadRequest {
    pub job_id: String,
    pub format: String,
}

/// Non-blocking status view
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub info: Option<serde_json::Value>,
}

/// Job snapshot
#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobResult {
    /// SUCCESS, FAILURE or REVOKED
    pub fn is_terminal(&self) -> bool {
        is_terminal_status(&self.status)
    }
}

pub(crate) fn is_terminal_status(status: &str) -> bool {
    matches!(status, "SUCCESS" | "FAILURE" | "REVOKED")
}

/// Downloaded file
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub job_id: String,
    pub job_type: String,
    pub filename: String,
    pub content_type: String,
    /// "utf-8" or "base64"
    pub encoding: String,
    pub content: String,
}

impl Artifact {
    /// Decoded file bytes
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match self.encoding.as_str() {
            "utf-8" => Ok(self.content.clone().into_bytes()),
            "base64" => STANDARD
                .decode(self.content.as_bytes())
                .map_err(|e| SdkError::InvalidArtifact(e.to_string())),
            other => Err(SdkError::InvalidArtifact(format!("unknown encoding '{}'", other))),
        }
    }
}

/// Response from warmup submission
#[derive(Debug, Clone, Deserialize)]
pub struct WarmupResponse {
    pub job_id: String,
}

/// Daemon health
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub warmup_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_decoding() {
        let artifact = Artifact {
            job_id: "j".into(),
            job_type: "match".into(),
            filename: "j_match.pdf".into(),
            content_type: "application/pdf".into(),
            encoding: "base64".into(),
            content: STANDARD.encode(b"%PDF-1.5"),
        };
        assert_eq!(artifact.bytes().unwrap(), b"%PDF-1.5".to_vec());

        let broken = Artifact { encoding: "gzip".into(), ..artifact };
        assert!(matches!(broken.bytes(), Err(SdkError::InvalidArtifact(_))));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(is_terminal_status("REVOKED"));
        assert!(!is_terminal_status("RETRY"));
    }
}
