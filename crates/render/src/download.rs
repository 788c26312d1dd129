// Download composition: job snapshot + format -> named artifact

use crate::{render_at, ArtifactFormat, RenderError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jdmatch_core::domain::{JobResult, JobState};
use jdmatch_core::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// How `content` is carried over text transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

/// Downloadable file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub job_id: String,
    /// Detected document kind, or "error"
    pub job_type: String,
    pub filename: String,
    pub content_type: String,
    pub encoding: ArtifactEncoding,
    pub content: String,
}

impl Artifact {
    fn from_bytes(
        job_id: &str,
        job_type: &str,
        format: ArtifactFormat,
        bytes: Vec<u8>,
    ) -> std::result::Result<Self, RenderError> {
        let (encoding, content) = if format.is_binary() {
            (ArtifactEncoding::Base64, STANDARD.encode(&bytes))
        } else {
            let text = String::from_utf8(bytes).map_err(|e| RenderError::InvalidContent(e.to_string()))?;
            (ArtifactEncoding::Utf8, text)
        };

        Ok(Self {
            job_id: job_id.to_string(),
            job_type: job_type.to_string(),
            filename: format!("{}_{}.{}", job_id, job_type, format.extension()),
            content_type: format.content_type().to_string(),
            encoding,
            content,
        })
    }

    /// Decoded file bytes
    pub fn bytes(&self) -> std::result::Result<Vec<u8>, RenderError> {
        match self.encoding {
            ArtifactEncoding::Utf8 => Ok(self.content.clone().into_bytes()),
            ArtifactEncoding::Base64 => STANDARD
                .decode(self.content.as_bytes())
                .map_err(|e| RenderError::InvalidContent(e.to_string())),
        }
    }
}

/// Compose the download for a job snapshot
pub fn compose_download(result: &JobResult, format: ArtifactFormat) -> Result<Artifact> {
    compose_download_at(result, format, Utc::now())
}

pub fn compose_download_at(
    result: &JobResult,
    format: ArtifactFormat,
    generated_at: DateTime<Utc>,
) -> Result<Artifact> {
    match result.status {
        JobState::Success => {
            let document = result.result.clone().unwrap_or(Value::Null);
            let rendered = render_at(&document, format, generated_at)?;
            let artifact = Artifact::from_bytes(&result.job_id, rendered.kind.as_str(), format, rendered.bytes)?;
            info!(
                job_id = %result.job_id,
                job_type = %rendered.kind,
                format = %format,
                filename = %artifact.filename,
                "Composed download"
            );
            Ok(artifact)
        }
        JobState::Failure | JobState::Revoked => {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| format!("job finished with status {}", result.status));

            if format != ArtifactFormat::Json {
                return Err(AppError::JobFailed {
                    job_id: result.job_id.clone(),
                    error,
                });
            }

            let body = json!({
                "job_id": result.job_id,
                "status": result.status.as_str(),
                "error": error,
            });
            let bytes = serde_json::to_vec_pretty(&body)?;
            Ok(Artifact::from_bytes(&result.job_id, "error", format, bytes)?)
        }
        status => Err(AppError::NotFinished {
            job_id: result.job_id.clone(),
            status: status.as_str().to_string(),
        }),
    }
}
