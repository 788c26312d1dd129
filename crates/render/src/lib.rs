// JD Match Artifact Renderer
// Pure transformation from a stored result document into a downloadable artifact

pub mod download;
pub mod layout;
pub mod markdown;
pub mod pdf;
pub mod rich_text;

use chrono::{DateTime, Utc};
use jdmatch_core::domain::{DocumentKind, ResultDocument};
use jdmatch_core::AppError;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

pub use download::{compose_download, compose_download_at, Artifact, ArtifactEncoding};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unsupported format '{0}' (expected one of: md, json, pdf)")]
    UnsupportedFormat(String),

    #[error("PDF writer error: {0}")]
    Pdf(String),

    #[error("Invalid artifact content: {0}")]
    InvalidContent(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::UnsupportedFormat(_) => AppError::Validation(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Output format of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFormat {
    Markdown,
    Json,
    PaginatedDocument,
}

impl ArtifactFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Markdown => "md",
            ArtifactFormat::Json => "json",
            ArtifactFormat::PaginatedDocument => "pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Markdown => "text/markdown; charset=utf-8",
            ArtifactFormat::Json => "application/json",
            ArtifactFormat::PaginatedDocument => "application/pdf",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ArtifactFormat::PaginatedDocument)
    }
}

impl FromStr for ArtifactFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(ArtifactFormat::Markdown),
            "json" => Ok(ArtifactFormat::Json),
            "pdf" | "paginated-document" | "paginated_document" => {
                Ok(ArtifactFormat::PaginatedDocument)
            }
            other => Err(RenderError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered artifact body plus the detected document kind
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub kind: DocumentKind,
    pub format: ArtifactFormat,
    pub bytes: Vec<u8>,
}

impl Rendered {
    /// Body as text; `None` for binary formats
    pub fn as_text(&self) -> Option<&str> {
        if self.format.is_binary() {
            return None;
        }
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// Document title shared by every paginated rendering
pub fn title_for(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Match => "Resume / JD Match Report",
        DocumentKind::Enhance => "Resume Enhancement Suggestions",
        DocumentKind::CoverLetter => "Cover Letter",
        DocumentKind::Unknown => "Job Result",
    }
}

/// Render a stored result document
pub fn render(document: &Value, format: ArtifactFormat) -> Result<Rendered, RenderError> {
    render_at(document, format, Utc::now())
}

/// Render with an explicit generation timestamp (paginated header)
pub fn render_at(
    document: &Value,
    format: ArtifactFormat,
    generated_at: DateTime<Utc>,
) -> Result<Rendered, RenderError> {
    let typed = ResultDocument::from_value(document);
    let kind = typed.kind();

    let bytes = match format {
        // Stored document verbatim, not the typed view, so nothing is lost
        ArtifactFormat::Json => serde_json::to_vec_pretty(document)?,
        ArtifactFormat::Markdown => markdown::to_markdown(&typed).into_bytes(),
        ArtifactFormat::PaginatedDocument => pdf::render_pdf(&typed, generated_at)?,
    };

    Ok(Rendered { kind, format, bytes })
}
