// Result model: terminal outcomes, client snapshots and result documents

use crate::domain::job::{JobId, JobState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Terminal outcome written once into the result store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Value),
    Failure(String),
}

impl TaskOutcome {
    pub fn state(&self) -> JobState {
        match self {
            TaskOutcome::Success(_) => JobState::Success,
            TaskOutcome::Failure(_) => JobState::Failure,
        }
    }
}

/// Non-blocking status view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub job_id: JobId,
    pub status: JobState,
    /// Broker-supplied progress metadata (objects only)
    pub info: Option<Value>,
}

/// Client-facing job snapshot.
///
/// `result` is only set for SUCCESS and `error` only for FAILURE, except for
/// snapshots returned by a blocking wait, which may carry an explanatory
/// `error` next to a non-terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: JobId,
    pub status: JobState,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobResult {
    pub fn success(job_id: impl Into<String>, value: Value) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Success,
            result: Some(value),
            error: None,
        }
    }

    pub fn failure(job_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Failure,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Snapshot without payload (any state other than SUCCESS/FAILURE)
    pub fn snapshot(job_id: impl Into<String>, status: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            result: None,
            error: None,
        }
    }

    /// Build a snapshot from the normalized state and the stored outcome
    pub fn from_parts(job_id: impl Into<String>, status: JobState, outcome: Option<TaskOutcome>) -> Self {
        match (status, outcome) {
            (JobState::Success, Some(TaskOutcome::Success(value))) => Self::success(job_id, value),
            (JobState::Failure, Some(TaskOutcome::Failure(error))) => Self::failure(job_id, error),
            (JobState::Failure, _) => Self::failure(job_id, "job failed without an error message"),
            (status, _) => Self::snapshot(job_id, status),
        }
    }

    /// Attach an explanatory message (wait timeouts, broker errors)
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Document kind, detected from the explicit `kind` tag or legacy keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Match,
    Enhance,
    CoverLetter,
    Unknown,
}

/// Legacy key identifying match documents
pub const MATCH_SCORE_KEY: &str = "match_score";
/// Legacy key identifying enhancement documents
pub const ENHANCEMENT_KEY: &str = "resume_enhancement_md";
/// Legacy key identifying cover letter documents
pub const COVER_LETTER_KEY: &str = "cover_letter_md";
/// Explicit discriminant emitted by current producers
pub const KIND_TAG: &str = "kind";

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Match => "match",
            DocumentKind::Enhance => "enhance",
            DocumentKind::CoverLetter => "cover_letter",
            DocumentKind::Unknown => "unknown",
        }
    }

    /// Detect the kind of a stored document.
    ///
    /// The explicit tag wins; untagged legacy documents are sniffed by key.
    pub fn detect(document: &Value) -> Self {
        match document.get(KIND_TAG).and_then(Value::as_str) {
            Some("match") => return DocumentKind::Match,
            Some("enhance") => return DocumentKind::Enhance,
            Some("cover_letter") => return DocumentKind::CoverLetter,
            _ => {}
        }

        let has = |key: &str| document.get(key).is_some_and(|v| !v.is_null());
        if has(MATCH_SCORE_KEY) {
            DocumentKind::Match
        } else if has(ENHANCEMENT_KEY) {
            DocumentKind::Enhance
        } else if has(COVER_LETTER_KEY) {
            DocumentKind::CoverLetter
        } else {
            DocumentKind::Unknown
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Numeric score, but older producers emitted strings
    #[serde(default)]
    pub match_score: Option<Value>,
    #[serde(default)]
    pub strengths: Option<Vec<String>>,
    #[serde(default)]
    pub gaps: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl MatchReport {
    pub fn strengths(&self) -> &[String] {
        self.strengths.as_deref().unwrap_or_default()
    }

    pub fn gaps(&self) -> &[String] {
        self.gaps.as_deref().unwrap_or_default()
    }

    /// Score as display text ("85", "72.5", "N/A")
    pub fn score_text(&self) -> String {
        match &self.match_score {
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
                Some(f) => format!("{}", f),
                None => n.to_string(),
            },
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhanceReport {
    #[serde(default)]
    pub resume_enhancement_md: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverLetterReport {
    #[serde(default)]
    pub cover_letter_md: Option<String>,
}

/// Result document produced by the Execution Function
#[derive(Debug, Clone, PartialEq)]
pub enum ResultDocument {
    Match(MatchReport),
    Enhance(EnhanceReport),
    CoverLetter(CoverLetterReport),
    /// Unrecognised or malformed shape, rendered generically
    Unknown(Value),
}

impl ResultDocument {
    /// Interpret a stored document; never fails.
    pub fn from_value(document: &Value) -> Self {
        let kind = DocumentKind::detect(document);
        let parsed = match kind {
            DocumentKind::Match => {
                serde_json::from_value::<MatchReport>(document.clone()).map(ResultDocument::Match)
            }
            DocumentKind::Enhance => serde_json::from_value::<EnhanceReport>(document.clone())
                .map(ResultDocument::Enhance),
            DocumentKind::CoverLetter => {
                serde_json::from_value::<CoverLetterReport>(document.clone())
                    .map(ResultDocument::CoverLetter)
            }
            DocumentKind::Unknown => return ResultDocument::Unknown(document.clone()),
        };

        parsed.unwrap_or_else(|e| {
            warn!(kind = %kind, error = %e, "Malformed result document, using generic rendering");
            ResultDocument::Unknown(document.clone())
        })
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            ResultDocument::Match(_) => DocumentKind::Match,
            ResultDocument::Enhance(_) => DocumentKind::Enhance,
            ResultDocument::CoverLetter(_) => DocumentKind::CoverLetter,
            ResultDocument::Unknown(_) => DocumentKind::Unknown,
        }
    }

    /// Serialize with the explicit `kind` discriminant
    pub fn to_value(&self) -> Value {
        let (kind, body) = match self {
            ResultDocument::Match(r) => (DocumentKind::Match, serde_json::to_value(r)),
            ResultDocument::Enhance(r) => (DocumentKind::Enhance, serde_json::to_value(r)),
            ResultDocument::CoverLetter(r) => (DocumentKind::CoverLetter, serde_json::to_value(r)),
            ResultDocument::Unknown(v) => return v.clone(),
        };
        let mut body = body.unwrap_or(Value::Null);

        if let Value::Object(map) = &mut body {
            map.insert(KIND_TAG.to_string(), Value::String(kind.as_str().to_string()));
        }
        body
    }
}
