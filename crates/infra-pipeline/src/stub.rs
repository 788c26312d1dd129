// Stub pipeline
// Deterministic documents computed from the payload text, for local runs without a model

use async_trait::async_trait;
use jdmatch_core::domain::job::{JD_FIELD, RESUME_FIELD};
use jdmatch_core::domain::{
    CoverLetterReport, EnhanceReport, JobKind, JobPayload, MatchReport, ResultDocument,
};
use jdmatch_core::port::{ExecutionContext, ExecutionError, ExecutionFunction};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

/// Words ignored when comparing resume and job description
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "of", "on", "or",
    "our", "the", "to", "we", "with", "you", "your",
];

/// Keyword-overlap Execution Function
pub struct StubPipeline {
    latency: Duration,
}

impl StubPipeline {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }

    /// Simulated model latency per attempt
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for StubPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn match_report(resume: &str, jd: &str) -> MatchReport {
    let have = keywords(resume);
    let want = keywords(jd);

    let strengths: Vec<String> = want.intersection(&have).cloned().collect();
    let gaps: Vec<String> = want.difference(&have).cloned().collect();
    let score = if want.is_empty() {
        0
    } else {
        (strengths.len() * 100 + want.len() / 2) / want.len()
    };

    let summary = match score {
        75.. => "Strong fit: the resume covers most of the role's keywords.",
        40..=74 => "Partial fit: several requirements are covered, some are missing.",
        _ => "Weak fit: few of the role's keywords appear in the resume.",
    };

    MatchReport {
        match_score: Some(json!(score)),
        strengths: Some(strengths),
        gaps: Some(gaps),
        summary: Some(summary.to_string()),
    }
}

fn enhance_report(resume: &str, jd: &str) -> EnhanceReport {
    let missing: Vec<String> = keywords(jd).difference(&keywords(resume)).cloned().collect();

    let mut md = String::from("## Notes\nSuggestions are based on keywords in the job description.\n\n## Improvements\n");
    if missing.is_empty() {
        md.push_str("- Quantify the impact of your most relevant projects\n");
    } else {
        for word in missing.iter().take(8) {
            md.push_str(&format!("- Show concrete experience with **{}**\n", word));
        }
    }

    EnhanceReport {
        resume_enhancement_md: Some(md),
    }
}

fn cover_letter_report(resume: &str, jd: &str) -> CoverLetterReport {
    let overlap: Vec<String> = keywords(jd).intersection(&keywords(resume)).cloned().collect();
    let highlights = if overlap.is_empty() {
        "my background".to_string()
    } else {
        overlap.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
    };

    let letter = format!(
        "Dear Hiring Manager,\n\nI am excited to apply for this role. My experience with {} matches what your team is looking for.\n\nI would welcome the chance to discuss how I can contribute.\n\nSincerely,\nApplicant",
        highlights
    );
    CoverLetterReport {
        cover_letter_md: Some(letter),
    }
}

#[async_trait]
impl ExecutionFunction for StubPipeline {
    async fn execute(
        &self,
        kind: JobKind,
        payload: JobPayload,
        ctx: ExecutionContext,
    ) -> Result<Value, ExecutionError> {
        if !self.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.latency) => {},
                _ = ctx.soft_limit_elapsed() => {
                    debug!(job_id = %ctx.job_id, "Soft limit during stub latency, wrapping up");
                }
            }
        }

        let resume = payload.text(RESUME_FIELD).unwrap_or_default();
        let jd = payload.text(JD_FIELD).unwrap_or_default();

        let document = match kind {
            JobKind::Match => ResultDocument::Match(match_report(resume, jd)),
            JobKind::Enhance => ResultDocument::Enhance(enhance_report(resume, jd)),
            JobKind::CoverLetter => ResultDocument::CoverLetter(cover_letter_report(resume, jd)),
            JobKind::Warmup => {
                info!(job_id = %ctx.job_id, "Stub model warmed up");
                return Ok(json!({"status": "warmed", "model": "stub"}));
            }
        };

        Ok(document.to_value())
    }
}
