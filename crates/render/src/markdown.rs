// Markdown templates per document kind

use crate::title_for;
use jdmatch_core::domain::{MatchReport, ResultDocument};
use serde_json::Value;

pub const NONE_MARKER: &str = "_None_";
pub const NO_SUMMARY: &str = "_No summary provided._";
pub const NO_SUGGESTIONS: &str = "_No suggestions generated._";
pub const NO_BULLETS: &str = "_No bullet suggestions found._";
pub const NO_COVER_LETTER: &str = "_No cover letter generated._";

pub fn to_markdown(document: &ResultDocument) -> String {
    let title = title_for(document.kind());
    let body = match document {
        ResultDocument::Match(report) => match_body(report),
        ResultDocument::Enhance(report) => {
            non_empty(report.resume_enhancement_md.as_deref()).unwrap_or(NO_SUGGESTIONS).to_string()
        }
        ResultDocument::CoverLetter(report) => {
            non_empty(report.cover_letter_md.as_deref()).unwrap_or(NO_COVER_LETTER).to_string()
        }
        ResultDocument::Unknown(value) => generic_body(value),
    };
    format!("# {}\n\n{}\n", title, body)
}

/// Score line text: "85%" or "N/A"
pub fn score_label(report: &MatchReport) -> String {
    let score = report.score_text();
    if score == "N/A" {
        score
    } else {
        format!("{}%", score)
    }
}

fn match_body(report: &MatchReport) -> String {
    let mut out = String::new();
    out.push_str("## Overall Score\n\n");
    out.push_str(&format!("**{}**\n\n", score_label(report)));

    out.push_str("## Strengths\n\n");
    push_list(&mut out, report.strengths());

    out.push_str("## Gaps\n\n");
    push_list(&mut out, report.gaps());

    out.push_str("## Summary\n\n");
    out.push_str(non_empty(report.summary.as_deref()).unwrap_or(NO_SUMMARY));
    out
}

fn push_list(out: &mut String, items: &[String]) {
    let items: Vec<&str> = items.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
    if items.is_empty() {
        out.push_str(NONE_MARKER);
        out.push_str("\n\n");
        return;
    }
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
    out.push('\n');
}

fn generic_body(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{}\n```", pretty)
}

pub(crate) fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Give enhancement bodies without `## ` sections a Notes/Improvements shape.
///
/// Bodies that already carry sections are returned trimmed and untouched.
pub fn normalize_enhancement(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return NO_SUGGESTIONS.to_string();
    }
    if body.lines().any(|line| line.trim_start().starts_with("## ")) {
        return body.to_string();
    }

    let mut bullets = Vec::new();
    let mut intro = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("- ") {
            bullets.push(trimmed);
        } else if !trimmed.is_empty() {
            intro.push(trimmed);
        }
    }

    let mut out = String::new();
    if !intro.is_empty() {
        out.push_str("## Notes\n");
        out.push_str(&intro.join("\n"));
        out.push_str("\n\n");
    }
    out.push_str("## Improvements\n");
    if bullets.is_empty() {
        out.push_str(NO_BULLETS);
    } else {
        out.push_str(&bullets.join("\n"));
    }
    out
}
