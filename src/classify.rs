//! Decoding of the LLM's classification answer.
//!
//! The prompt asks for a JSON object:
//!
//! ```json
//! {"is_related": true, "label": "Negative", "summary": "한 줄 요약"}
//! ```
//!
//! Models wrap it in markdown fences, repeat it, or cut it off. Decoding is
//! strict: [`decode_classification`] either yields every field or says why it
//! could not. Callers pick the fallback explicitly with
//! [`Classification::conservative`].

use crate::api::AskAsync;
use crate::models::Label;
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Summary used when the model's answer is unusable.
pub const SUMMARY_FAILED: &str = "요약 실패";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub is_related: bool,
    pub label: Label,
    pub summary: String,
}

impl Classification {
    /// The answer assumed when nothing usable came back.
    pub fn conservative() -> Self {
        Self {
            is_related: false,
            label: Label::Neutral,
            summary: SUMMARY_FAILED.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no JSON object in response")]
    NoJson,
    #[error("response JSON is truncated")]
    Truncated,
    #[error("response does not match the schema: {0}")]
    Schema(String),
    #[error("unknown label {0:?}")]
    UnknownLabel(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Flag(bool),
    Text(String),
}

#[derive(Deserialize)]
struct RawClassification {
    is_related: bool,
    label: RawLabel,
    summary: String,
}

/// Cut the JSON object out of a model answer.
fn extract_object(raw: &str) -> Option<&str> {
    let body = CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);
    let start = body.find('{')?;
    let rest = &body[start..];
    // first object only; models sometimes repeat the answer
    Some(first_object_end(rest).map_or(rest, |end| &rest[..end]))
}

/// Byte offset just past the brace closing the object that starts at 0.
fn first_object_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strictly decode a classification answer.
pub fn decode_classification(raw: &str) -> Result<Classification, ParseFailure> {
    let json = extract_object(raw).ok_or(ParseFailure::NoJson)?;
    let parsed: RawClassification = serde_json::from_str(json).map_err(|e| {
        if looks_truncated(&e) {
            ParseFailure::Truncated
        } else {
            ParseFailure::Schema(e.to_string())
        }
    })?;

    let label = match parsed.label {
        RawLabel::Flag(flag) => Label::from(flag),
        RawLabel::Text(text) => Label::parse(&text).ok_or(ParseFailure::UnknownLabel(text))?,
    };

    Ok(Classification {
        is_related: parsed.is_related,
        label,
        summary: parsed.summary.trim().to_string(),
    })
}

/// Text sent to the model for one article.
///
/// The search keyword is appended so relatedness is judged against the
/// keyword that surfaced the article.
///
/// # Arguments
///
/// * `body` - Article body text
/// * `keyword` - Search keyword; omitted from the prompt when blank
///
/// # Examples
///
/// ```ignore
/// assert_eq!(prompt_text("본문", "삼성생명"), "본문\n\n관련 키워드: 삼성생명");
/// assert_eq!(prompt_text("본문", ""), "본문");
/// ```
pub fn prompt_text(body: &str, keyword: &str) -> String {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        body.to_string()
    } else {
        format!("{body}\n\n관련 키워드: {keyword}")
    }
}

/// Ask the LLM about one article; any failure becomes
/// [`Classification::conservative`].
///
/// A truncated answer is asked for once more.
#[instrument(level = "info", skip_all, fields(chars = body.chars().count(), %keyword))]
pub async fn classify_article<A>(asker: &A, body: &str, keyword: &str) -> Classification
where
    A: AskAsync<Response = String>,
{
    let content = prompt_text(body, keyword);
    let mut raw = match asker.ask(&content).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Classification request failed; using conservative default");
            return Classification::conservative();
        }
    };

    let mut decoded = decode_classification(&raw);
    if matches!(decoded, Err(ParseFailure::Truncated)) {
        warn!("Truncated answer; re-asking once");
        match asker.ask(&content).await {
            Ok(second) => {
                raw = second;
                decoded = decode_classification(&raw);
            }
            Err(e) => warn!(error = %e, "Re-ask failed"),
        }
    }

    match decoded {
        Ok(c) => {
            debug!(label = %c.label, is_related = c.is_related, "Classified article");
            c
        }
        Err(reason) => {
            warn!(
                %reason,
                response_preview = %truncate_for_log(&raw, 300),
                "Unusable classification; using conservative default"
            );
            Classification::conservative()
        }
    }
}
