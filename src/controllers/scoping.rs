//! Best-effort extraction of the scoping insight
//!
//! The server produces a short free-form text after looking at the beginning of
//! the recording. It usually follows a fixed layout:
//!
//! ```text
//! ---
//! 【業務テーマ】
//! Monthly invoice processing
//! 【対象者】
//! New members of the accounting team
//! 【解析方針案】
//! - Focus on the approval flow
//! - Note the error handling steps
//! ```
//!
//! Nothing about the layout is guaranteed, so every field falls back to
//! [`Extracted::Pending`] instead of failing.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const TASK_SUMMARY_MARKER: &str = "業務テーマ";
const AUDIENCE_MARKER: &str = "対象者";
const POLICY_MARKER: &str = "解析方針案";

/// A field that may not have been found in the scoping text yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Extracted<T> {
    Pending,
    Resolved(T),
}

impl<T> Extracted<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Extracted::Resolved(_))
    }

    pub fn as_ref(&self) -> Extracted<&T> {
        match self {
            Extracted::Pending => Extracted::Pending,
            Extracted::Resolved(value) => Extracted::Resolved(value),
        }
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Extracted::Pending => None,
            Extracted::Resolved(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopingInsight {
    pub task_summary: Extracted<String>,
    pub audience: Extracted<String>,
    pub policy_suggestions: Extracted<Vec<String>>,
    /// The unmodified text as received
    pub raw: String,
}

impl ScopingInsight {
    pub fn extract(text: &str) -> Self {
        let sections = split_sections(text);
        let section = |name: &str| {
            sections
                .iter()
                .find(|(marker, _)| marker.as_str() == name)
                .map(|(_, body)| body.as_str())
        };

        let task_summary = section(TASK_SUMMARY_MARKER)
            .and_then(non_empty)
            .map_or(Extracted::Pending, Extracted::Resolved);
        let audience = section(AUDIENCE_MARKER)
            .and_then(non_empty)
            .map_or(Extracted::Pending, Extracted::Resolved);
        let policy_suggestions = section(POLICY_MARKER)
            .map(bullet_items)
            .filter(|items| !items.is_empty())
            .map_or(Extracted::Pending, Extracted::Resolved);

        Self {
            task_summary,
            audience,
            policy_suggestions,
            raw: text.to_string(),
        }
    }

    /// True when none of the fields could be extracted
    pub fn is_empty(&self) -> bool {
        !self.task_summary.is_resolved()
            && !self.audience.is_resolved()
            && !self.policy_suggestions.is_resolved()
    }
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"【([^】]+)】").expect("valid regex"))
}

fn rule_regex() -> &'static Regex {
    static RULE: OnceLock<Regex> = OnceLock::new();
    RULE.get_or_init(|| Regex::new(r"(?m)^\s*-{3,}\s*$").expect("valid regex"))
}

/// Splits the text into `(marker, body)` pairs. A body ends at the next marker
/// or at a `---` rule, whichever comes first.
fn split_sections(text: &str) -> Vec<(String, String)> {
    let markers: Vec<_> = marker_regex().captures_iter(text).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (index, captures) in markers.iter().enumerate() {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let end = markers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |next| next.start());
        let mut body = &text[whole.end()..end];
        if let Some(rule) = rule_regex().find(body) {
            body = &body[..rule.start()];
        }
        sections.push((name.as_str().trim().to_string(), body.trim().to_string()));
    }

    sections
}

fn non_empty(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn bullet_items(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter_map(|line| {
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('*'))
                .or_else(|| line.strip_prefix('・'))
        })
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
