//! Outcome signal detection (spec.md §4.7): a two-tier regex pattern-weight
//! table that scores an event as success/failure/neutral, ported from
//! `examples/original_source/lib/outcomes/signals.py` — same pattern
//! weights and tiering, reimplemented as compiled regexes built once.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::event::{Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub kind: OutcomeType,
    pub confidence: f64,
    pub source: String,
    pub content: String,
    pub context: String,
    pub ts: DateTime<Utc>,
    pub trace_id: Option<String>,
}

static SUCCESS_PATTERNS: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    weighted(&[
        (r"(?i)\b(perfect|excellent|exactly what i (wanted|needed))\b", 0.95),
        (r"(?i)\b(works perfectly|that's it|nailed it)\b", 0.9),
        (r"(?i)\b(ship it|done|complete|finished)\b", 0.8),
        (r"(?i)thank(s| you)", 0.6),
        (r"(?i)tests?\s+(pass|passed|passing|succeeded)", 0.9),
        (r"(?i)build\s+(success|succeeded|passed)", 0.9),
        (r"(?i)deployed?\s+(success|to production)", 0.85),
        (r"(?i)no\s+errors?", 0.7),
        (r"exit code 0", 0.8),
        (r"(?i)\b(approved?|lgtm|looks good)\b", 0.85),
        (r"(?i)\b(yes|yep|yeah|correct|right)\b", 0.5),
        (r"(?i)\b(great|good|nice|awesome)\b", 0.6),
    ])
});

static FAILURE_PATTERNS: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    weighted(&[
        (r"(?i)\b(wrong|broken|doesn't work|not working)\b", 0.9),
        (r"(?i)\b(failed?|failure|error|bug)\b", 0.8),
        (r"(?i)\b(ugh|damn|wtf|argh)\b", 0.85),
        (r"(?i)\b(try again|redo|revert)\b", 0.8),
        (r"(?i)tests?\s+(fail|failed|failing)", 0.95),
        (r"(?i)build\s+(fail|failed|error)", 0.95),
        (r"(?i)(exception|traceback|stack trace)", 0.85),
        (r"exit code [1-9]", 0.9),
        (r"(?i)\b(no|nope|nah|incorrect|wrong)\b", 0.6),
        (r"(?i)\b(actually|wait|hold on)\b", 0.5),
        (r"(?i)(that's not|not what i)", 0.8),
    ])
});

fn weighted(pairs: &[(&str, f64)]) -> Vec<(Regex, f64)> {
    pairs
        .iter()
        .map(|(pattern, weight)| (Regex::new(pattern).expect("static pattern"), *weight))
        .collect()
}

fn match_patterns(content: &str, patterns: &[(Regex, f64)]) -> f64 {
    patterns
        .iter()
        .filter(|(re, _)| re.is_match(content))
        .map(|(_, w)| *w)
        .fold(0.0, f64::max)
}

fn extract_content(event: &Event) -> String {
    let mut parts = Vec::new();
    if let Some(text) = event.user_prompt_text() {
        parts.push(text.to_string());
    }
    if let Some(output) = event.payload.get("output").and_then(|v| v.as_str()) {
        parts.push(output.chars().take(500).collect());
    }
    if let Some(input) = &event.tool_input {
        if let Some(obj) = input.as_object() {
            for value in obj.values() {
                if let Some(s) = value.as_str() {
                    if s.len() < 500 {
                        parts.push(s.to_string());
                    }
                }
            }
        }
    }
    parts.join(" ")
}

fn source_of(event: &Event) -> String {
    match &event.tool_name {
        Some(tool) => format!("{:?}/{}", event.kind, tool),
        None => format!("{:?}", event.kind),
    }
}

fn context_of(event: &Event) -> String {
    let mut parts = Vec::new();
    if let Some(cwd) = event.cwd() {
        parts.push(format!("project: {cwd}"));
    }
    if let Some(tool) = &event.tool_name {
        parts.push(format!("tool: {tool}"));
    }
    parts.join(", ")
}

/// Detect a single outcome signal from one event. Requires at least a few
/// characters of extractable content and a success/failure score above the
/// 0.4 floor, matching the original's thresholds.
pub fn detect(event: &Event) -> Option<Outcome> {
    if !matches!(
        event.kind,
        EventKind::Message | EventKind::PostTool | EventKind::PostToolFailure | EventKind::UserPrompt
    ) {
        return None;
    }
    let content = extract_content(event);
    if content.trim().len() < 3 {
        return None;
    }

    let success_score = match_patterns(&content, &SUCCESS_PATTERNS);
    let failure_score = match_patterns(&content, &FAILURE_PATTERNS);

    let (kind, confidence) = if success_score > failure_score && success_score > 0.4 {
        (OutcomeType::Success, success_score)
    } else if failure_score > success_score && failure_score > 0.4 {
        (OutcomeType::Failure, failure_score)
    } else {
        return None;
    };

    Some(Outcome {
        kind,
        confidence,
        source: source_of(event),
        content: content.chars().take(200).collect(),
        context: context_of(event),
        ts: event.ts,
        trace_id: event.trace_id.clone(),
    })
}
