//! Explicit memory-capture markers (spec.md §4.3 step 2): a user can force
//! an insight into the store by prefixing a prompt line with `REMEMBER:`,
//! `DECISION:`, `PREFERENCE:`, `CORRECTION:` or `BECAUSE:`, bypassing the
//! implicit learners entirely. Grounded in spec.md's prose description of
//! the bridge cycle's memory-capture step; no `memory_capture.py` survives
//! in the retrieved corpus to port directly.

use std::sync::LazyLock;

use regex::Regex;

use super::slug_key;
use crate::event::Event;
use crate::insight::{Evidence, InsightCandidate, InsightCategory};

static MARKERS: LazyLock<Vec<(Regex, InsightCategory)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?is)\bREMEMBER:\s*(.+)").unwrap(), InsightCategory::Principle),
        (Regex::new(r"(?is)\bDECISION:\s*(.+)").unwrap(), InsightCategory::Decision),
        (Regex::new(r"(?is)\bPREFERENCE:\s*(.+)").unwrap(), InsightCategory::Preference),
        (Regex::new(r"(?is)\bCORRECTION:\s*(.+)").unwrap(), InsightCategory::Decision),
        (Regex::new(r"(?is)\bBECAUSE:\s*(.+)").unwrap(), InsightCategory::Principle),
    ]
});

/// Scan one event's user-prompt text for memory-capture markers, returning
/// one candidate per marker that matched (a single prompt can plant more
/// than one memory, unlike the taste-parse step which stops at the first).
pub fn capture(event: &Event) -> Vec<InsightCandidate> {
    let Some(text) = event.user_prompt_text() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (pattern, category) in MARKERS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let statement = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if statement.len() < 4 {
            continue;
        }
        let statement: String = statement.chars().take(400).collect();
        out.push(InsightCandidate {
            key: format!("memory:{}", slug_key(&statement)),
            text: statement,
            category: *category,
            confidence: 0.75,
            evidence: vec![Evidence {
                trace_id: event.trace_id.clone(),
                note: "explicit memory marker".into(),
                ts: event.ts,
            }],
            source_chip: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use chrono::Utc;
    use serde_json::json;

    fn prompt(text: &str) -> Event {
        Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::UserPrompt,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t1".into()),
            tool_name: None,
            tool_input: None,
            payload: json!({"role": "user", "text": text}),
            extra: Default::default(),
        }
    }

    #[test]
    fn remember_marker_produces_a_principle_candidate() {
        let candidates = capture(&prompt("REMEMBER: always vendor the lockfile"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].category, InsightCategory::Principle);
        assert_eq!(candidates[0].text, "always vendor the lockfile");
    }

    #[test]
    fn no_marker_produces_nothing() {
        assert!(capture(&prompt("just a normal question")).is_empty());
    }

    #[test]
    fn preference_marker_is_categorized_as_preference() {
        let candidates = capture(&prompt("PREFERENCE: tabs over spaces"));
        assert_eq!(candidates[0].category, InsightCategory::Preference);
    }
}
