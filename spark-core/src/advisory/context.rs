//! Pre-tool context build (spec.md §4.6 step 1): extract tool, phase,
//! intent family, trace id, cwd, and session id from a `pre_tool` event plus
//! its recent event history, and compute the packet fingerprint used by the
//! retrieval cache (§3 "Packet").

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::event::{Event, EventKind};

/// Inferred workflow state (GLOSSARY "Phase").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Exploration,
    Planning,
    Implementation,
    Testing,
    Debugging,
    Deployment,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Exploration => "exploration",
            Phase::Planning => "planning",
            Phase::Implementation => "implementation",
            Phase::Testing => "testing",
            Phase::Debugging => "debugging",
            Phase::Deployment => "deployment",
        }
    }
}

/// Infer the current phase from the tool about to run plus recent tool
/// names in the session's history (most-recent last). Exploration is the
/// default when nothing more specific is signalled, matching the gate's
/// "suppress in pure exploration unless high-authority" default policy.
pub fn infer_phase(tool: &str, recent_tools: &[&str]) -> Phase {
    let lower = tool.to_lowercase();
    if matches!(lower.as_str(), "bash") && recent_tools.iter().any(|t| {
        let t = t.to_lowercase();
        t.contains("deploy") || t.contains("publish") || t.contains("release")
    }) {
        return Phase::Deployment;
    }
    match lower.as_str() {
        "bash" => {
            if recent_tools.iter().any(|t| t.to_lowercase().contains("test")) {
                Phase::Testing
            } else {
                Phase::Implementation
            }
        }
        "edit" | "write" | "notebookedit" | "multiedit" => Phase::Implementation,
        "read" | "glob" | "grep" | "websearch" | "webfetch" => Phase::Exploration,
        "task" | "todowrite" => Phase::Planning,
        _ => {
            if recent_tools.iter().any(|t| {
                let t = t.to_lowercase();
                t.contains("deploy") || t.contains("publish")
            }) {
                Phase::Deployment
            } else if recent_tools
                .iter()
                .any(|t| t.to_lowercase().contains("test"))
            {
                Phase::Testing
            } else {
                Phase::Exploration
            }
        }
    }
}

/// A coarse bucket for "what kind of thing is being attempted", used to key
/// the outcome predictor and domain retrieval profiles. Derived from tool
/// input and recent user text with simple keyword matching — the original
/// implementation does the same (no ML classifier in the hot path).
pub fn infer_intent_family(tool: &str, tool_input_text: &str, recent_user_text: &str) -> String {
    let haystack = format!("{tool_input_text} {recent_user_text}").to_lowercase();
    let rules: &[(&str, &[&str])] = &[
        ("deployment", &["deploy", "release", "publish", "production"]),
        ("testing", &["test", "pytest", "jest", "cargo test"]),
        ("database", &["migration", "sql", "schema", "database"]),
        ("refactor", &["refactor", "rename", "restructure"]),
        ("debugging", &["debug", "traceback", "stack trace", "fix bug"]),
        ("research", &["search", "investigate", "explore"]),
    ];
    for (family, keywords) in rules {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return (*family).to_string();
        }
    }
    format!("generic:{}", tool.to_lowercase())
}

/// The full query context for one advisory decision.
#[derive(Debug, Clone)]
pub struct AdvisoryContext {
    pub tool: String,
    pub phase: Phase,
    pub intent_family: String,
    pub trace_id: String,
    pub session_id: String,
    pub cwd: Option<String>,
    pub recent_user_text: String,
    pub tool_input_tokens: Vec<String>,
}

impl AdvisoryContext {
    /// Build from a `pre_tool` event plus recent history (most-recent last).
    /// Returns `None` if `event` is not a `pre_tool` event or lacks a trace
    /// id — both are required for the hot path per spec.md I2.
    pub fn build(event: &Event, recent: &[Event]) -> Option<Self> {
        if event.kind != EventKind::PreTool {
            return None;
        }
        let trace_id = event.trace_id.clone()?;
        let tool = event.tool_name.clone().unwrap_or_default();
        let recent_tools: Vec<&str> = recent
            .iter()
            .filter_map(|e| e.tool_name.as_deref())
            .collect();
        let phase = infer_phase(&tool, &recent_tools);
        let recent_user_text = recent
            .iter()
            .rev()
            .find_map(|e| e.user_prompt_text())
            .unwrap_or_default()
            .to_string();
        let tool_input_text = event
            .tool_input
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let intent_family = infer_intent_family(&tool, &tool_input_text, &recent_user_text);
        let tool_input_tokens = tokenize(&tool_input_text);

        Some(Self {
            tool,
            phase,
            intent_family,
            trace_id,
            session_id: event.session_id.clone(),
            cwd: event.cwd().map(str::to_string),
            recent_user_text,
            tool_input_tokens,
        })
    }

    /// The context fingerprint used to key the packet cache (§3 "Packet":
    /// "tool + phase + intent family + top tokens").
    pub fn fingerprint(&self) -> String {
        let mut top_tokens = self.tool_input_tokens.clone();
        top_tokens.sort();
        top_tokens.dedup();
        top_tokens.truncate(8);
        let mut hasher = DefaultHasher::new();
        self.tool.hash(&mut hasher);
        self.phase.hash(&mut hasher);
        self.intent_family.hash(&mut hasher);
        top_tokens.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Query tokens for lexical retrieval: tool name, intent family, and
    /// recent user text, merged and lowercased.
    pub fn query_tokens(&self) -> Vec<String> {
        let mut tokens = tokenize(&self.tool);
        tokens.extend(tokenize(&self.intent_family));
        tokens.extend(tokenize(&self.recent_user_text));
        tokens
    }
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn pre_tool(tool: &str, trace_id: Option<&str>) -> Event {
        Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::PreTool,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: trace_id.map(String::from),
            tool_name: Some(tool.into()),
            tool_input: Some(json!({"command": "rm -rf /"})),
            payload: json!({"cwd": "/home/user/proj"}),
            extra: Default::default(),
        }
    }

    #[test]
    fn build_requires_trace_id() {
        let event = pre_tool("Bash", None);
        assert!(AdvisoryContext::build(&event, &[]).is_none());
    }

    #[test]
    fn build_extracts_tool_and_cwd() {
        let event = pre_tool("Bash", Some("t1"));
        let ctx = AdvisoryContext::build(&event, &[]).unwrap();
        assert_eq!(ctx.tool, "Bash");
        assert_eq!(ctx.cwd.as_deref(), Some("/home/user/proj"));
        assert_eq!(ctx.trace_id, "t1");
    }

    #[test]
    fn infer_phase_defaults_to_exploration_for_read() {
        assert_eq!(infer_phase("Read", &[]), Phase::Exploration);
    }

    #[test]
    fn infer_phase_detects_deployment_from_recent_history() {
        assert_eq!(
            infer_phase("Bash", &["deploy_script"]),
            Phase::Deployment
        );
    }

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let event = pre_tool("Bash", Some("t1"));
        let ctx_a = AdvisoryContext::build(&event, &[]).unwrap();
        let ctx_b = AdvisoryContext::build(&event, &[]).unwrap();
        assert_eq!(ctx_a.fingerprint(), ctx_b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_for_different_tools() {
        let a = AdvisoryContext::build(&pre_tool("Bash", Some("t1")), &[]).unwrap();
        let b = AdvisoryContext::build(&pre_tool("Edit", Some("t1")), &[]).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn intent_family_detects_deployment_keywords() {
        assert_eq!(
            infer_intent_family("Bash", "deploy to production", ""),
            "deployment"
        );
    }

    #[test]
    fn intent_family_falls_back_to_generic_tool_bucket() {
        assert_eq!(infer_intent_family("Glob", "", ""), "generic:glob");
    }
}
