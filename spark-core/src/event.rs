//! The Event type observed from adapters (spec.md §3 "Event").
//!
//! An event is one observation POSTed to `/ingest` by a tailer adapter. It is
//! immutable once appended to the queue; identity is `(session_id, offset)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of observation an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserPrompt,
    PreTool,
    PostTool,
    PostToolFailure,
    Message,
    System,
    Tool,
    Command,
    XResearch,
}

impl EventKind {
    /// True for the two kinds the outcome loop (C7) treats as success/failure
    /// signals from tool execution, as opposed to user-message sentiment.
    pub fn is_tool_outcome(&self) -> bool {
        matches!(self, EventKind::PostTool | EventKind::PostToolFailure)
    }
}

/// A single normalized event appended to the event queue.
///
/// Unknown top-level keys from the wire payload are preserved in `extra` so
/// that validation can ignore them (per the ingest contract) without losing
/// them for downstream steps that might care. `extra` is never round-tripped
/// back out to adapters; it exists for internal forward-compatibility only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Schema version of the wire payload.
    pub v: u32,
    /// Adapter tag, e.g. "openclaw", "claude_code", "clawdbot", "cursor".
    pub source: String,
    pub kind: EventKind,
    /// Monotonic-ish wall-clock timestamp assigned by the adapter.
    pub ts: DateTime<Utc>,
    pub session_id: String,
    /// Stable id binding a pre_tool event, its advisory decision, and any
    /// downstream outcome links (spec.md §4.6, §4.7, GLOSSARY "Trace id").
    pub trace_id: Option<String>,
    /// Tool name, present for pre_tool/post_tool/post_tool_failure/tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool input, kind-dependent shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    /// Free-form payload (e.g. `{role, text}` for user_prompt/message).
    #[serde(default)]
    pub payload: Value,
    #[serde(flatten, skip_serializing)]
    pub extra: serde_json::Map<String, Value>,
}

impl Event {
    /// The queue-assigned identity once appended: `(session_id, offset)`.
    /// The offset itself is assigned by `EventQueue::append`, not here.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Extract user-prompt text, if this is a `user_prompt` event with
    /// `payload.role == "user"`.
    pub fn user_prompt_text(&self) -> Option<&str> {
        if self.kind != EventKind::UserPrompt {
            return None;
        }
        let obj = self.payload.as_object()?;
        if obj.get("role").and_then(Value::as_str) != Some("user") {
            return None;
        }
        obj.get("text").and_then(Value::as_str)
    }

    /// Current working directory, if the adapter attached one.
    pub fn cwd(&self) -> Option<&str> {
        self.payload.get("cwd").and_then(Value::as_str)
    }
}

/// A queued event paired with its durable offset, as returned by reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub offset: u64,
    #[serde(flatten)]
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_prompt_text_extraction() {
        let event = Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::UserPrompt,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: None,
            tool_name: None,
            tool_input: None,
            payload: json!({"role": "user", "text": "please use snake_case"}),
            extra: Default::default(),
        };
        assert_eq!(event.user_prompt_text(), Some("please use snake_case"));
    }

    #[test]
    fn non_user_role_is_ignored() {
        let event = Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::UserPrompt,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: None,
            tool_name: None,
            tool_input: None,
            payload: json!({"role": "assistant", "text": "ok"}),
            extra: Default::default(),
        };
        assert_eq!(event.user_prompt_text(), None);
    }

    #[test]
    fn tool_outcome_kinds() {
        assert!(EventKind::PostTool.is_tool_outcome());
        assert!(EventKind::PostToolFailure.is_tool_outcome());
        assert!(!EventKind::PreTool.is_tool_outcome());
    }

    #[test]
    fn deserializes_unknown_fields_without_error() {
        let raw = json!({
            "v": 1,
            "source": "openclaw",
            "kind": "pre_tool",
            "ts": Utc::now().to_rfc3339(),
            "session_id": "s1",
            "trace_id": "t1",
            "payload": {},
            "from_the_future": "ignored",
        });
        let event: Event = serde_json::from_value(raw).unwrap();
        assert_eq!(event.trace_id.as_deref(), Some("t1"));
    }
}
