//! The `/ingest` wire contract (spec.md §4.1, §6): a JSON object with
//! fields `{v, source, kind, ts, session_id, payload, trace_id}`. Unknown
//! keys are ignored (handled by `Event`'s `extra` catch-all); missing
//! required fields or an oversized body are rejected with a stable error
//! before anything reaches the queue.

use crate::error::{Error, Result};
use crate::event::Event;

/// Request body is bounded well under typical tool-input sizes; an
/// oversized request is a 413 at the HTTP layer (spec.md §6).
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;

/// A field allowed to be bounded more tightly: the free-form payload
/// itself, so one adapter can't smuggle an enormous blob through a
/// technically-under-limit request.
const MAX_PAYLOAD_VALUE_BYTES: usize = 64 * 1024;

/// The raw, not-yet-validated ingest request body.
pub struct IngestEvent<'a> {
    body: &'a [u8],
}

impl<'a> IngestEvent<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body }
    }

    /// Validate and parse this request body into a queue-ready `Event`.
    /// Rejects on: oversized body, malformed JSON, missing required
    /// fields, or an oversized `payload` value — all as `Error::Validation`
    /// so the HTTP layer can map them uniformly to 400s (size separately
    /// to 413, per spec.md §6).
    pub fn validate(&self) -> Result<Event> {
        if self.body.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::validation(format!(
                "request body of {} bytes exceeds the {} byte limit",
                self.body.len(),
                MAX_PAYLOAD_BYTES
            )));
        }

        let raw: serde_json::Value = serde_json::from_slice(self.body)
            .map_err(|e| Error::validation(format!("malformed JSON: {e}")))?;
        let obj = raw
            .as_object()
            .ok_or_else(|| Error::validation("ingest event must be a JSON object"))?;

        for field in ["v", "source", "kind", "ts", "session_id"] {
            if !obj.contains_key(field) {
                return Err(Error::validation(format!("missing required field: {field}")));
            }
        }

        if let Some(payload) = obj.get("payload") {
            let size = serde_json::to_vec(payload).map(|v| v.len()).unwrap_or(0);
            if size > MAX_PAYLOAD_VALUE_BYTES {
                return Err(Error::validation(format!(
                    "payload of {size} bytes exceeds the {MAX_PAYLOAD_VALUE_BYTES} byte limit"
                )));
            }
        }

        serde_json::from_value(raw).map_err(|e| Error::validation(format!("invalid event shape: {e}")))
    }
}

pub fn validate_ingest_event(body: &[u8]) -> Result<Event> {
    IngestEvent::new(body).validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "v": 1,
            "source": "openclaw",
            "kind": "pre_tool",
            "ts": chrono::Utc::now().to_rfc3339(),
            "session_id": "s1",
            "trace_id": "t1",
            "tool_name": "Bash",
            "tool_input": {"command": "ls"},
            "payload": {},
        }))
        .unwrap()
    }

    #[test]
    fn valid_event_parses() {
        let body = valid_body();
        let event = validate_ingest_event(&body).unwrap();
        assert_eq!(event.session_id, "s1");
    }

    #[test]
    fn unknown_keys_are_preserved_not_rejected() {
        let mut value: serde_json::Value = serde_json::from_slice(&valid_body()).unwrap();
        value["future_field"] = json!("anything");
        let body = serde_json::to_vec(&value).unwrap();
        assert!(validate_ingest_event(&body).is_ok());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_slice(&valid_body()).unwrap();
        value.as_object_mut().unwrap().remove("session_id");
        let body = serde_json::to_vec(&value).unwrap();
        let err = validate_ingest_event(&body).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let body = vec![b'x'; MAX_PAYLOAD_BYTES + 1];
        let err = validate_ingest_event(&body).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn oversized_payload_value_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_slice(&valid_body()).unwrap();
        value["payload"] = json!({"blob": "x".repeat(MAX_PAYLOAD_VALUE_BYTES + 1)});
        let body = serde_json::to_vec(&value).unwrap();
        let err = validate_ingest_event(&body).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let body = serde_json::to_vec(&json!([1, 2, 3])).unwrap();
        assert!(validate_ingest_event(&body).is_err());
    }
}
