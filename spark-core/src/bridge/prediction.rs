//! Outcome prediction loop (spec.md §4.3 step 6): keeps a smoothed
//! per-tool failure rate so the advisory engine can, when
//! `SPARK_OUTCOME_PREDICTOR` is enabled, bump authority for tools that
//! tend to fail (`advisory_engine.outcome_predictor_authority_bump` in
//! `tuneables.json`). Persisted at `outcome_predictor.json`, independent of
//! `OutcomeTracker`'s per-insight validation state — this is purely a
//! per-tool statistic, not tied to any one insight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::event::{EventKind, QueuedEvent};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ToolStats {
    successes: u64,
    failures: u64,
}

impl ToolStats {
    /// Add-one-smoothed failure rate so a tool with one or two samples
    /// doesn't immediately read as certain-to-fail or certain-to-succeed.
    fn failure_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        (self.failures as f64 + 1.0) / (total as f64 + 2.0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PredictorDocument {
    #[serde(default)]
    tools: HashMap<String, ToolStats>,
}

pub struct OutcomePredictor {
    path: PathBuf,
    doc: RwLock<PredictorDocument>,
}

impl OutcomePredictor {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                PredictorDocument::default()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            PredictorDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Fold one batch's post-tool outcomes into per-tool counters, returning
    /// how many events contributed.
    pub fn observe(&self, events: &[QueuedEvent]) -> Result<u64> {
        let mut n = 0u64;
        {
            let mut doc = self.doc.write().expect("predictor lock poisoned");
            for qe in events {
                let event = &qe.event;
                let Some(tool) = &event.tool_name else { continue };
                match event.kind {
                    EventKind::PostTool => {
                        doc.tools.entry(tool.clone()).or_default().successes += 1;
                        n += 1;
                    }
                    EventKind::PostToolFailure => {
                        doc.tools.entry(tool.clone()).or_default().failures += 1;
                        n += 1;
                    }
                    _ => {}
                }
            }
        }
        if n > 0 {
            self.persist()?;
        }
        Ok(n)
    }

    /// Estimated failure probability for `tool`; 0.5 with no history at all
    /// (maximally uncertain rather than assuming success).
    pub fn failure_probability(&self, tool: &str) -> f64 {
        self.doc
            .read()
            .expect("predictor lock poisoned")
            .tools
            .get(tool)
            .map(ToolStats::failure_rate)
            .unwrap_or(0.5)
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read().expect("predictor lock poisoned");
        let data = serde_json::to_vec_pretty(&*doc)?;
        drop(doc);
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(&self.path)
            .map_err(|e| crate::error::Error::transient_io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use chrono::Utc;
    use serde_json::json;

    fn tool_event(kind: EventKind, tool: &str) -> QueuedEvent {
        QueuedEvent {
            offset: 0,
            event: Event {
                v: 1,
                source: "openclaw".into(),
                kind,
                ts: Utc::now(),
                session_id: "s1".into(),
                trace_id: Some("t1".into()),
                tool_name: Some(tool.into()),
                tool_input: None,
                payload: json!({}),
                extra: Default::default(),
            },
        }
    }

    #[test]
    fn unknown_tool_defaults_to_uncertain() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = OutcomePredictor::open(dir.path().join("p.json")).unwrap();
        assert_eq!(predictor.failure_probability("Bash"), 0.5);
    }

    #[test]
    fn failures_raise_estimated_probability() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = OutcomePredictor::open(dir.path().join("p.json")).unwrap();
        let events = vec![
            tool_event(EventKind::PostToolFailure, "Bash"),
            tool_event(EventKind::PostToolFailure, "Bash"),
            tool_event(EventKind::PostTool, "Bash"),
        ];
        predictor.observe(&events).unwrap();
        assert!(predictor.failure_probability("Bash") > 0.5);
    }
}
