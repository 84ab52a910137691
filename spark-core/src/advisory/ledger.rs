//! Decision ledger (spec.md §4.6 step 7, P3 "every advisory decision is
//! auditable"): append-only JSONL record of every emit-or-suppress
//! decision, independent of whether advice was actually shown.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retrieval::AdviceSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    pub ts: DateTime<Utc>,
    pub trace_id: String,
    pub session_id: String,
    pub tool: String,
    pub phase: String,
    pub intent_family: String,
    pub emitted: bool,
    pub authority: Option<f64>,
    pub category: Option<String>,
    pub suppress_reason: Option<String>,
    /// The resolved source tag of the advice item this row concerns
    /// (spec.md §3 "Advice item", P3). `None` only for rows with no
    /// synthesized item at all (deadline, empty retrieval, bad context).
    pub source: Option<AdviceSource>,
    pub source_keys: Vec<String>,
}

pub struct DecisionLedger {
    path: PathBuf,
}

impl DecisionLedger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &LedgerRow) -> Result<()> {
        let line = serde_json::to_string(row)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::TransientIo(format!("opening {}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| Error::TransientIo(e.to_string()))?;
        Ok(())
    }

    /// Read back all rows — used by tests and the `GET /v1/stats` surface,
    /// not the hot path.
    pub fn read_all(&self) -> Result<Vec<LedgerRow>> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            rows.push(serde_json::from_str(line)?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_row(emitted: bool) -> LedgerRow {
        LedgerRow {
            ts: Utc::now(),
            trace_id: "t1".into(),
            session_id: "s1".into(),
            tool: "Bash".into(),
            phase: "implementation".into(),
            intent_family: "generic:bash".into(),
            emitted,
            authority: Some(0.7),
            category: Some("cognitive".into()),
            suppress_reason: None,
            source: Some(AdviceSource::Baseline),
            source_keys: vec!["k1".into()],
        }
    }

    #[test]
    fn append_and_read_all_round_trips() {
        let dir = tempdir().unwrap();
        let ledger = DecisionLedger::open(dir.path().join("ledger.jsonl"));
        ledger.append(&sample_row(true)).unwrap();
        ledger.append(&sample_row(false)).unwrap();
        let rows = ledger.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].emitted);
        assert!(!rows[1].emitted);
    }

    #[test]
    fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let ledger = DecisionLedger::open(dir.path().join("missing.jsonl"));
        assert!(ledger.read_all().unwrap().is_empty());
    }
}
