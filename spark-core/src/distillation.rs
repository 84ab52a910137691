//! Distillations (spec.md §3): higher-order statements summarizing multiple
//! insights or episodes. Unlike insights they are not gated by Meta-Ralph —
//! they are produced by the pattern-detection bridge-cycle step from
//! already-validated insights, so they carry their own usage counters
//! instead of quality scores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistillationType {
    Heuristic,
    Playbook,
    Principle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distillation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DistillationType,
    pub statement: String,
    #[serde(default)]
    pub times_retrieved: u64,
    #[serde(default)]
    pub times_used: u64,
    #[serde(default)]
    pub times_helped: u64,
    #[serde(default)]
    pub validation_count: u64,
    #[serde(default)]
    pub contradiction_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Distillation {
    pub fn new(kind: DistillationType, statement: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("dst_{}", Uuid::new_v4().simple()),
            kind,
            statement: statement.into(),
            times_retrieved: 0,
            times_used: 0,
            times_helped: 0,
            validation_count: 0,
            contradiction_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_retrieved(&mut self) {
        self.times_retrieved += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_used(&mut self, helped: bool) {
        self.times_used += 1;
        if helped {
            self.times_helped += 1;
            self.validation_count += 1;
        } else {
            self.contradiction_count += 1;
        }
        self.updated_at = Utc::now();
    }

    /// Fraction of uses judged helpful; `None` with no uses yet so callers
    /// don't mistake an untested distillation for a proven-bad one.
    pub fn help_rate(&self) -> Option<f64> {
        if self.times_used == 0 {
            None
        } else {
            Some(self.times_helped as f64 / self.times_used as f64)
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DistillationDocument {
    #[serde(default)]
    distillations: HashMap<String, Distillation>,
}

/// Append-only-by-id store for distillations, independent of the insight
/// store: distillations are promoted from already-validated insights by the
/// pattern-detection bridge step rather than passing through Meta-Ralph, so
/// they get their own small atomic document instead of sharing one gate.
pub struct DistillationStore {
    path: PathBuf,
    doc: RwLock<DistillationDocument>,
}

impl DistillationStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                DistillationDocument::default()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            DistillationDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Finds an existing distillation with the same kind and statement
    /// (case-insensitive, trimmed) and reinforces it, or creates a new one.
    /// Returns the id either way so callers can keep referencing it.
    pub fn upsert_by_statement(&self, kind: DistillationType, statement: &str) -> Result<String> {
        let needle = statement.trim().to_lowercase();
        let mut doc = self.doc.write().expect("distillation lock poisoned");
        if let Some(existing) = doc
            .distillations
            .values_mut()
            .find(|d| d.kind == kind && d.statement.trim().to_lowercase() == needle)
        {
            existing.updated_at = Utc::now();
            let id = existing.id.clone();
            drop(doc);
            self.persist()?;
            return Ok(id);
        }
        let distillation = Distillation::new(kind, statement);
        let id = distillation.id.clone();
        doc.distillations.insert(id.clone(), distillation);
        drop(doc);
        self.persist()?;
        Ok(id)
    }

    pub fn mark_retrieved(&self, id: &str) -> Result<()> {
        let mut doc = self.doc.write().expect("distillation lock poisoned");
        if let Some(d) = doc.distillations.get_mut(id) {
            d.mark_retrieved();
        }
        drop(doc);
        self.persist()
    }

    pub fn mark_used(&self, id: &str, helped: bool) -> Result<()> {
        let mut doc = self.doc.write().expect("distillation lock poisoned");
        if let Some(d) = doc.distillations.get_mut(id) {
            d.mark_used(helped);
        }
        drop(doc);
        self.persist()
    }

    pub fn snapshot(&self) -> Vec<Distillation> {
        self.doc
            .read()
            .expect("distillation lock poisoned")
            .distillations
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc.read().expect("distillation lock poisoned").distillations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read().expect("distillation lock poisoned");
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

    #[test]
    fn help_rate_is_none_with_no_uses() {
        let d = Distillation::new(DistillationType::Heuristic, "prefer early returns");
        assert_eq!(d.help_rate(), None);
    }

    #[test]
    fn help_rate_tracks_helped_fraction() {
        let mut d = Distillation::new(DistillationType::Playbook, "run tests before commit");
        d.mark_used(true);
        d.mark_used(true);
        d.mark_used(false);
        assert_eq!(d.help_rate(), Some(2.0 / 3.0));
        assert_eq!(d.validation_count, 2);
        assert_eq!(d.contradiction_count, 1);
    }

    #[test]
    fn upsert_reinforces_existing_statement_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = DistillationStore::open(dir.path().join("distillations.json")).unwrap();
        let id1 = store
            .upsert_by_statement(DistillationType::Heuristic, "Run tests before commit")
            .unwrap();
        let id2 = store
            .upsert_by_statement(DistillationType::Heuristic, "run TESTS before commit")
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reopen_reloads_persisted_distillations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distillations.json");
        {
            let store = DistillationStore::open(&path).unwrap();
            store
                .upsert_by_statement(DistillationType::Playbook, "stage diffs before pushing")
                .unwrap();
        }
        let reopened = DistillationStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
