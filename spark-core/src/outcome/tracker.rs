//! Persistent outcome bookkeeping (spec.md §4.7 steps 4–5): per-insight
//! validation counts feeding insight reliability, and per-source
//! effectiveness counters feeding the auto-tuner's source boost. Ported
//! from `examples/original_source/lib/outcomes/tracker.py`'s accumulation
//! shape, split into two independently-persisted documents because the
//! retriever only ever needs the source boosts, not the full per-insight
//! validation history.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::linker::{OutcomeLink, OutcomeLinker, RecentInsight};
use super::signals::{Outcome, OutcomeType};
use crate::error::{Error, Result};
use crate::retrieval::AdviceSource;

/// Validation state for a single insight key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightValidation {
    pub positive_validations: u32,
    pub negative_validations: u32,
    pub total_confidence: f64,
    pub last_validated: Option<DateTime<Utc>>,
}

impl InsightValidation {
    /// Positive ratio with add-one smoothing, scaled by how much confidence
    /// has actually accumulated (caps out once total confidence reaches 5.0,
    /// matching the original's `min(1.0, total_confidence / 5.0)` factor).
    pub fn reliability(&self) -> f64 {
        let total = self.positive_validations + self.negative_validations;
        if total == 0 {
            return 0.5;
        }
        let positive_ratio = (self.positive_validations as f64 + 1.0) / (total as f64 + 2.0);
        let confidence_factor = (self.total_confidence / 5.0).min(1.0);
        positive_ratio * (0.7 + 0.3 * confidence_factor)
    }

    pub fn validated(&self) -> bool {
        self.reliability() >= 0.7 && self.positive_validations >= 2
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerDocument {
    insights: HashMap<String, InsightValidation>,
    total_outcomes: u64,
    success_count: u64,
    failure_count: u64,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_outcomes: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub insights_tracked: usize,
    pub validated: usize,
    pub invalidated: usize,
    pub pending: usize,
}

/// Tracks outcomes and turns them into per-insight validation state,
/// persisted as a single JSON document (`outcome_tracker.json`) rewritten
/// atomically on every `process` call.
pub struct OutcomeTracker {
    path: PathBuf,
    doc: RwLock<TrackerDocument>,
}

impl OutcomeTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            TrackerDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Link `outcome` against `recent` via `linker`, fold the resulting
    /// links into per-insight validation state, and persist.
    pub fn process(
        &self,
        outcome: &Outcome,
        recent: &[RecentInsight],
        linker: &OutcomeLinker,
    ) -> Result<Vec<OutcomeLink>> {
        let links = linker.link(outcome, recent)?;
        {
            let mut doc = self.doc.write().expect("tracker lock poisoned");
            doc.total_outcomes += 1;
            match outcome.kind {
                OutcomeType::Success => doc.success_count += 1,
                OutcomeType::Failure => doc.failure_count += 1,
            }
            for link in &links {
                apply_link(&mut doc.insights, link);
            }
            doc.last_updated = Some(Utc::now());
        }
        self.persist()?;
        Ok(links)
    }

    pub fn get_insight_reliability(&self, insight_id: &str) -> f64 {
        self.doc
            .read()
            .expect("tracker lock poisoned")
            .insights
            .get(insight_id)
            .map(InsightValidation::reliability)
            .unwrap_or(0.5)
    }

    pub fn is_validated(&self, insight_id: &str) -> bool {
        self.doc
            .read()
            .expect("tracker lock poisoned")
            .insights
            .get(insight_id)
            .map(InsightValidation::validated)
            .unwrap_or(false)
    }

    pub fn get_invalidated_insights(&self) -> Vec<String> {
        self.doc
            .read()
            .expect("tracker lock poisoned")
            .insights
            .iter()
            .filter(|(_, v)| v.reliability() < 0.3 && v.negative_validations >= 2)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn stats(&self) -> TrackerStats {
        let doc = self.doc.read().expect("tracker lock poisoned");
        let validated = doc.insights.values().filter(|v| v.validated()).count();
        let invalidated = doc
            .insights
            .values()
            .filter(|v| v.reliability() < 0.3 && v.negative_validations >= 2)
            .count();
        let tracked = doc.insights.len();
        TrackerStats {
            total_outcomes: doc.total_outcomes,
            success_count: doc.success_count,
            failure_count: doc.failure_count,
            success_rate: if doc.total_outcomes > 0 {
                doc.success_count as f64 / doc.total_outcomes as f64
            } else {
                0.0
            },
            insights_tracked: tracked,
            validated,
            invalidated,
            pending: tracked.saturating_sub(validated).saturating_sub(invalidated),
        }
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read().expect("tracker lock poisoned");
        atomic_write_json(&self.path, &*doc)
    }
}

fn apply_link(insights: &mut HashMap<String, InsightValidation>, link: &OutcomeLink) {
    let entry = insights.entry(link.insight_id.clone()).or_default();
    match link.outcome_type {
        OutcomeType::Success => {
            entry.positive_validations += 1;
            entry.total_confidence += link.confidence;
        }
        OutcomeType::Failure => {
            entry.negative_validations += 1;
            entry.total_confidence += link.confidence;
        }
    }
    entry.last_validated = Some(Utc::now());
}

/// Given/followed/helpful counters for one advice source (spec.md §4.7
/// step 5). `boost` is recomputed on every update and clamped to [0.8, 1.1]
/// so a single source can never dominate or be zeroed out of fusion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceEffectiveness {
    pub given: u64,
    pub followed: u64,
    pub helpful: u64,
}

impl SourceEffectiveness {
    /// Smoothed helpful-rate mapped into [0.8, 1.1]: a source with no track
    /// record yet sits at the neutral midpoint (1.0-ish), and only shifts
    /// meaningfully after enough evidence has accumulated.
    pub fn boost(&self) -> f64 {
        let rate = (self.helpful as f64 + 1.0) / (self.given as f64 + 2.0);
        (0.8 + 0.3 * rate).clamp(0.8, 1.1)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EffectivenessDocument {
    sources: HashMap<AdviceSource, SourceEffectiveness>,
}

/// The auto-tuner (spec.md §4.7): pure bookkeeping over per-source
/// effectiveness, persisted to `advisor/effectiveness.json`. Never edits
/// policy thresholds — only the clamped source boost the retriever applies.
pub struct EffectivenessTracker {
    path: PathBuf,
    doc: RwLock<EffectivenessDocument>,
}

impl EffectivenessTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let data = std::fs::read(&path)?;
            serde_json::from_slice(&data)?
        } else {
            EffectivenessDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn record_given(&self, source: AdviceSource) -> Result<()> {
        self.doc
            .write()
            .expect("effectiveness lock poisoned")
            .sources
            .entry(source)
            .or_default()
            .given += 1;
        self.persist()
    }

    pub fn record_followed(&self, source: AdviceSource) -> Result<()> {
        self.doc
            .write()
            .expect("effectiveness lock poisoned")
            .sources
            .entry(source)
            .or_default()
            .followed += 1;
        self.persist()
    }

    pub fn record_helpful(&self, source: AdviceSource) -> Result<()> {
        self.doc
            .write()
            .expect("effectiveness lock poisoned")
            .sources
            .entry(source)
            .or_default()
            .helpful += 1;
        self.persist()
    }

    pub fn source_boost(&self, source: AdviceSource) -> f64 {
        self.doc
            .read()
            .expect("effectiveness lock poisoned")
            .sources
            .get(&source)
            .map(SourceEffectiveness::boost)
            .unwrap_or(1.0)
    }

    /// Snapshot of every source's current boost, keyed the way
    /// `Retriever::source_boosts` expects it.
    pub fn source_boosts(&self) -> HashMap<AdviceSource, f64> {
        self.doc
            .read()
            .expect("effectiveness lock poisoned")
            .sources
            .iter()
            .map(|(source, eff)| (*source, eff.boost()))
            .collect()
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read().expect("effectiveness lock poisoned");
        atomic_write_json(&self.path, &*doc)
    }
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    use std::io::Write as _;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| Error::transient_io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_outcome(kind: OutcomeType) -> Outcome {
        Outcome {
            kind,
            confidence: 0.9,
            source: "Message".into(),
            content: "tests passed, ship it".into(),
            context: String::new(),
            ts: Utc::now(),
            trace_id: None,
        }
    }

    fn sample_recent() -> Vec<RecentInsight> {
        vec![RecentInsight {
            id: "ins_1".into(),
            content: "ship it when tests pass".into(),
            timestamp: Utc::now(),
            file_path: None,
            chip_id: None,
        }]
    }

    #[test]
    fn reliability_is_unknown_with_no_validations() {
        let v = InsightValidation::default();
        assert_eq!(v.reliability(), 0.5);
        assert!(!v.validated());
    }

    #[test]
    fn repeated_success_links_raise_reliability() {
        let dir = tempdir().unwrap();
        let linker = OutcomeLinker::open(dir.path().join("links.jsonl"));
        let tracker = OutcomeTracker::open(dir.path().join("tracker.json")).unwrap();
        for _ in 0..3 {
            tracker
                .process(&sample_outcome(OutcomeType::Success), &sample_recent(), &linker)
                .unwrap();
        }
        assert!(tracker.get_insight_reliability("ins_1") > 0.5);
        assert!(tracker.is_validated("ins_1"));
    }

    #[test]
    fn repeated_failure_links_mark_invalidated() {
        let dir = tempdir().unwrap();
        let linker = OutcomeLinker::open(dir.path().join("links.jsonl"));
        let tracker = OutcomeTracker::open(dir.path().join("tracker.json")).unwrap();
        for _ in 0..3 {
            tracker
                .process(&sample_outcome(OutcomeType::Failure), &sample_recent(), &linker)
                .unwrap();
        }
        assert!(tracker.get_invalidated_insights().contains(&"ins_1".to_string()));
    }

    #[test]
    fn stats_reports_success_rate() {
        let dir = tempdir().unwrap();
        let linker = OutcomeLinker::open(dir.path().join("links.jsonl"));
        let tracker = OutcomeTracker::open(dir.path().join("tracker.json")).unwrap();
        tracker
            .process(&sample_outcome(OutcomeType::Success), &sample_recent(), &linker)
            .unwrap();
        let stats = tracker.stats();
        assert_eq!(stats.total_outcomes, 1);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[test]
    fn effectiveness_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("effectiveness.json");
        {
            let tracker = EffectivenessTracker::open(&path).unwrap();
            tracker.record_given(AdviceSource::Cognitive).unwrap();
            tracker.record_helpful(AdviceSource::Cognitive).unwrap();
        }
        let reloaded = EffectivenessTracker::open(&path).unwrap();
        assert!(reloaded.source_boost(AdviceSource::Cognitive) > 1.0);
    }

    #[test]
    fn source_boost_stays_within_clamp() {
        let dir = tempdir().unwrap();
        let tracker = EffectivenessTracker::open(dir.path().join("effectiveness.json")).unwrap();
        for _ in 0..50 {
            tracker.record_given(AdviceSource::Chip).unwrap();
            tracker.record_helpful(AdviceSource::Chip).unwrap();
        }
        let boost = tracker.source_boost(AdviceSource::Chip);
        assert!((0.8..=1.1).contains(&boost));
    }

    #[test]
    fn unknown_source_defaults_to_neutral_boost() {
        let dir = tempdir().unwrap();
        let tracker = EffectivenessTracker::open(dir.path().join("effectiveness.json")).unwrap();
        assert_eq!(tracker.source_boost(AdviceSource::Mind), 1.0);
    }
}
