//! The insight store (spec.md §4.4): a keyed map of insights persisted as a
//! single JSON document, rewritten atomically (tmp + rename) on change. All
//! writes are routed through `validate_and_store`, the Meta-Ralph write
//! gate; nothing else may mutate the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;
use crate::insight::{Insight, InsightCandidate};
use crate::meta_ralph::{self, GateDecision, GateStats, MetaRalphConfig};

/// Outcome of a single `validate_and_store` call, used by bridge-cycle
/// callers and tests to assert P2 (write-gate totality: the resulting
/// store-or-quarantine set is never empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Stored(GateDecision),
    FilteredAsNoise,
    QuarantinedOnException,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    insights: HashMap<String, Insight>,
}

/// One row appended to `insight_quarantine.jsonl` or `roast_history.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuarantineRow {
    ts: chrono::DateTime<Utc>,
    key: String,
    text: String,
    reason: String,
}

/// Candidate text that forces the scoring closure in `validate_and_store`
/// to panic, exercising the fail-open quarantine path under test. The
/// leading NUL makes accidental collision with real candidate text
/// essentially impossible; unreachable outside `#[cfg(test)]` builds.
#[cfg(test)]
pub(crate) const FORCE_SCORING_PANIC_FOR_TEST: &str = "\u{0}__force_scoring_panic_for_test__";

pub struct InsightStore {
    store_path: PathBuf,
    quarantine_path: PathBuf,
    roast_history_path: PathBuf,
    config: MetaRalphConfig,
    document: RwLock<StoreDocument>,
    stats: GateStats,
    /// `Some` while a `begin_batch`/`end_batch` span is open; writes during
    /// the span mutate `document` in memory only, persisted once at
    /// `end_batch` (spec.md §4.4 "persisted once per cycle instead of per
    /// insight").
    batching: std::sync::atomic::AtomicBool,
}

impl InsightStore {
    pub fn open(
        store_path: impl Into<PathBuf>,
        quarantine_path: impl Into<PathBuf>,
        roast_history_path: impl Into<PathBuf>,
        config: MetaRalphConfig,
    ) -> Result<Self> {
        let store_path = store_path.into();
        let document = if store_path.exists() {
            let data = std::fs::read(&store_path)?;
            serde_json::from_slice(&data)?
        } else {
            StoreDocument::default()
        };
        Ok(Self {
            store_path,
            quarantine_path: quarantine_path.into(),
            roast_history_path: roast_history_path.into(),
            config,
            document: RwLock::new(document),
            stats: GateStats::default(),
            batching: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn begin_batch(&self) {
        self.batching.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// Flush the current in-memory document to disk and end the batch span.
    pub fn end_batch(&self) -> Result<()> {
        self.batching.store(false, std::sync::atomic::Ordering::Relaxed);
        self.persist()
    }

    fn is_batching(&self) -> bool {
        self.batching.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// The single entry point for every insight write (spec.md §4.4, I1).
    /// Always returns successfully: there is no code path that silently
    /// drops a candidate. Noise is filtered pre-scoring; scoring exceptions
    /// fail open into quarantine-plus-store.
    pub fn validate_and_store(&self, candidate: InsightCandidate) -> Result<WriteOutcome> {
        if meta_ralph::is_noise(&candidate.text) {
            self.stats.record_noise_filtered();
            debug!(target: "spark_core::insight_store", key = %candidate.key, "noise filtered");
            return Ok(WriteOutcome::FilteredAsNoise);
        }

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            #[cfg(test)]
            if candidate.text == FORCE_SCORING_PANIC_FOR_TEST {
                panic!("forced Meta-Ralph scoring panic (test-only injection)");
            }
            let existing_texts: Vec<String> = {
                let doc = self.document.read().expect("store lock poisoned");
                doc.insights.values().map(|i| i.text.clone()).collect()
            };
            let refs: Vec<&str> = existing_texts.iter().map(String::as_str).collect();
            let scores = meta_ralph::score_candidate(&candidate, &refs);
            meta_ralph::decide(&scores, &self.config)
        }));

        let decision = match outcome {
            Ok(decision) => decision,
            Err(_) => {
                warn!(
                    target: "spark_core::insight_store",
                    key = %candidate.key,
                    "Meta-Ralph scoring raised; fail-open quarantine"
                );
                self.quarantine_and_store(&candidate, "scoring_exception")?;
                return Ok(WriteOutcome::QuarantinedOnException);
            }
        };

        self.stats.record(decision);
        match decision {
            GateDecision::Primitive => {
                self.append_roast(&candidate, "primitive")?;
            }
            GateDecision::NeedsWork => {
                self.upsert(candidate, decision, true)?;
            }
            GateDecision::Quality => {
                self.upsert(candidate, decision, false)?;
            }
        }
        Ok(WriteOutcome::Stored(decision))
    }

    fn upsert(
        &self,
        candidate: InsightCandidate,
        decision: GateDecision,
        needs_refinement: bool,
    ) -> Result<()> {
        let refs: Vec<String> = {
            let doc = self.document.read().expect("store lock poisoned");
            doc.insights.values().map(|i| i.text.clone()).collect()
        };
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        let scores = meta_ralph::score_candidate(&candidate, &refs);

        let mut doc = self.document.write().expect("store lock poisoned");
        match doc.insights.get_mut(&candidate.key) {
            Some(existing) => {
                existing.reinforce(candidate.confidence, candidate.evidence);
                existing.needs_refinement = needs_refinement;
            }
            None => {
                let mut insight = Insight::from_candidate(candidate, scores);
                insight.needs_refinement = needs_refinement;
                doc.insights.insert(insight.key.clone(), insight);
            }
        }
        drop(doc);
        let _ = decision;
        if !self.is_batching() {
            self.persist()?;
        }
        Ok(())
    }

    fn quarantine_and_store(&self, candidate: &InsightCandidate, reason: &str) -> Result<()> {
        append_jsonl(
            &self.quarantine_path,
            &QuarantineRow {
                ts: Utc::now(),
                key: candidate.key.clone(),
                text: candidate.text.clone(),
                reason: reason.into(),
            },
        )?;
        let scores = Default::default();
        let mut doc = self.document.write().expect("store lock poisoned");
        let mut insight = Insight::from_candidate(candidate.clone(), scores);
        insight.quarantined = true;
        doc.insights.insert(insight.key.clone(), insight);
        drop(doc);
        if !self.is_batching() {
            self.persist()?;
        }
        Ok(())
    }

    fn append_roast(&self, candidate: &InsightCandidate, reason: &str) -> Result<()> {
        append_jsonl(
            &self.roast_history_path,
            &QuarantineRow {
                ts: Utc::now(),
                key: candidate.key.clone(),
                text: candidate.text.clone(),
                reason: reason.into(),
            },
        )
    }

    fn persist(&self) -> Result<()> {
        let doc = self.document.read().expect("store lock poisoned");
        let parent = self.store_path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut tmp, &*doc)?;
        use std::io::Write;
        tmp.flush()?;
        tmp.persist(&self.store_path)
            .map_err(|e| crate::error::Error::transient_io(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Insight> {
        self.document.read().expect("store lock poisoned").insights.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.document.read().expect("store lock poisoned").insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all insights, for the retrieval layer (C5). Cloned out
    /// under a short read lock, matching the concurrency contract in
    /// spec.md §5 ("advisory engine takes a short read lock ... releases
    /// before synthesis").
    pub fn snapshot(&self) -> Vec<Insight> {
        self.document
            .read()
            .expect("store lock poisoned")
            .insights
            .values()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> (u64, u64, u64, u64) {
        self.stats.snapshot()
    }

    /// Keys currently flagged `needs_refinement`, for the bridge cycle's
    /// validation loop (spec.md §4.3 step 5) to re-check against freshly
    /// accumulated outcome links.
    pub fn needs_refinement_keys(&self) -> Vec<String> {
        self.document
            .read()
            .expect("store lock poisoned")
            .insights
            .values()
            .filter(|i| i.needs_refinement)
            .map(|i| i.key.clone())
            .collect()
    }

    /// Overwrite an insight's outcome-derived reliability (spec.md §4.7
    /// step 4). Clears `needs_refinement` once reliability crosses the
    /// validated threshold the tracker uses. A no-op if the key is absent
    /// (e.g. the insight was deleted between selection and update).
    pub fn update_reliability(&self, key: &str, reliability: f64) -> Result<()> {
        let changed = {
            let mut doc = self.document.write().expect("store lock poisoned");
            match doc.insights.get_mut(key) {
                Some(insight) => {
                    insight.reliability = reliability.clamp(0.0, 1.0);
                    if insight.reliability >= 0.7 {
                        insight.needs_refinement = false;
                    }
                    insight.updated_at = Utc::now();
                    true
                }
                None => false,
            }
        };
        if changed && !self.is_batching() {
            self.persist()?;
        }
        Ok(())
    }
}

fn append_jsonl<T: Serialize>(path: &Path, row: &T) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_vec(row)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}
