//! The bridge cycle (spec.md §4.3, C3): the periodic worker that folds
//! newly-queued events into every learner, reports outcomes, processes
//! chips, and syncs rendered context out to the enabled frontend adapters.
//!
//! Mirrors `examples/original_source/lib/bridge_cycle.py`'s
//! `run_bridge_cycle`: an ordered sequence of steps, each wrapped so one
//! step's failure is recorded in `errors` and never stops the rest from
//! running (spec.md I5 "one step's exception never aborts the cycle").
//! Unlike the original, which re-reads the last N events from a rotating
//! log on every call, this cycle advances a durable cursor over the
//! append-only event queue and processes only what's new since the last
//! run — the natural shape once ingestion is a queue with offsets instead
//! of a bounded ring buffer.

pub mod content_learner;
pub mod memory_capture;
pub mod patterns;
pub mod prediction;
pub mod taste;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::adapters::claude_code::ClaudeCodeAdapter;
use crate::adapters::cursor::CursorAdapter;
use crate::adapters::openclaw::{OpenClawAdapter, SessionStats};
use crate::adapters::FrontendAdapter;
use crate::chips::{ChipObserver, ChipRegistry};
use crate::config::{ChipMergeTuneables, Tuneables};
use crate::distillation::{DistillationStore, DistillationType};
use crate::error::{Error, Result};
use crate::event::{EventKind, QueuedEvent};
use crate::heartbeat::{write_heartbeat, Heartbeat};
use crate::insight::InsightCandidate;
use crate::insight_store::InsightStore;
use crate::outcome::linker::RecentInsight;
use crate::outcome::{signals, EffectivenessTracker, OutcomeLinker, OutcomeTracker};
use crate::queue::EventQueue;
use crate::state_dir::StateDir;

use content_learner::ContentLearner;
use patterns::PatternTracker;
use prediction::OutcomePredictor;
use taste::TasteBank;

/// Turn free text into a short, stable, lowercased key fragment: strip
/// punctuation, keep the first handful of words. Shared by every learner
/// that needs a namespaced insight key derived from arbitrary text rather
/// than a fixed identifier.
pub(crate) fn slug_key(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .take(8)
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// How many newly-queued events one bridge cycle will fold in. A cap keeps
/// a cold-start catch-up (or a burst of ingestion) from turning one cycle
/// into an unbounded amount of work; anything left over is picked up by
/// the next cycle since the cursor only advances past what was processed.
const MAX_EVENTS_PER_CYCLE: usize = 2000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChipStats {
    pub processed: u64,
    pub matched: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChipMergeStats {
    pub processed: u64,
    pub merged: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub adapters_written: u64,
}

/// Everything one `BridgeCycle::run` call did, mirroring the original's
/// `stats` dict shape closely enough that an operator familiar with one
/// recognizes the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeStats {
    pub events_processed: u64,
    pub memory: u64,
    pub taste: u64,
    pub pattern_processed: u64,
    pub content_learned: u64,
    pub validation: u64,
    pub prediction: u64,
    pub outcomes_reported: u64,
    pub distillations: u64,
    pub chips: ChipStats,
    pub chip_merge: ChipMergeStats,
    pub sync: SyncStats,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl BridgeStats {
    fn record_error(&mut self, step: &str, err: impl std::fmt::Display) {
        let msg = format!("{step}: {err}");
        warn!("bridge cycle step failed: {msg}");
        self.errors.push(msg);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BridgeCursor {
    offset: u64,
}

fn load_cursor(path: &Path) -> Result<BridgeCursor> {
    if !path.exists() {
        return Ok(BridgeCursor { offset: 0 });
    }
    let data = std::fs::read(path).map_err(Error::from)?;
    if data.is_empty() {
        return Ok(BridgeCursor { offset: 0 });
    }
    serde_json::from_slice(&data).map_err(Error::from)
}

fn write_cursor(path: &Path, cursor: BridgeCursor) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer(&mut tmp, &cursor)?;
    std::io::Write::flush(&mut tmp)?;
    tmp.persist(path).map_err(|e| Error::transient_io(e.to_string()))?;
    Ok(())
}

/// Owns every piece of bridge-cycle state: the cursor into the event
/// queue, and each learner/tracker's own small store. All of it lives
/// under one `StateDir`, opened once at daemon startup and reused across
/// every cycle.
pub struct BridgeCycle {
    state: StateDir,
    queue: Arc<EventQueue>,
    insight_store: Arc<InsightStore>,
    taste_bank: TasteBank,
    sequence_tracker: PatternTracker,
    content_learner: ContentLearner,
    outcome_predictor: OutcomePredictor,
    outcome_linker: OutcomeLinker,
    outcome_tracker: OutcomeTracker,
    effectiveness: EffectivenessTracker,
    chip_registry: ChipRegistry,
    distillations: Arc<DistillationStore>,
}

impl BridgeCycle {
    /// `insight_store` and `distillations` are shared with the ingest hot
    /// path (`sparkd`'s advisory engine reads both), so both are handed in
    /// as `Arc`s already opened by the caller rather than opened twice
    /// against the same path with two diverging in-memory documents.
    pub fn open(
        state: StateDir,
        queue: Arc<EventQueue>,
        insight_store: Arc<InsightStore>,
        distillations: Arc<DistillationStore>,
    ) -> Result<Self> {
        Ok(Self {
            taste_bank: TasteBank::open(state.tastebank()),
            sequence_tracker: PatternTracker::open(state.tool_sequence_seen())?,
            content_learner: ContentLearner::open(state.content_pattern_seen())?,
            outcome_predictor: OutcomePredictor::open(state.outcome_predictor())?,
            outcome_linker: OutcomeLinker::open(state.outcome_links()),
            outcome_tracker: OutcomeTracker::open(state.outcome_tracker())?,
            effectiveness: EffectivenessTracker::open(state.advisor_effectiveness())?,
            chip_registry: ChipRegistry::new(),
            distillations,
            state,
            queue,
            insight_store,
        })
    }

    pub fn effectiveness(&self) -> &EffectivenessTracker {
        &self.effectiveness
    }

    pub fn outcome_tracker(&self) -> &OutcomeTracker {
        &self.outcome_tracker
    }

    /// Run one full cycle: read new events since the cursor, fold them
    /// through every step in order, sync rendered context, advance the
    /// cursor, and write a heartbeat. Never returns an error for a step
    /// failure — only for the cursor/queue I/O a cycle cannot proceed
    /// without.
    pub fn run(&mut self, tuneables: &Tuneables) -> BridgeStats {
        let mut stats = BridgeStats::default();
        let cursor = match load_cursor(&self.state.bridge_cursor()) {
            Ok(c) => c,
            Err(e) => {
                stats.record_error("cursor", e);
                self.write_heartbeat(&stats);
                return stats;
            }
        };

        let (events, next_offset) = match self.queue.read_from(cursor.offset, MAX_EVENTS_PER_CYCLE) {
            Ok(v) => v,
            Err(e) => {
                stats.record_error("read_from", e);
                self.write_heartbeat(&stats);
                return stats;
            }
        };
        stats.events_processed = events.len() as u64;

        self.insight_store.begin_batch();

        self.step_memory_capture(&events, &mut stats);
        self.step_taste(&events, &mut stats);
        self.step_pattern_detection(&events, &mut stats);
        self.step_validation(&events, &mut stats);
        self.step_prediction(&events, &mut stats);
        self.step_content_learning(&events, &mut stats);
        self.step_outcome_reporting(&events, &mut stats);
        let project_root = self.step_chips(&events, tuneables, &mut stats);
        self.step_distillations(&mut stats);

        if let Err(e) = self.insight_store.end_batch() {
            stats.record_error("insight_store.end_batch", e);
        }

        self.step_sync(project_root.as_deref(), &mut stats);

        if events.len() >= MAX_EVENTS_PER_CYCLE || next_offset > cursor.offset {
            if let Err(e) = write_cursor(&self.state.bridge_cursor(), BridgeCursor { offset: next_offset }) {
                stats.record_error("write_cursor", e);
            }
        }

        self.write_heartbeat(&stats);
        stats
    }

    fn write_heartbeat(&self, stats: &BridgeStats) {
        let heartbeat = if stats.errors.is_empty() {
            Heartbeat::healthy()
        } else {
            Heartbeat::degraded(stats.errors.clone())
        };
        if let Err(e) = write_heartbeat(self.state.bridge_worker_heartbeat(), &heartbeat) {
            warn!("failed to write bridge worker heartbeat: {e}");
        }
    }

    fn store(&self, candidate: InsightCandidate) -> Result<bool> {
        use crate::insight_store::WriteOutcome;
        match self.insight_store.validate_and_store(candidate)? {
            WriteOutcome::Stored(_) => Ok(true),
            WriteOutcome::FilteredAsNoise | WriteOutcome::QuarantinedOnException => Ok(false),
        }
    }

    /// Step 1 (spec.md §4.3 step 2): explicit `REMEMBER:`/`DECISION:`/...
    /// markers in user prompts, bypassing implicit learners.
    fn step_memory_capture(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        for qe in events {
            for candidate in memory_capture::capture(&qe.event) {
                match self.store(candidate) {
                    Ok(true) => stats.memory += 1,
                    Ok(false) => {}
                    Err(e) => stats.record_error("memory_capture", e),
                }
            }
        }
    }

    /// Step 2 (spec.md §4.3 step 3): the most recent user prompt carrying a
    /// taste statement, first match only — matches the original's
    /// `reversed(events[-10:])` loop that stops at the first hit.
    fn step_taste(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        let user_prompts = events
            .iter()
            .rev()
            .filter(|qe| qe.event.kind == EventKind::UserPrompt)
            .take(10);
        for qe in user_prompts {
            let Some(text) = qe.event.user_prompt_text() else { continue };
            let Some(item) = taste::parse(text) else { continue };
            if let Err(e) = self.taste_bank.add(&item) {
                stats.record_error("taste_bank", e);
                continue;
            }
            let candidate = taste::to_candidate(&item, qe.event.trace_id.clone());
            match self.store(candidate) {
                Ok(true) => stats.taste += 1,
                Ok(false) => {}
                Err(e) => stats.record_error("taste", e),
            }
            break;
        }
    }

    /// Step 3 (spec.md §4.3 step 4): promote a two-tool sequence to a
    /// heuristic once it has recurred three times.
    fn step_pattern_detection(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        let tool_names: Vec<&str> = events
            .iter()
            .filter_map(|qe| qe.event.tool_name.as_deref())
            .collect();
        for window in tool_names.windows(2) {
            let (first, second) = (window[0], window[1]);
            if first == second {
                continue;
            }
            let key = format!("sequence:{first}->{second}");
            match self.sequence_tracker.record(&key) {
                Ok(true) => {
                    let candidate = InsightCandidate {
                        key,
                        text: patterns::sequence_statement(first, second),
                        category: crate::insight::InsightCategory::Decision,
                        confidence: 0.6,
                        evidence: vec![crate::insight::Evidence {
                            trace_id: None,
                            note: "tool sequence seen 3+ times".into(),
                            ts: chrono::Utc::now(),
                        }],
                        source_chip: None,
                    };
                    match self.store(candidate) {
                        Ok(true) => stats.pattern_processed += 1,
                        Ok(false) => {}
                        Err(e) => stats.record_error("pattern_detection", e),
                    }
                }
                Ok(false) => {}
                Err(e) => stats.record_error("pattern_detection", e),
            }
        }
    }

    /// Step 4 (spec.md §4.3 step 5, §4.7 C7): detect success/failure
    /// signals in this batch and link them against recently-surfaced
    /// insights, feeding the reliability/validation loop.
    fn step_validation(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        let recent: Vec<RecentInsight> = self
            .insight_store
            .snapshot()
            .into_iter()
            .map(|insight| RecentInsight {
                id: insight.key.clone(),
                content: insight.text.clone(),
                timestamp: insight.updated_at,
                file_path: None,
                chip_id: insight.source_chip.clone(),
            })
            .collect();
        for qe in events {
            let Some(outcome) = signals::detect(&qe.event) else { continue };
            match self.outcome_tracker.process(&outcome, &recent, &self.outcome_linker) {
                Ok(links) => stats.validation += links.len() as u64,
                Err(e) => stats.record_error("validation", e),
            }
        }
    }

    /// Step 5 (spec.md §4.3 step 6): fold post-tool outcomes into the
    /// per-tool failure predictor.
    fn step_prediction(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        match self.outcome_predictor.observe(events) {
            Ok(n) => stats.prediction += n,
            Err(e) => stats.record_error("prediction", e),
        }
    }

    /// Step 6 (spec.md §4.3 step 7): coding-style observations from
    /// edited/written files.
    fn step_content_learning(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        for qe in events {
            let event = &qe.event;
            if event.kind != EventKind::PostTool {
                continue;
            }
            let Some(tool) = &event.tool_name else { continue };
            if tool != "Edit" && tool != "Write" {
                continue;
            }
            let Some((file_path, content)) = extract_edit(event) else { continue };
            match self.content_learner.learn_from_edit(&file_path, &content) {
                Ok(candidates) => {
                    for candidate in candidates {
                        match self.store(candidate) {
                            Ok(true) => stats.content_learned += 1,
                            Ok(false) => {}
                            Err(e) => stats.record_error("content_learning", e),
                        }
                    }
                }
                Err(e) => stats.record_error("content_learning", e),
            }
        }
    }

    /// Step 7 (spec.md §4.3 step 8, §4.7 step 4-5): correlate a tool outcome
    /// back to the advice that preceded it under the same trace id, feeding
    /// both the auto-tuner's source-effectiveness counters (bucketed under
    /// the ledger row's real `source` tag, not a hardcoded one) and nudging
    /// the reliability of every insight that advice drew on, per the
    /// `step_validation` (step 4) reliability this same cycle just computed.
    fn step_outcome_reporting(&self, events: &[QueuedEvent], stats: &mut BridgeStats) {
        use crate::retrieval::AdviceSource;
        for qe in events {
            let event = &qe.event;
            if !event.kind.is_tool_outcome() {
                continue;
            }
            let Some(trace_id) = &event.trace_id else { continue };
            let Ok(rows) = self.advisory_ledger_rows() else { continue };
            let Some(row) = rows.iter().find(|r| &r.trace_id == trace_id && r.emitted) else {
                continue;
            };
            let source = row.source.unwrap_or(AdviceSource::Cognitive);

            if let Err(e) = self.effectiveness.record_given(source) {
                stats.record_error("outcome_reporting", e);
                continue;
            }
            if let Err(e) = self.effectiveness.record_followed(source) {
                stats.record_error("outcome_reporting", e);
                continue;
            }
            if event.kind == EventKind::PostTool {
                if let Err(e) = self.effectiveness.record_helpful(source) {
                    stats.record_error("outcome_reporting", e);
                    continue;
                }
            }

            for key in &row.source_keys {
                let reliability = self.outcome_tracker.get_insight_reliability(key);
                if let Err(e) = self.insight_store.update_reliability(key, reliability) {
                    stats.record_error("outcome_reporting", e);
                }
            }

            stats.outcomes_reported += 1;
        }
    }

    fn advisory_ledger_rows(&self) -> Result<Vec<crate::advisory::ledger::LedgerRow>> {
        crate::advisory::ledger::DecisionLedger::open(self.state.advisory_decision_ledger()).read_all()
    }

    /// Steps 9–10 (spec.md §4.3 steps 9-10): fan chip-relevant events out
    /// to every chip active for the batch's project root, then merge
    /// chip-scoped candidates that clear the merge bar into the global
    /// store. Returns the resolved project root, if any, for the sync
    /// step to reuse.
    fn step_chips(&mut self, events: &[QueuedEvent], tuneables: &Tuneables, stats: &mut BridgeStats) -> Option<String> {
        let project_root = events.iter().find_map(|qe| qe.event.cwd().map(str::to_string));
        let Some(root) = project_root.clone() else {
            return None;
        };

        self.chip_registry = ChipRegistry::new();
        self.chip_registry.load_dir(self.state.chips_dir(), &root);
        if self.chip_registry.is_empty() {
            return project_root;
        }

        let active = self.chip_registry.active_for(Path::new(&root));
        let mut merge_candidates = Vec::new();
        for qe in events {
            stats.chips.processed += 1;
            for chip in &active {
                if let Some(candidate) = ChipObserver::observe(&qe.event, chip) {
                    stats.chips.matched += 1;
                    merge_candidates.push(candidate);
                }
            }
        }

        for candidate in merge_candidates {
            stats.chip_merge.processed += 1;
            if clears_chip_merge_bar(&candidate, &tuneables.chip_merge) {
                match self.store(candidate) {
                    Ok(true) => stats.chip_merge.merged += 1,
                    Ok(false) => {}
                    Err(e) => stats.record_error("chip_merge", e),
                }
            }
        }

        project_root
    }

    /// Promote insights that have been reinforced repeatedly into a
    /// standing distillation (spec.md §3 "Distillation"), independent of
    /// Meta-Ralph since the insight already cleared the gate once.
    fn step_distillations(&self, stats: &mut BridgeStats) {
        for insight in self.insight_store.snapshot() {
            if insight.reinforced < 3 {
                continue;
            }
            let kind = match insight.category {
                crate::insight::InsightCategory::Principle => DistillationType::Principle,
                crate::insight::InsightCategory::Decision => DistillationType::Heuristic,
                _ => continue,
            };
            match self.distillations.upsert_by_statement(kind, &insight.text) {
                Ok(_) => stats.distillations += 1,
                Err(e) => stats.record_error("distillations", e),
            }
        }
    }

    /// Step 11 (spec.md §4.3 step 1/11): render current top insights into
    /// every enabled frontend adapter's marker-bounded section.
    fn step_sync(&self, project_root: Option<&str>, stats: &mut BridgeStats) {
        let mut ranked = self.insight_store.snapshot();
        ranked.sort_by(|a, b| {
            (b.confidence * b.reliability)
                .partial_cmp(&(a.confidence * a.reliability))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(10);
        if ranked.is_empty() {
            return;
        }
        let content = ranked
            .iter()
            .map(|i| format!("- {}", i.text))
            .collect::<Vec<_>>()
            .join("\n");

        if let Some(root) = project_root {
            let project_dir = PathBuf::from(root);
            let claude = ClaudeCodeAdapter::new(&project_dir);
            match claude.write(&content) {
                Ok(true) => stats.sync.adapters_written += 1,
                Ok(false) => {}
                Err(e) => stats.record_error("sync:claude_code", e),
            }
            let cursor_adapter = CursorAdapter::new(&project_dir);
            match cursor_adapter.write(&content) {
                Ok(true) => stats.sync.adapters_written += 1,
                Ok(false) => {}
                Err(e) => stats.record_error("sync:cursor", e),
            }
        }

        let openclaw = OpenClawAdapter::new();
        let session_stats = SessionStats {
            events_processed: Some(ranked.len() as u64),
            insights_count: Some(self.insight_store.len() as u64),
            last_sync: Some(chrono::Utc::now().to_rfc3339()),
        };
        match openclaw.write_with_stats(&content, &session_stats) {
            Ok(true) => stats.sync.adapters_written += 1,
            Ok(false) => {}
            Err(e) => stats.record_error("sync:openclaw", e),
        }
    }
}

fn clears_chip_merge_bar(candidate: &InsightCandidate, tuneables: &ChipMergeTuneables) -> bool {
    // Actionability/transferability aren't scored by a dedicated model here;
    // reuse Meta-Ralph's cheap heuristics as proxies, matching the merge
    // bar's own conservative defaults rather than inventing a new scorer.
    let scores = crate::meta_ralph::score_candidate(candidate, &[]);
    let actionability = scores.actionability as f64 / 2.0;
    let transferability = if candidate.source_chip.is_some() { 0.5 } else { 0.3 };
    ChipObserver::clears_merge_bar(candidate, actionability, transferability, tuneables)
}

/// Pull `(file_path, content)` out of a `post_tool` Edit/Write event. The
/// exact tool_input shape varies by adapter, so this checks the common
/// field names rather than assuming one schema.
fn extract_edit(event: &crate::event::Event) -> Option<(String, String)> {
    let input = event.tool_input.as_ref()?.as_object()?;
    let file_path = input
        .get("file_path")
        .or_else(|| input.get("path"))
        .and_then(|v| v.as_str())?
        .to_string();
    let content = input
        .get("content")
        .or_else(|| input.get("new_string"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| event.payload.get("content").and_then(|v| v.as_str()).map(str::to_string))?;
    Some((file_path, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn state() -> StateDir {
        let dir = tempdir().unwrap();
        StateDir::open(dir.path().to_path_buf()).unwrap()
    }

    fn cycle(state: &StateDir) -> BridgeCycle {
        let queue = Arc::new(EventQueue::open(state.events_queue()).unwrap());
        let insight_store = Arc::new(
            InsightStore::open(
                state.cognitive_insights(),
                state.insight_quarantine(),
                state.roast_history(),
                Default::default(),
            )
            .unwrap(),
        );
        let distillations = Arc::new(DistillationStore::open(state.distillations()).unwrap());
        BridgeCycle::open(state.clone(), queue, insight_store, distillations).unwrap()
    }

    fn user_prompt_event(text: &str) -> Event {
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
    fn slug_key_is_short_lowercase_and_stable() {
        assert_eq!(slug_key("Always Use Snake_Case!"), "always_use_snake_case");
        assert_eq!(slug_key("Always Use Snake_Case!"), slug_key("always use snake case"));
    }

    #[test]
    fn cycle_promotes_remember_marker_to_an_insight() {
        let state = state();
        let mut bridge = cycle(&state);
        bridge
            .queue
            .append(&user_prompt_event("REMEMBER: vendor the lockfile"))
            .unwrap();
        let tuneables = Tuneables::default();
        let stats = bridge.run(&tuneables);
        assert_eq!(stats.memory, 1);
        assert!(stats.errors.is_empty());
        assert_eq!(bridge.insight_store.len(), 1);
    }

    #[test]
    fn cursor_advances_so_a_second_run_sees_nothing_new() {
        let state = state();
        let mut bridge = cycle(&state);
        bridge
            .queue
            .append(&user_prompt_event("REMEMBER: vendor the lockfile"))
            .unwrap();
        let tuneables = Tuneables::default();
        let first = bridge.run(&tuneables);
        assert_eq!(first.events_processed, 1);
        let second = bridge.run(&tuneables);
        assert_eq!(second.events_processed, 0);
        assert_eq!(second.memory, 0);
    }

    #[test]
    fn tool_sequence_promotes_on_third_occurrence() {
        let state = state();
        let mut bridge = cycle(&state);
        let tool_event = |tool: &str| Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::PreTool,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t1".into()),
            tool_name: Some(tool.into()),
            tool_input: None,
            payload: json!({}),
            extra: Default::default(),
        };
        let tuneables = Tuneables::default();
        for _ in 0..3 {
            bridge.queue.append(&tool_event("Edit")).unwrap();
            bridge.queue.append(&tool_event("Bash")).unwrap();
        }
        let stats = bridge.run(&tuneables);
        assert!(stats.pattern_processed >= 1);
    }

    #[test]
    fn outcome_reporting_raises_insight_reliability_and_source_effectiveness() {
        use crate::advisory::ledger::{DecisionLedger, LedgerRow};
        use crate::insight::InsightCategory;
        use crate::retrieval::AdviceSource;

        let state = state();
        let mut bridge = cycle(&state);

        bridge
            .insight_store
            .validate_and_store(InsightCandidate {
                key: "preference:retry_jitter".into(),
                text: "always retry with jitter because it avoids thundering herds".into(),
                category: InsightCategory::Preference,
                confidence: 0.8,
                evidence: vec![],
                source_chip: None,
            })
            .unwrap();
        assert_eq!(
            bridge.insight_store.get("preference:retry_jitter").unwrap().reliability,
            0.5
        );

        let ledger = DecisionLedger::open(state.advisory_decision_ledger());
        ledger
            .append(&LedgerRow {
                ts: Utc::now(),
                trace_id: "t3".into(),
                session_id: "s1".into(),
                tool: "Bash".into(),
                phase: "implementation".into(),
                intent_family: "generic:bash".into(),
                emitted: true,
                authority: Some(0.7),
                category: Some("whisper".into()),
                suppress_reason: None,
                source: Some(AdviceSource::Cognitive),
                source_keys: vec!["preference:retry_jitter".into()],
            })
            .unwrap();

        let post_tool_event = |n: u32| Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::PostTool,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t3".into()),
            tool_name: Some("Bash".into()),
            tool_input: None,
            payload: json!({"output": format!("tests passed on run {n}")}),
            extra: Default::default(),
        };
        for n in 0..3 {
            bridge.queue.append(&post_tool_event(n)).unwrap();
        }

        let stats = bridge.run(&Tuneables::default());
        assert!(stats.errors.is_empty());
        assert_eq!(stats.outcomes_reported, 3);

        let insight = bridge.insight_store.get("preference:retry_jitter").unwrap();
        assert!(insight.reliability > 0.5);
        assert!(insight.reliability <= 1.0);

        assert!(bridge.effectiveness().source_boost(AdviceSource::Cognitive) > 1.0);
    }

    #[test]
    fn content_learning_ignores_short_edits() {
        let state = state();
        let mut bridge = cycle(&state);
        let edit_event = Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::PostTool,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t1".into()),
            tool_name: Some("Edit".into()),
            tool_input: Some(json!({"file_path": "app.py", "content": "x = 1"})),
            payload: json!({}),
            extra: Default::default(),
        };
        bridge.queue.append(&edit_event).unwrap();
        let stats = bridge.run(&Tuneables::default());
        assert_eq!(stats.content_learned, 0);
    }
}
