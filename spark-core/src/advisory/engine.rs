//! The advisory engine (spec.md §4.6, C6): wires context build, the packet
//! cache, retrieval, synthesis, and the gate together behind a hard
//! latency deadline, emitting the error taxonomy callers key alerting and
//! dashboards off (`AE_*` codes on `SuppressReason`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::{AdvisoryEngineTuneables, Tuneables};
use crate::event::Event;
use crate::retrieval::{AdviceSource, Retriever, RetrievalSources};
use crate::state_dir::StateDir;

use super::context::AdvisoryContext;
use super::gate::{AdvisoryGate, GateVerdict};
use super::ledger::{DecisionLedger, LedgerRow};
use super::packet::PacketCache;
use super::synthesis::{AdviceItem, Synthesizer};

/// Why an advisory decision did not result in emitted advice. Mirrors the
/// `AE_*` codes operators see in logs and `/v1/stats`.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppressReason {
    GateSuppressed,
    DuplicateSuppressed,
    LowAuthGlobalSuppressed,
    SynthEmpty,
    NoAdvice,
    FallbackBudget,
    Deadline,
    EngineError(String),
}

impl SuppressReason {
    pub fn code(&self) -> &'static str {
        match self {
            SuppressReason::GateSuppressed => "AE_GATE_SUPPRESSED",
            SuppressReason::DuplicateSuppressed => "AE_DUPLICATE_SUPPRESSED",
            SuppressReason::LowAuthGlobalSuppressed => "AE_LOW_AUTH_GLOBAL_SUPPRESSED",
            SuppressReason::SynthEmpty => "AE_SYNTH_EMPTY",
            SuppressReason::NoAdvice => "AE_NO_ADVICE",
            SuppressReason::FallbackBudget => "AE_FALLBACK_BUDGET",
            SuppressReason::Deadline => "AE_DEADLINE",
            SuppressReason::EngineError(_) => "AE_ENGINE_ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AdvisoryOutcome {
    Emitted {
        trace_id: String,
        text: String,
        category: String,
        authority: f64,
        source: AdviceSource,
    },
    Suppressed {
        trace_id: String,
        reason: SuppressReason,
    },
}

/// One advisory request: a `pre_tool` event, its recent session history
/// (most-recent last), and borrowed read-only snapshots of every store the
/// retriever fuses across.
pub struct AdvisoryRequest<'a> {
    pub event: &'a Event,
    pub recent: &'a [Event],
    pub sources: RetrievalSources<'a>,
}

pub struct AdvisoryEngine {
    pub packets: PacketCache,
    pub retriever: Retriever,
    pub synthesizer: Synthesizer,
    pub gate: AdvisoryGate,
    pub ledger: DecisionLedger,
    pub engine_tuneables: AdvisoryEngineTuneables,
    pub retrieval_limit: usize,
    pub hard_deadline_ms: u64,
}

impl AdvisoryEngine {
    pub fn open(state: &StateDir, retriever: Retriever, synthesizer: Synthesizer) -> crate::error::Result<Self> {
        Ok(Self {
            packets: PacketCache::new(Duration::from_secs(5), 256),
            retriever,
            synthesizer,
            gate: AdvisoryGate::open(state)?,
            ledger: DecisionLedger::open(state.advisory_decision_ledger()),
            engine_tuneables: AdvisoryEngineTuneables::default(),
            retrieval_limit: 5,
            hard_deadline_ms: 1500,
        })
    }

    pub fn apply_tuneables(&mut self, tuneables: &Tuneables) {
        self.engine_tuneables = tuneables.advisory_engine.clone();
        self.gate.gate = tuneables.advisory_gate.clone();
        self.gate.engine = tuneables.advisory_engine.clone();
        self.retriever.retrieval = tuneables.retrieval.clone();
        self.retriever.semantic_tuneables = tuneables.semantic.clone();
        self.synthesizer.tuneables = tuneables.synthesizer.clone();
    }

    /// Run the full pipeline under `hard_deadline_ms`. Always appends a
    /// ledger row, emitted or not, and never panics the caller: any
    /// internal error becomes `SuppressReason::EngineError`.
    pub async fn handle(&self, request: AdvisoryRequest<'_>) -> AdvisoryOutcome {
        let trace_id = request
            .event
            .trace_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let started = Instant::now();
        let hard = Duration::from_millis(self.hard_deadline_ms);

        match tokio::time::timeout(hard, self.run(&request, started)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let outcome = AdvisoryOutcome::Suppressed {
                    trace_id: trace_id.clone(),
                    reason: SuppressReason::Deadline,
                };
                self.append_ledger(&request, &outcome, None);
                outcome
            }
        }
    }

    async fn run(&self, request: &AdvisoryRequest<'_>, started: Instant) -> AdvisoryOutcome {
        let trace_id = request
            .event
            .trace_id
            .clone()
            .unwrap_or_else(|| "unknown".to_string());

        let Some(ctx) = AdvisoryContext::build(request.event, request.recent) else {
            let outcome = AdvisoryOutcome::Suppressed {
                trace_id,
                reason: SuppressReason::EngineError("event is not a valid pre_tool context".into()),
            };
            self.append_ledger(request, &outcome, None);
            return outcome;
        };

        let fingerprint = ctx.fingerprint();
        let candidates = match self.packets.get(&fingerprint) {
            Some(cached) => {
                debug!("packet cache hit for {fingerprint}");
                cached
            }
            None => {
                let fresh = self
                    .retriever
                    .retrieve(&ctx, request.sources.clone(), self.retrieval_limit)
                    .await;
                self.packets.put(fingerprint, fresh.clone());
                fresh
            }
        };

        if candidates.is_empty() {
            let outcome = AdvisoryOutcome::Suppressed {
                trace_id: ctx.trace_id.clone(),
                reason: SuppressReason::NoAdvice,
            };
            self.append_ledger(request, &outcome, None);
            return outcome;
        }

        let top_authority = candidates
            .first()
            .map(|c| c.score.clamp(0.0, 1.0))
            .unwrap_or(0.0);
        let remaining_ms = self
            .hard_deadline_ms
            .saturating_sub(started.elapsed().as_millis() as u64);
        let allow_ai = self
            .synthesizer
            .should_use_ai(&self.engine_tuneables, top_authority, remaining_ms);

        let Some(item) = self.synthesizer.synthesize(&ctx, &candidates, allow_ai).await else {
            let outcome = AdvisoryOutcome::Suppressed {
                trace_id: ctx.trace_id.clone(),
                reason: SuppressReason::SynthEmpty,
            };
            self.append_ledger(request, &outcome, None);
            return outcome;
        };

        if item.text.trim().is_empty() {
            let outcome = AdvisoryOutcome::Suppressed {
                trace_id: ctx.trace_id.clone(),
                reason: SuppressReason::SynthEmpty,
            };
            self.append_ledger(request, &outcome, Some(&item));
            return outcome;
        }

        let verdict = self.gate.decide(&ctx, &item, item.fallback_used, Utc::now());
        let outcome = match verdict {
            GateVerdict::Emit { category } => AdvisoryOutcome::Emitted {
                trace_id: ctx.trace_id.clone(),
                text: item.text.clone(),
                category,
                authority: item.authority,
                source: item.source,
            },
            GateVerdict::Suppress(reason) => AdvisoryOutcome::Suppressed {
                trace_id: ctx.trace_id.clone(),
                reason,
            },
        };
        self.append_ledger_with_ctx(Some(&ctx), &outcome, Some(&item));
        outcome
    }

    fn append_ledger(&self, request: &AdvisoryRequest<'_>, outcome: &AdvisoryOutcome, item: Option<&AdviceItem>) {
        let ctx = AdvisoryContext::build(request.event, request.recent);
        self.append_ledger_with_ctx(ctx.as_ref(), outcome, item);
    }

    fn append_ledger_with_ctx(&self, ctx: Option<&AdvisoryContext>, outcome: &AdvisoryOutcome, item: Option<&AdviceItem>) {
        let (emitted, authority, category, suppress_reason) = match outcome {
            AdvisoryOutcome::Emitted { category, authority, .. } => {
                (true, Some(*authority), Some(category.clone()), None)
            }
            AdvisoryOutcome::Suppressed { reason, .. } => {
                (false, None, None, Some(reason.code().to_string()))
            }
        };
        let trace_id = match outcome {
            AdvisoryOutcome::Emitted { trace_id, .. } | AdvisoryOutcome::Suppressed { trace_id, .. } => {
                trace_id.clone()
            }
        };
        let row = LedgerRow {
            ts: Utc::now(),
            trace_id,
            session_id: ctx.map(|c| c.session_id.clone()).unwrap_or_default(),
            tool: ctx.map(|c| c.tool.clone()).unwrap_or_default(),
            phase: ctx.map(|c| c.phase.as_str().to_string()).unwrap_or_default(),
            intent_family: ctx.map(|c| c.intent_family.clone()).unwrap_or_default(),
            emitted,
            authority,
            category,
            suppress_reason,
            source: item.map(|i| i.source),
            source_keys: item.map(|i| i.source_keys.clone()).unwrap_or_default(),
        };
        if let Err(e) = self.ledger.append(&row) {
            warn!("failed to append decision ledger row: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::context::Phase;
    use crate::advisory::synthesis::NullWriter;
    use crate::event::EventKind;
    use crate::insight::{Insight, InsightCategory, QualityScores};
    use crate::retrieval::{BaselineAdvice, MindClient, NullIndex, NullMind};
    use serde_json::json;

    fn pre_tool_event() -> Event {
        Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::PreTool,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t1".into()),
            tool_name: Some("Bash".into()),
            tool_input: Some(json!({"command": "pytest tests/"})),
            payload: json!({}),
            extra: Default::default(),
        }
    }

    fn sample_insight(key: &str, text: &str) -> Insight {
        Insight {
            key: key.into(),
            text: text.into(),
            category: InsightCategory::Preference,
            confidence: 0.8,
            reliability: 0.7,
            evidence: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            source_chip: None,
            quality_scores: QualityScores::default(),
            reinforced: 0,
            needs_refinement: false,
            quarantined: false,
        }
    }

    fn engine() -> AdvisoryEngine {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::open(dir.path()).unwrap();
        let retriever = Retriever::new(Arc::new(NullIndex), Arc::new(NullMind));
        let synthesizer = Synthesizer::new(Arc::new(NullWriter));
        AdvisoryEngine::open(&state, retriever, synthesizer).unwrap()
    }

    #[tokio::test]
    async fn emits_when_a_relevant_insight_exists() {
        let engine = engine();
        let event = pre_tool_event();
        let insights = vec![sample_insight("a", "always run pytest before committing")];
        let outcome = engine
            .handle(AdvisoryRequest {
                event: &event,
                recent: &[],
                sources: RetrievalSources {
                    insights: &insights,
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &[],
                },
            })
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::Emitted { .. }));
    }

    #[tokio::test]
    async fn suppresses_with_no_advice_when_nothing_retrieved() {
        let engine = engine();
        let event = pre_tool_event();
        let outcome = engine
            .handle(AdvisoryRequest {
                event: &event,
                recent: &[],
                sources: RetrievalSources {
                    insights: &[],
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &[],
                },
            })
            .await;
        assert_eq!(
            outcome_reason(&outcome),
            Some(SuppressReason::NoAdvice)
        );
    }

    #[tokio::test]
    async fn second_identical_request_is_duplicate_suppressed() {
        let engine = engine();
        let event = pre_tool_event();
        let insights = vec![sample_insight("a", "always run pytest before committing")];
        let sources = || RetrievalSources {
            insights: &insights,
            distillations: &[],
            chip_insights: &[],
            baseline: &[],
        };
        let first = engine
            .handle(AdvisoryRequest {
                event: &event,
                recent: &[],
                sources: sources(),
            })
            .await;
        assert!(matches!(first, AdvisoryOutcome::Emitted { .. }));

        let mut second_event = pre_tool_event();
        second_event.trace_id = Some("t2".into());
        let second = engine
            .handle(AdvisoryRequest {
                event: &second_event,
                recent: &[],
                sources: sources(),
            })
            .await;
        assert_eq!(
            outcome_reason(&second),
            Some(SuppressReason::DuplicateSuppressed)
        );
    }

    #[tokio::test]
    async fn falls_back_to_baseline_advice_when_store_is_empty() {
        let engine = engine();
        let event = pre_tool_event();
        let baseline = vec![BaselineAdvice {
            tool: "Bash".into(),
            phase: Some(Phase::Implementation),
            text: "double check destructive commands".into(),
        }];
        let outcome = engine
            .handle(AdvisoryRequest {
                event: &event,
                recent: &[],
                sources: RetrievalSources {
                    insights: &[],
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &baseline,
                },
            })
            .await;
        assert!(matches!(outcome, AdvisoryOutcome::Emitted { .. }));
    }

    fn outcome_reason(outcome: &AdvisoryOutcome) -> Option<SuppressReason> {
        match outcome {
            AdvisoryOutcome::Suppressed { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    #[allow(dead_code)]
    fn assert_mind_client<T: MindClient>() {}
}
