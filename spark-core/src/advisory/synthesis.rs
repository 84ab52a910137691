//! Synthesis (spec.md §4.6 step 4): turn fused retrieval candidates into
//! advice text. Two modes: the default programmatic/templated path (cheap,
//! deterministic, always available) and an optional selective-AI path that
//! delegates to an `AdviceWriter` implementation when authority and time
//! budget both clear configured floors — mirroring the teacher's
//! `LLMClient` trait boundary (`llm/client.rs`) so a real provider can be
//! dropped in without touching the gate or engine.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::warn;

use crate::config::SynthesizerTuneables;
use crate::error::{Error, Result};
use crate::retrieval::{AdviceSource, Candidate};

use super::context::AdvisoryContext;

/// One synthesized advice item, ready for gating.
#[derive(Debug, Clone)]
pub struct AdviceItem {
    pub text: String,
    pub authority: f64,
    /// The winning candidate's source tag (spec.md §3 "Advice item"),
    /// carried through to the decision ledger and the ingest response.
    pub source: AdviceSource,
    pub source_keys: Vec<String>,
    /// True when the selective-AI writer was attempted but its output was
    /// discarded in favor of the programmatic fallback (timeout, error,
    /// panic, or empty text). The gate draws these from the fallback
    /// budget so a flaky AI backend can't quietly degrade every emission.
    pub fallback_used: bool,
}

/// A pluggable text generator for the selective-AI synthesis path. Left
/// unimplemented by default (`NullWriter` always errors) since no concrete
/// provider is in scope here; wiring a real one is an integration concern.
#[async_trait]
pub trait AdviceWriter: Send + Sync {
    async fn write(&self, context: &AdvisoryContext, candidates: &[Candidate]) -> Result<String>;
}

pub struct NullWriter;

#[async_trait]
impl AdviceWriter for NullWriter {
    async fn write(&self, _context: &AdvisoryContext, _candidates: &[Candidate]) -> Result<String> {
        Err(Error::Internal("no advice writer configured".into()))
    }
}

pub struct Synthesizer {
    pub tuneables: SynthesizerTuneables,
    pub writer: Arc<dyn AdviceWriter>,
}

impl Synthesizer {
    pub fn new(writer: Arc<dyn AdviceWriter>) -> Self {
        Self {
            tuneables: SynthesizerTuneables::default(),
            writer: writer.clone(),
        }
    }

    fn programmatic(&self, candidates: &[Candidate]) -> Option<AdviceItem> {
        let top = candidates.first()?;
        let authority = top.score.clamp(0.0, 1.0);
        let source = top.source;
        let text = if candidates.len() == 1 {
            top.text.clone()
        } else {
            let rest: Vec<&str> = candidates.iter().skip(1).take(2).map(|c| c.text.as_str()).collect();
            if rest.is_empty() {
                top.text.clone()
            } else {
                format!("{} (also: {})", top.text, rest.join("; "))
            }
        };
        Some(AdviceItem {
            text,
            authority,
            source,
            source_keys: candidates.iter().filter_map(|c| c.key.clone()).collect(),
            fallback_used: false,
        })
    }

    /// Synthesize an advice item from fused candidates. `remaining_ms` is
    /// the time left under the engine's deadline; `allow_ai` gates whether
    /// the selective-AI path is attempted at all (authority floor, feature
    /// flag, and remaining-budget floor are all checked by the caller via
    /// `should_use_ai`).
    pub async fn synthesize(
        &self,
        context: &AdvisoryContext,
        candidates: &[Candidate],
        allow_ai: bool,
    ) -> Option<AdviceItem> {
        if candidates.is_empty() {
            return None;
        }
        let fallback = self.programmatic(candidates)?;

        if !allow_ai {
            return Some(fallback);
        }

        let timeout = std::time::Duration::from_secs(self.tuneables.ai_timeout_s);
        let writer = self.writer.clone();
        let ctx = context.clone();
        let cands = candidates.to_vec();
        let attempt = async move {
            AssertUnwindSafe(writer.write(&ctx, &cands)).catch_unwind().await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(Ok(text))) if !text.trim().is_empty() => Some(AdviceItem {
                text,
                authority: fallback.authority,
                source: fallback.source,
                source_keys: fallback.source_keys,
                fallback_used: false,
            }),
            Ok(Ok(Ok(_))) => Some(AdviceItem {
                fallback_used: true,
                ..fallback
            }),
            Ok(Ok(Err(e))) => {
                warn!("selective-ai synthesis failed, using programmatic fallback: {e}");
                Some(AdviceItem {
                    fallback_used: true,
                    ..fallback
                })
            }
            Ok(Err(_)) => {
                warn!("selective-ai synthesis panicked, using programmatic fallback");
                Some(AdviceItem {
                    fallback_used: true,
                    ..fallback
                })
            }
            Err(_) => {
                warn!("selective-ai synthesis timed out, using programmatic fallback");
                Some(AdviceItem {
                    fallback_used: true,
                    ..fallback
                })
            }
        }
    }

    /// Whether the selective-AI path should even be attempted, per
    /// spec.md's authority/time-budget floors.
    pub fn should_use_ai(
        &self,
        engine: &crate::config::AdvisoryEngineTuneables,
        authority: f64,
        remaining_ms: u64,
    ) -> bool {
        engine.selective_ai_synth_enabled
            && !engine.force_programmatic_synth
            && authority >= engine.selective_ai_min_authority
            && remaining_ms >= engine.selective_ai_min_remaining_ms
    }
}
