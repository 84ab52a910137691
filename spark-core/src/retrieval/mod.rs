//! The retrieval layer (spec.md §4.5, C5): hybrid lexical + semantic + chip
//! retrieval over insights and distillations, producing ranked candidates
//! for an advisory query.

pub mod bm25;
pub mod domain;
pub mod fusion;
pub mod mind;
pub mod semantic;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::advisory::context::AdvisoryContext;
use crate::config::{RetrievalTuneables, SemanticTuneables};
use crate::distillation::Distillation;
use crate::insight::Insight;

pub use bm25::Bm25Index;
pub use domain::DomainProfile;
pub use fusion::{fuse, FusionWeights};
pub use mind::{MindClient, MindHit, NullMind};
pub use semantic::{FlatIndex, NullIndex, SemanticHit, SemanticIndex};

/// Where a retrieved (or emitted) advice item came from (spec.md §3 "Advice
/// item", GLOSSARY). All downstream code switches on this enum rather than
/// duck-typing candidate shapes (§9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    Cognitive,
    Eidos,
    Mind,
    Chip,
    Baseline,
    Semantic,
    Packet,
}

impl AdviceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceSource::Cognitive => "cognitive",
            AdviceSource::Eidos => "eidos",
            AdviceSource::Mind => "mind",
            AdviceSource::Chip => "chip",
            AdviceSource::Baseline => "baseline",
            AdviceSource::Semantic => "semantic",
            AdviceSource::Packet => "packet",
        }
    }
}

/// A deterministic, low-latency safety-net item keyed by (tool, phase)
/// (spec.md §4.5 "Baseline advice").
#[derive(Debug, Clone)]
pub struct BaselineAdvice {
    pub tool: String,
    pub phase: Option<crate::advisory::context::Phase>,
    pub text: String,
}

/// One ranked candidate surfaced by the retriever.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: AdviceSource,
    pub key: Option<String>,
    pub text: String,
    pub score: f64,
    pub rationale: String,
    pub reliability: f64,
}

/// Read-only views over the stores the retriever fuses across. Borrowed
/// rather than owned so the advisory hot path can build this from a short
/// read-lock snapshot and release it before synthesis (spec.md §5).
#[derive(Clone, Copy)]
pub struct RetrievalSources<'a> {
    pub insights: &'a [Insight],
    pub distillations: &'a [Distillation],
    pub chip_insights: &'a [Insight],
    pub baseline: &'a [BaselineAdvice],
}

pub struct Retriever {
    pub semantic: Arc<dyn SemanticIndex>,
    pub mind: Arc<dyn MindClient>,
    pub source_boosts: HashMap<AdviceSource, f64>,
    pub retrieval: RetrievalTuneables,
    pub semantic_tuneables: SemanticTuneables,
}

impl Retriever {
    pub fn new(semantic: Arc<dyn SemanticIndex>, mind: Arc<dyn MindClient>) -> Self {
        Self {
            semantic,
            mind,
            source_boosts: HashMap::new(),
            retrieval: RetrievalTuneables::default(),
            semantic_tuneables: SemanticTuneables::default(),
        }
    }

    fn source_boost(&self, source: AdviceSource) -> f64 {
        *self.source_boosts.get(&source).unwrap_or(&1.0)
    }

    /// Run the full pipeline: lexical candidate set, semantic candidate set
    /// (if enabled and non-empty), fusion, strict filter, domain profile
    /// override, truncate to `limit`.
    pub async fn retrieve(
        &self,
        ctx: &AdvisoryContext,
        sources: RetrievalSources<'_>,
        limit: usize,
    ) -> Vec<Candidate> {
        let query_tokens = ctx.query_tokens();
        let profile = domain::resolve_profile(&self.retrieval, &ctx.intent_family);

        let mut lexical = bm25::score_insights(&query_tokens, sources.insights, AdviceSource::Cognitive);
        lexical.extend(bm25::score_insights(
            &query_tokens,
            sources.chip_insights,
            AdviceSource::Chip,
        ));
        lexical.extend(bm25::score_distillations(&query_tokens, sources.distillations));

        let semantic = if self.semantic_tuneables.enabled && !self.semantic.is_empty() {
            self.semantic.search(&ctx.query_tokens().join(" "), limit * 2)
        } else {
            Vec::new()
        };

        let mut fused = fuse(
            lexical,
            semantic,
            &query_tokens,
            FusionWeights {
                reliability_weight: 0.15,
                support_boost_weight: 0.1,
                intent_coverage_weight: 0.1,
            },
        );

        for candidate in &mut fused {
            candidate.score *= self.source_boost(candidate.source);
        }

        if let Some(client) = Some(self.mind.clone()) {
            if client.is_configured() {
                match tokio::time::timeout(
                    std::time::Duration::from_millis(800),
                    client.top_k(&ctx.recent_user_text, 5),
                )
                .await
                {
                    Ok(Ok(hits)) => {
                        for hit in hits {
                            fused.push(Candidate {
                                source: AdviceSource::Mind,
                                key: Some(hit.id),
                                text: hit.text,
                                score: hit.score * self.source_boost(AdviceSource::Mind),
                                rationale: "mind: server-ranked".into(),
                                reliability: 0.5,
                            });
                        }
                    }
                    Ok(Err(e)) => debug!("mind client error: {e}"),
                    Err(_) => debug!("mind client timed out"),
                }
            }
        }

        let min_fused = profile
            .min_fused_score
            .unwrap_or(self.semantic_tuneables.min_fusion_score);
        fused.retain(|c| {
            c.score >= min_fused
                && !crate::meta_ralph::is_noise(&c.text)
                && !(c.reliability < profile.reliability_floor.unwrap_or(0.0))
        });

        if fused.is_empty() && !sources.baseline.is_empty() {
            if let Some(item) = sources
                .baseline
                .iter()
                .find(|b| b.tool.eq_ignore_ascii_case(&ctx.tool) && b.phase == Some(ctx.phase))
                .or_else(|| {
                    sources
                        .baseline
                        .iter()
                        .find(|b| b.tool.eq_ignore_ascii_case(&ctx.tool) && b.phase.is_none())
                })
            {
                fused.push(Candidate {
                    source: AdviceSource::Baseline,
                    key: None,
                    text: item.text.clone(),
                    score: 0.2,
                    rationale: format!("baseline for {}/{}", item.tool, ctx.phase.as_str()),
                    reliability: 0.5,
                });
            }
        }

        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let take = profile.limit.unwrap_or(limit);
        fused.truncate(take);
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use crate::insight::{Insight, InsightCategory, QualityScores};
    use chrono::Utc;
    use serde_json::json;

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

    fn ctx() -> AdvisoryContext {
        let event = Event {
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
        };
        AdvisoryContext::build(&event, &[]).unwrap()
    }

    #[tokio::test]
    async fn retrieve_ranks_lexically_relevant_insight_first() {
        let insights = vec![
            sample_insight("a", "always run pytest before committing because CI mirrors it"),
            sample_insight("b", "prefer tabs over spaces"),
        ];
        let retriever = Retriever::new(Arc::new(NullIndex), Arc::new(NullMind));
        let results = retriever
            .retrieve(
                &ctx(),
                RetrievalSources {
                    insights: &insights,
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &[],
                },
                5,
            )
            .await;
        assert!(!results.is_empty());
        assert_eq!(results[0].key.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn retrieve_falls_back_to_baseline_when_empty() {
        let retriever = Retriever::new(Arc::new(NullIndex), Arc::new(NullMind));
        let baseline = vec![BaselineAdvice {
            tool: "Bash".into(),
            phase: None,
            text: "double check destructive commands".into(),
        }];
        let results = retriever
            .retrieve(
                &ctx(),
                RetrievalSources {
                    insights: &[],
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &baseline,
                },
                5,
            )
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, AdviceSource::Baseline);
    }

    #[tokio::test]
    async fn source_boost_reweights_candidates() {
        let insights = vec![sample_insight("a", "pytest run before commit because ci")];
        let mut retriever = Retriever::new(Arc::new(NullIndex), Arc::new(NullMind));
        retriever.source_boosts.insert(AdviceSource::Cognitive, 0.8);
        let baseline_score = retriever
            .retrieve(
                &ctx(),
                RetrievalSources {
                    insights: &insights,
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &[],
                },
                5,
            )
            .await;
        retriever.source_boosts.insert(AdviceSource::Cognitive, 1.1);
        let boosted = retriever
            .retrieve(
                &ctx(),
                RetrievalSources {
                    insights: &insights,
                    distillations: &[],
                    chip_insights: &[],
                    baseline: &[],
                },
                5,
            )
            .await;
        assert!(boosted[0].score > baseline_score[0].score);
    }
}
