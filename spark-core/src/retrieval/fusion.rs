//! Fusion (spec.md §4.5 step 3): Reciprocal Rank Fusion of the lexical and
//! semantic candidate lists, plus small additive weights (intent coverage,
//! reliability, support boost). Source boosts are applied by the caller
//! after fusion since they depend on tuneables, not the fusion math itself.

use std::collections::HashMap;

use crate::advisory::context::tokenize;

use super::semantic::SemanticHit;
use super::{AdviceSource, Candidate};

/// RRF's conventional rank-damping constant.
const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub reliability_weight: f64,
    pub support_boost_weight: f64,
    pub intent_coverage_weight: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            reliability_weight: 0.15,
            support_boost_weight: 0.1,
            intent_coverage_weight: 0.1,
        }
    }
}

fn identity(candidate: &Candidate) -> String {
    candidate
        .key
        .clone()
        .unwrap_or_else(|| candidate.text.clone())
}

fn intent_coverage(text: &str, query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens: std::collections::HashSet<String> = tokenize(text).into_iter().collect();
    let hits = query_tokens.iter().filter(|t| text_tokens.contains(*t)).count();
    hits as f64 / query_tokens.len() as f64
}

/// Merge a ranked lexical list and a ranked semantic list via RRF, then add
/// the intent-coverage and reliability terms. Items appearing in both lists
/// accumulate rank contributions from each (the "support boost": a
/// candidate surfaced by multiple facets ranks higher).
pub fn fuse(
    mut lexical: Vec<Candidate>,
    semantic: Vec<SemanticHit>,
    query_tokens: &[String],
    weights: FusionWeights,
) -> Vec<Candidate> {
    lexical.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut rrf_scores: HashMap<String, f64> = HashMap::new();
    let mut support: HashMap<String, u32> = HashMap::new();
    for (rank, candidate) in lexical.iter().enumerate() {
        let id = identity(candidate);
        *rrf_scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
        *support.entry(id).or_insert(0) += 1;
    }

    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    for candidate in lexical {
        by_id.insert(identity(&candidate), candidate);
    }

    let mut ranked_semantic = semantic;
    ranked_semantic.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    for (rank, hit) in ranked_semantic.iter().enumerate() {
        let id = hit.id.clone();
        *rrf_scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
        *support.entry(id.clone()).or_insert(0) += 1;
        by_id.entry(id).or_insert_with(|| Candidate {
            source: AdviceSource::Semantic,
            key: Some(hit.id.clone()),
            text: hit.text.clone(),
            score: 0.0,
            rationale: "semantic match".into(),
            reliability: 0.5,
        });
    }

    let mut out = Vec::with_capacity(by_id.len());
    for (id, mut candidate) in by_id {
        let rrf = *rrf_scores.get(&id).unwrap_or(&0.0);
        let coverage = intent_coverage(&candidate.text, query_tokens);
        let support_count = *support.get(&id).unwrap_or(&1) as f64;
        let support_boost = if support_count > 1.0 {
            weights.support_boost_weight
        } else {
            0.0
        };
        candidate.score = rrf
            + coverage * weights.intent_coverage_weight
            + candidate.reliability * weights.reliability_weight
            + support_boost;
        out.push(candidate);
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, text: &str, score: f64, reliability: f64) -> Candidate {
        Candidate {
            source: AdviceSource::Cognitive,
            key: Some(key.into()),
            text: text.into(),
            score,
            rationale: "test".into(),
            reliability,
        }
    }

    #[test]
    fn item_in_both_lists_outranks_lexical_only() {
        let lexical = vec![
            candidate("a", "always run pytest before commit", 5.0, 0.5),
            candidate("b", "prefer tabs", 4.0, 0.5),
        ];
        let semantic = vec![SemanticHit {
            id: "b".into(),
            text: "prefer tabs".into(),
            similarity: 0.9,
        }];
        let fused = fuse(lexical, semantic, &[], FusionWeights::default());
        let b_rank = fused.iter().position(|c| c.key.as_deref() == Some("b")).unwrap();
        let a_rank = fused.iter().position(|c| c.key.as_deref() == Some("a")).unwrap();
        assert!(b_rank < a_rank);
    }

    #[test]
    fn reliability_breaks_ties() {
        let lexical = vec![
            candidate("low", "run tests before commit", 1.0, 0.1),
            candidate("high", "run tests before commit", 1.0, 0.9),
        ];
        let fused = fuse(lexical, vec![], &[], FusionWeights::default());
        assert_eq!(fused[0].key.as_deref(), Some("high"));
    }

    #[test]
    fn semantic_only_hit_is_tagged_semantic_source() {
        let semantic = vec![SemanticHit {
            id: "x".into(),
            text: "some semantic match".into(),
            similarity: 0.8,
        }];
        let fused = fuse(vec![], semantic, &[], FusionWeights::default());
        assert_eq!(fused[0].source, AdviceSource::Semantic);
    }
}
