//! Meta-Ralph: the quality gate guarding every insight write (spec.md §4.4).
//! Structured after the teacher's `epistemic::memory_gate` shape
//! (`MemoryGateConfig`/`GateDecision`/`GateStats` with `strict()`/
//! `permissive()` presets for tests), scaled down to the five heuristic
//! dimensions spec.md actually asks for instead of the teacher's
//! KL-divergence epistemic verifier.

use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use std::sync::LazyLock;

use crate::insight::{InsightCandidate, QualityScores};

/// Verdict returned by `MetaRalph::score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Quality,
    NeedsWork,
    Primitive,
}

/// Tuneable thresholds for the gate. Production instances are built from
/// `tuneables.json`; `strict()`/`permissive()` exist only for tests that
/// want a fixed, non-tuneables-backed config.
#[derive(Debug, Clone, Copy)]
pub struct MetaRalphConfig {
    /// Minimum total score (out of 10) to qualify as QUALITY.
    pub quality_threshold: u8,
    /// Minimum total score to avoid outright PRIMITIVE rejection.
    pub needs_work_floor: u8,
}

impl MetaRalphConfig {
    /// Stricter than default: fewer insights slip through as QUALITY.
    pub fn strict() -> Self {
        Self {
            quality_threshold: 7,
            needs_work_floor: 4,
        }
    }

    /// Looser than default: used by tests exercising the learning loop
    /// without wanting every candidate downgraded to NEEDS_WORK.
    pub fn permissive() -> Self {
        Self {
            quality_threshold: 5,
            needs_work_floor: 2,
        }
    }
}

impl Default for MetaRalphConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 6,
            needs_work_floor: 3,
        }
    }
}

/// Regexes for the shared noise filter (spec.md §4.4): purely operational
/// telemetry that should never reach scoring at all.
static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)heavy (bash|tool) usage",
        r"(?i)^(read|edit|write|bash|grep|glob)(\s*(→|->)\s*(read|edit|write|bash|grep|glob))+$",
        r"(?i)^cycle (summary|complete|finished)",
        r"(?i)^\d+ (events|insights) processed",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static noise pattern is valid"))
    .collect()
});

static REASONING_MARKERS: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| vec!["because", "which leads to", "so that", "therefore", "which means"]);

/// Is this candidate text pure operational noise, never worth scoring?
pub fn is_noise(text: &str) -> bool {
    NOISE_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Dimension: does the text read as an actionable instruction rather than a
/// passive observation? Looks for imperative/preference phrasing.
fn score_actionability(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let imperative_hits = ["always", "never", "prefer", "use", "avoid", "don't", "must"]
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    match imperative_hits {
        0 => 0,
        1 => 1,
        _ => 2,
    }
}

/// Dimension: how novel is this relative to texts already in the store?
/// Cheap token-overlap heuristic; a real semantic check lives in retrieval,
/// not here, since the gate must stay fast and allocation-light.
fn score_novelty(text: &str, existing_texts: &[&str]) -> u8 {
    if existing_texts.is_empty() {
        return 2;
    }
    let candidate_tokens: std::collections::HashSet<&str> = text.split_whitespace().collect();
    let max_overlap = existing_texts
        .iter()
        .map(|existing| {
            let existing_tokens: std::collections::HashSet<&str> =
                existing.split_whitespace().collect();
            let intersection = candidate_tokens.intersection(&existing_tokens).count();
            let union = candidate_tokens.union(&existing_tokens).count().max(1);
            intersection as f64 / union as f64
        })
        .fold(0.0_f64, f64::max);
    if max_overlap > 0.7 {
        0
    } else if max_overlap > 0.35 {
        1
    } else {
        2
    }
}

/// Dimension: does the text contain a reasoning connective ("because",
/// "which leads to", ...)?
fn score_reasoning(text: &str) -> u8 {
    let lower = text.to_lowercase();
    let hits = REASONING_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    match hits {
        0 => 0,
        1 => 1,
        _ => 2,
    }
}

/// Dimension: does the text name something concrete (a tool, a value, a
/// file extension) rather than staying generic ("be careful", "do it well")?
fn score_specificity(text: &str) -> u8 {
    let has_quoted_or_coded = text.contains('`') || text.contains('"') || text.contains('\'');
    let has_capitalized_token = text
        .split_whitespace()
        .any(|w| w.len() > 2 && w.chars().next().is_some_and(char::is_uppercase) && w != w.to_uppercase());
    let word_count = text.split_whitespace().count();
    match (has_quoted_or_coded, has_capitalized_token, word_count) {
        (true, _, _) => 2,
        (false, true, _) => 1,
        (false, false, n) if n >= 8 => 1,
        _ => 0,
    }
}

/// Dimension: is this candidate tied to a validated outcome (carries
/// evidence with a trace id)?
fn score_outcome_linked(has_trace_evidence: bool) -> u8 {
    if has_trace_evidence {
        2
    } else {
        0
    }
}

/// Score a candidate against the current store snapshot (existing insight
/// texts, for the novelty dimension). Each dimension is a pure function so
/// the QUALITY/NEEDS_WORK/PRIMITIVE boundaries are independently
/// table-testable.
pub fn score_candidate(candidate: &InsightCandidate, existing_texts: &[&str]) -> QualityScores {
    let has_trace_evidence = candidate.evidence.iter().any(|e| e.trace_id.is_some());
    QualityScores {
        actionability: score_actionability(&candidate.text),
        novelty: score_novelty(&candidate.text, existing_texts),
        reasoning: score_reasoning(&candidate.text),
        specificity: score_specificity(&candidate.text),
        outcome_linked: score_outcome_linked(has_trace_evidence),
    }
}

/// Resolve a verdict from scores and config (spec.md §4.4: "QUALITY (total
/// >= threshold and no dimension = 0), NEEDS_WORK (store-but-flag),
/// PRIMITIVE (reject)").
pub fn decide(scores: &QualityScores, config: &MetaRalphConfig) -> GateDecision {
    let total = scores.total();
    if total >= config.quality_threshold && !scores.has_zero_dimension() {
        GateDecision::Quality
    } else if total >= config.needs_work_floor {
        GateDecision::NeedsWork
    } else {
        GateDecision::Primitive
    }
}

/// Rolling counters for operator diagnostics, mirroring the teacher's
/// `GateStats`.
#[derive(Debug, Default)]
pub struct GateStats {
    quality: AtomicU64,
    needs_work: AtomicU64,
    primitive: AtomicU64,
    noise_filtered: AtomicU64,
}

impl GateStats {
    pub fn record(&self, decision: GateDecision) {
        match decision {
            GateDecision::Quality => self.quality.fetch_add(1, Ordering::Relaxed),
            GateDecision::NeedsWork => self.needs_work.fetch_add(1, Ordering::Relaxed),
            GateDecision::Primitive => self.primitive.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_noise_filtered(&self) {
        self.noise_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.quality.load(Ordering::Relaxed),
            self.needs_work.load(Ordering::Relaxed),
            self.primitive.load(Ordering::Relaxed),
            self.noise_filtered.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insight::{Evidence, InsightCategory};
    use chrono::Utc;

    fn candidate(text: &str, evidence: Vec<Evidence>) -> InsightCandidate {
        InsightCandidate {
            key: "preference:test".into(),
            text: text.into(),
            category: InsightCategory::Preference,
            confidence: 0.7,
            evidence,
            source_chip: None,
        }
    }

    #[test]
    fn noise_patterns_are_detected() {
        assert!(is_noise("Heavy Bash usage"));
        assert!(is_noise("Read → Edit → Write"));
        assert!(!is_noise("always use snake_case for Python function names"));
    }

    #[test]
    fn strong_candidate_scores_quality() {
        let c = candidate(
            "always use `snake_case` for Python function names because it matches PEP 8",
            vec![Evidence {
                trace_id: Some("t1".into()),
                note: "observed".into(),
                ts: Utc::now(),
            }],
        );
        let scores = score_candidate(&c, &[]);
        assert!(!scores.has_zero_dimension());
        assert_eq!(decide(&scores, &MetaRalphConfig::default()), GateDecision::Quality);
    }

    #[test]
    fn vague_candidate_is_primitive() {
        let c = candidate("be careful", vec![]);
        let scores = score_candidate(&c, &[]);
        assert_eq!(decide(&scores, &MetaRalphConfig::default()), GateDecision::Primitive);
    }

    #[test]
    fn zero_dimension_blocks_quality_even_with_high_total() {
        let scores = QualityScores {
            actionability: 2,
            novelty: 2,
            reasoning: 2,
            specificity: 2,
            outcome_linked: 0,
        };
        assert_eq!(scores.total(), 8);
        assert_eq!(decide(&scores, &MetaRalphConfig::default()), GateDecision::NeedsWork);
    }

    #[test]
    fn near_duplicate_scores_low_novelty() {
        let existing = vec!["always use snake_case for python function names"];
        let c = candidate("always use snake_case for python function names please", vec![]);
        let scores = score_candidate(&c, &existing);
        assert_eq!(scores.novelty, 0);
    }

    #[test]
    fn strict_config_is_harder_to_satisfy_than_permissive() {
        let scores = QualityScores {
            actionability: 1,
            novelty: 1,
            reasoning: 1,
            specificity: 1,
            outcome_linked: 1,
        };
        assert_eq!(decide(&scores, &MetaRalphConfig::permissive()), GateDecision::Quality);
        assert_ne!(decide(&scores, &MetaRalphConfig::strict()), GateDecision::Quality);
    }
}
