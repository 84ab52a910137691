//! The Insight type (spec.md §3): a learned fact or preference, exclusively
//! owned by the insight store and written only through the Meta-Ralph write
//! gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightCategory {
    Preference,
    Decision,
    Principle,
    Context,
    Signal,
    ContentPattern,
}

/// Meta-Ralph's per-dimension scores, each in `0..=2` (spec.md §4.4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityScores {
    pub actionability: u8,
    pub novelty: u8,
    pub reasoning: u8,
    pub specificity: u8,
    pub outcome_linked: u8,
}

impl QualityScores {
    pub fn total(&self) -> u8 {
        self.actionability + self.novelty + self.reasoning + self.specificity + self.outcome_linked
    }

    /// True if any dimension scored zero — disqualifying for QUALITY
    /// regardless of total (spec.md §4.4 "no dimension = 0").
    pub fn has_zero_dimension(&self) -> bool {
        self.actionability == 0
            || self.novelty == 0
            || self.reasoning == 0
            || self.specificity == 0
            || self.outcome_linked == 0
    }
}

/// One unit of evidence supporting an insight (a trace id plus a short note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub trace_id: Option<String>,
    pub note: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    /// Namespaced stable key, e.g. `preference:snake_case`.
    pub key: String,
    pub text: String,
    pub category: InsightCategory,
    pub confidence: f64,
    /// Outcome-derived reliability, distinct from authoring confidence.
    pub reliability: f64,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source_chip: Option<String>,
    pub quality_scores: QualityScores,
    #[serde(default)]
    pub reinforced: u32,
    #[serde(default)]
    pub needs_refinement: bool,
    #[serde(default)]
    pub quarantined: bool,
}

/// A candidate insight proposed by a learner, before it has passed through
/// the write gate and acquired store-assigned bookkeeping fields.
#[derive(Debug, Clone)]
pub struct InsightCandidate {
    pub key: String,
    pub text: String,
    pub category: InsightCategory,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub source_chip: Option<String>,
}

impl Insight {
    /// Build a freshly-scored insight from a candidate. Callers
    /// (`insight_store::validate_and_store`) fill in `quality_scores`
    /// after scoring; this just establishes bookkeeping defaults.
    pub fn from_candidate(candidate: InsightCandidate, quality_scores: QualityScores) -> Self {
        let now = Utc::now();
        Self {
            key: candidate.key,
            text: candidate.text,
            category: candidate.category,
            confidence: candidate.confidence,
            reliability: 0.5,
            evidence: candidate.evidence,
            created_at: now,
            updated_at: now,
            source_chip: candidate.source_chip,
            quality_scores,
            reinforced: 0,
            needs_refinement: false,
            quarantined: false,
        }
    }

    /// Reinforce an existing entry on a repeat QUALITY write: confidence
    /// moves toward a weighted average (spec.md §4.4), reinforced count
    /// increments, evidence accumulates.
    pub fn reinforce(&mut self, incoming_confidence: f64, new_evidence: Vec<Evidence>) {
        const REINFORCEMENT_WEIGHT: f64 = 0.3;
        self.confidence =
            self.confidence * (1.0 - REINFORCEMENT_WEIGHT) + incoming_confidence * REINFORCEMENT_WEIGHT;
        self.reinforced += 1;
        self.evidence.extend(new_evidence);
        self.updated_at = Utc::now();
    }
}
