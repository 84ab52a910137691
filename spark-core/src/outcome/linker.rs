//! Links a detected outcome back to recently-surfaced insights so the
//! tracker (`tracker.rs`) can validate or invalidate them (spec.md §4.7
//! steps 1–3). Ported from `examples/original_source/lib/outcomes/linker.py`
//! — same recency/context-match heuristics, reimplemented without the
//! singleton-module global the original uses.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signals::{Outcome, OutcomeType};
use crate::error::{Error, Result};

/// The subset of an insight's state the linker needs to score a candidate
/// link, independent of the full `Insight` record (so the bridge cycle can
/// feed in distillations or chip insights the same way).
#[derive(Debug, Clone)]
pub struct RecentInsight {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub file_path: Option<String>,
    pub chip_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeLink {
    pub outcome_id: String,
    pub insight_id: String,
    pub outcome_type: OutcomeType,
    pub confidence: f64,
    pub recency_weight: f64,
    pub context_match: f64,
    pub timestamp: DateTime<Utc>,
}

const MAX_RECENCY_MINUTES: f64 = 30.0;

fn domain_keywords(chip_id: &str) -> &'static [&'static str] {
    match chip_id {
        "game_dev" => &["game", "player", "health", "level"],
        "marketing" => &["campaign", "audience", "brand"],
        "vibecoding" => &["component", "hook", "api"],
        _ => &[],
    }
}

/// Links outcomes to insights, appending every created link to an
/// append-only JSONL file so `OutcomeTracker::get_insight_reliability` stays
/// consistent across restarts.
pub struct OutcomeLinker {
    path: PathBuf,
}

impl OutcomeLinker {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Link one outcome against a slice of recently-surfaced insights,
    /// appending any resulting links to disk. Returns the links created.
    pub fn link(&self, outcome: &Outcome, recent: &[RecentInsight]) -> Result<Vec<OutcomeLink>> {
        let mut links = Vec::new();
        for insight in recent {
            let recency = recency_weight(insight.timestamp);
            if recency <= 0.0 {
                continue;
            }
            let context_match = context_match(outcome, insight);
            if recency <= 0.2 && context_match <= 0.5 {
                continue;
            }
            links.push(OutcomeLink {
                outcome_id: outcome_id(outcome),
                insight_id: insight.id.clone(),
                outcome_type: outcome.kind,
                confidence: outcome.confidence * recency * context_match.max(0.5),
                recency_weight: recency,
                context_match,
                timestamp: Utc::now(),
            });
        }
        for link in &links {
            self.append(link)?;
        }
        Ok(links)
    }

    fn append(&self, link: &OutcomeLink) -> Result<()> {
        let line = serde_json::to_string(link)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::TransientIo(format!("opening {}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| Error::TransientIo(e.to_string()))?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<OutcomeLink>> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(row) = serde_json::from_str(line) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

fn outcome_id(outcome: &Outcome) -> String {
    format!("out_{}", &crate::advisory::dedupe::text_hash(&outcome.content)[..12])
}

/// Linear decay to 0 at `MAX_RECENCY_MINUTES`, 1.0 under 2 minutes old.
fn recency_weight(insight_ts: DateTime<Utc>) -> f64 {
    let age_minutes = (Utc::now() - insight_ts).num_seconds() as f64 / 60.0;
    if age_minutes > MAX_RECENCY_MINUTES {
        0.0
    } else if age_minutes < 2.0 {
        1.0
    } else {
        (1.0 - age_minutes / MAX_RECENCY_MINUTES).max(0.0)
    }
}

fn context_match(outcome: &Outcome, insight: &RecentInsight) -> f64 {
    let mut score = 0.3_f64;
    let outcome_content = outcome.content.to_lowercase();
    let insight_content = insight.content.to_lowercase();

    let outcome_words: std::collections::HashSet<&str> = outcome_content.split_whitespace().collect();
    let insight_words: std::collections::HashSet<&str> = insight_content.split_whitespace().collect();
    let shared = outcome_words.intersection(&insight_words).count();
    if shared > 0 {
        score += (shared as f64 * 0.05).min(0.3);
    }

    if let Some(file_path) = &insight.file_path {
        if let Some(name) = Path::new(file_path).file_name().and_then(|n| n.to_str()) {
            if outcome_content.contains(&name.to_lowercase()) {
                score += 0.3;
            }
        }
    }

    if let Some(chip_id) = &insight.chip_id {
        if domain_keywords(chip_id)
            .iter()
            .any(|kw| outcome_content.contains(kw))
        {
            score += 0.1;
        }
    }

    score.min(1.0)
}
