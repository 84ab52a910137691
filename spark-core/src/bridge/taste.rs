//! Lightweight taste/preference parsing (spec.md §4.3 step 3): recognizes
//! "I like/love/prefer ..." and "I hate/dislike ..." statements in a user
//! prompt. Grounded in spec.md's prose plus `bridge_cycle.py`'s inline
//! taste-parse loop, which stops at the first match per prompt rather than
//! collecting every sentence — the bridge cycle here does the same.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::slug_key;
use crate::error::Result;
use crate::insight::{Evidence, InsightCandidate, InsightCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TastePolarity {
    Liked,
    Disliked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasteItem {
    pub polarity: TastePolarity,
    pub text: String,
    pub ts: DateTime<Utc>,
}

static DISLIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bi (?:really )?(?:hate|dislike|don'?t like) ([^.!\n]{3,120})").unwrap());
static LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bi (?:really )?(?:like|love|prefer) ([^.!\n]{3,120})").unwrap());

/// Parse a single taste statement out of `text`, checking dislikes first
/// since "don't like" would otherwise also match the "like" pattern.
pub fn parse(text: &str) -> Option<TasteItem> {
    if let Some(caps) = DISLIKE.captures(text) {
        return Some(TasteItem {
            polarity: TastePolarity::Disliked,
            text: caps[1].trim().to_string(),
            ts: Utc::now(),
        });
    }
    if let Some(caps) = LIKE.captures(text) {
        return Some(TasteItem {
            polarity: TastePolarity::Liked,
            text: caps[1].trim().to_string(),
            ts: Utc::now(),
        });
    }
    None
}

/// Append-only log of parsed taste statements, independent of the insight
/// store: kept around so an operator can audit what Spark picked up from
/// conversation even for statements that never cleared the write gate.
pub struct TasteBank {
    path: PathBuf,
}

impl TasteBank {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add(&self, item: &TasteItem) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }
}

pub fn to_candidate(item: &TasteItem, trace_id: Option<String>) -> InsightCandidate {
    let verb = match item.polarity {
        TastePolarity::Liked => "prefers",
        TastePolarity::Disliked => "dislikes",
    };
    let polarity_tag = match item.polarity {
        TastePolarity::Liked => "like",
        TastePolarity::Disliked => "dislike",
    };
    InsightCandidate {
        key: format!("taste:{polarity_tag}:{}", slug_key(&item.text)),
        text: format!("User {verb} {}", item.text),
        category: InsightCategory::Preference,
        confidence: 0.65,
        evidence: vec![Evidence {
            trace_id,
            note: "parsed taste statement".into(),
            ts: item.ts,
        }],
        source_chip: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_like_statement() {
        let item = parse("I really like when tests run fast").unwrap();
        assert_eq!(item.polarity, TastePolarity::Liked);
        assert_eq!(item.text, "when tests run fast");
    }

    #[test]
    fn dislike_takes_priority_over_like_pattern() {
        let item = parse("I don't like verbose logging").unwrap();
        assert_eq!(item.polarity, TastePolarity::Disliked);
    }

    #[test]
    fn unrelated_text_parses_to_nothing() {
        assert!(parse("please run the build").is_none());
    }

    #[test]
    fn tastebank_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let bank = TasteBank::open(dir.path().join("tastebank.jsonl"));
        bank.add(&parse("I like snake_case").unwrap()).unwrap();
        let data = std::fs::read_to_string(dir.path().join("tastebank.jsonl")).unwrap();
        assert_eq!(data.lines().count(), 1);
    }
}
