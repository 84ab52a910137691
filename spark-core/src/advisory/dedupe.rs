//! Dedupe (spec.md §4.6 step 6, I4 "duplicate suppression survives
//! restarts"): session-scoped in-memory dedupe plus a persistent,
//! append-only global dedupe log so a restarted daemon doesn't immediately
//! re-emit advice it already gave before shutdown.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-session, process-local dedupe. Cleared on restart by design — the
/// global log is what survives restarts (I4).
pub struct SessionDedupe {
    seen: DashMap<(String, String), DateTime<Utc>>,
}

impl Default for SessionDedupe {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionDedupe {
    pub fn new() -> Self {
        Self { seen: DashMap::new() }
    }

    pub fn is_duplicate(&self, session_id: &str, hash: &str, cooldown_s: u64, now: DateTime<Utc>) -> bool {
        match self.seen.get(&(session_id.to_string(), hash.to_string())) {
            Some(last) => (now - *last).num_seconds() < cooldown_s as i64,
            None => false,
        }
    }

    pub fn record(&self, session_id: &str, hash: &str, now: DateTime<Utc>) {
        self.seen.insert((session_id.to_string(), hash.to_string()), now);
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DedupeRow {
    hash: String,
    ts: DateTime<Utc>,
}

/// A persistent dedupe log backed by an append-only JSONL file, loaded
/// fully into memory at startup. Used both for the general "don't repeat
/// this advice text globally" rule and for the low-authority global
/// suppression log (`advisory_low_auth_dedupe.jsonl`) — same shape, two
/// instances with different paths and cooldowns.
pub struct PersistentDedupe {
    path: PathBuf,
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl PersistentDedupe {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut seen = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&path) {
            for line in data.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(row) = serde_json::from_str::<DedupeRow>(line) {
                    seen.entry(row.hash)
                        .and_modify(|existing| {
                            if row.ts > *existing {
                                *existing = row.ts;
                            }
                        })
                        .or_insert(row.ts);
                }
            }
        }
        Ok(Self {
            path,
            seen: RwLock::new(seen),
        })
    }

    pub fn is_duplicate(&self, hash: &str, cooldown_s: u64, now: DateTime<Utc>) -> bool {
        let seen = self.seen.read().expect("dedupe lock poisoned");
        match seen.get(hash) {
            Some(last) => (now - *last).num_seconds() < cooldown_s as i64,
            None => false,
        }
    }

    pub fn record(&self, hash: &str, now: DateTime<Utc>) -> Result<()> {
        {
            let mut seen = self.seen.write().expect("dedupe lock poisoned");
            seen.insert(hash.to_string(), now);
        }
        let row = DedupeRow {
            hash: hash.to_string(),
            ts: now,
        };
        let line = serde_json::to_string(&row)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::TransientIo(format!("opening {}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| Error::TransientIo(e.to_string()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
