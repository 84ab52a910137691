//! Tool-sequence pattern detection (spec.md §4.3 step 4): when the same
//! two-tool sequence recurs three times, promote it to a heuristic
//! distillation. Grounded in spec.md's prose on pattern detection plus the
//! 3rd-occurrence promotion threshold `content_learner.py` uses for its own
//! pattern store — the same shape, reused here for tool sequences instead
//! of code style.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SeenDocument {
    #[serde(default)]
    counts: HashMap<String, u32>,
}

/// Counts occurrences of arbitrary string keys, persisted as a small JSON
/// document. Shared by the pattern-detection step (tool-sequence keys) and
/// the content learner (code-style keys) — both want "store on the 3rd
/// time we see this, not the 1st".
pub struct PatternTracker {
    path: PathBuf,
    doc: RwLock<SeenDocument>,
}

impl PatternTracker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                SeenDocument::default()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            SeenDocument::default()
        };
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Record one occurrence of `key`, returning `true` exactly when this
    /// occurrence is the third — the promotion threshold, matching
    /// `content_learner.py`'s `== 3` check rather than "3rd and every one
    /// after".
    pub fn record(&self, key: &str) -> Result<bool> {
        let promote = {
            let mut doc = self.doc.write().expect("pattern tracker lock poisoned");
            let count = doc.counts.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count == 3
        };
        self.persist()?;
        Ok(promote)
    }

    fn persist(&self) -> Result<()> {
        let doc = self.doc.read().expect("pattern tracker lock poisoned");
        let data = serde_json::to_vec_pretty(&*doc)?;
        drop(doc);
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, &data)?;
        tmp.persist(&self.path)
            .map_err(|e| crate::error::Error::transient_io(e.to_string()))?;
        Ok(())
    }
}

/// Heuristic statement for a recurring two-tool sequence.
pub fn sequence_statement(first: &str, second: &str) -> String {
    format!("{first} is typically followed by {second} in this workflow")
}
