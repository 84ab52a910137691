//! `era.json` (spec.md §6): a marker allowing a clean-slate archive. Bumping
//! the era is an operator action (not automated by any module here); a
//! corrupt era marker is one of the documented Fatal startup conditions
//! (spec.md §7).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Era {
    pub id: u64,
    pub started_at: DateTime<Utc>,
}

impl Era {
    pub fn first() -> Self {
        Self {
            id: 1,
            started_at: Utc::now(),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            id: self.id + 1,
            started_at: Utc::now(),
        }
    }
}

/// Read the era marker, creating era 1 if absent (a fresh state directory
/// has no prior era to be corrupt).
pub fn load_or_init(path: impl AsRef<Path>) -> Result<Era> {
    let path = path.as_ref();
    if !path.exists() {
        let era = Era::first();
        write(path, &era)?;
        return Ok(era);
    }
    let data = std::fs::read(path).map_err(Error::from)?;
    serde_json::from_slice(&data)
        .map_err(|e| Error::Fatal(format!("corrupt era marker at {}: {e}", path.display())))
}

pub fn write(path: impl AsRef<Path>, era: &Era) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer(&mut tmp, era)?;
    use std::io::Write;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| Error::transient_io(e.to_string()))?;
    Ok(())
}
