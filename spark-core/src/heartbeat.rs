//! Liveness beacons (spec.md §6): `bridge_worker_heartbeat.json`,
//! `sparkd_heartbeat.json`, `scheduler_heartbeat.json`. Grounded in
//! `examples/original_source/lib/bridge_cycle.py`'s
//! `write_bridge_heartbeat`/`read_bridge_heartbeat`/`bridge_heartbeat_age_s`.
//!
//! Clients corroborate `GET /health` with these files for end-to-end
//! liveness (spec.md §6): the HTTP server can answer "ok" while the bridge
//! cycle worker is wedged, and only the heartbeat file reveals that.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::Result;

/// One liveness record. `errors` carries the per-step failure summary a
/// degraded bridge cycle still writes (spec.md §7: "the cycle always
/// writes a heartbeat, even a degraded one listing which steps failed").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub ts: DateTime<Utc>,
    pub healthy: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Heartbeat {
    pub fn healthy() -> Self {
        Self {
            ts: Utc::now(),
            healthy: true,
            errors: Vec::new(),
        }
    }

    pub fn degraded(errors: Vec<String>) -> Self {
        Self {
            ts: Utc::now(),
            healthy: errors.is_empty(),
            errors,
        }
    }
}

/// Atomically write a heartbeat file: write to a sibling tmp file, fsync,
/// rename over the target. Prevents a reader ever observing a half-written
/// JSON document.
pub fn write_heartbeat(path: impl AsRef<Path>, heartbeat: &Heartbeat) -> Result<()> {
    let path = path.as_ref();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)?;
    serde_json::to_writer(&mut tmp, heartbeat)?;
    use std::io::Write;
    tmp.flush()?;
    tmp.persist(path)
        .map_err(|e| crate::error::Error::transient_io(e.to_string()))?;
    Ok(())
}

/// Read a heartbeat file. A missing file is not an error: callers treat
/// absence as "never ran" and report it accordingly.
pub fn read_heartbeat(path: impl AsRef<Path>) -> Result<Option<Heartbeat>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    let heartbeat = serde_json::from_slice(&data)?;
    Ok(Some(heartbeat))
}

/// Age of the most recent heartbeat, or `None` if it has never been written.
pub fn heartbeat_age(path: impl AsRef<Path>) -> Result<Option<Duration>> {
    let heartbeat = match read_heartbeat(path)? {
        Some(h) => h,
        None => return Ok(None),
    };
    let age = Utc::now().signed_duration_since(heartbeat.ts);
    Ok(Some(Duration::from_millis(age.num_milliseconds().max(0) as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hb.json");
        write_heartbeat(&path, &Heartbeat::healthy()).unwrap();
        let read_back = read_heartbeat(&path).unwrap().unwrap();
        assert!(read_back.healthy);
        assert!(read_back.errors.is_empty());
    }

    #[test]
    fn degraded_with_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hb.json");
        write_heartbeat(&path, &Heartbeat::degraded(vec!["render_context failed".into()]))
            .unwrap();
        let read_back = read_heartbeat(&path).unwrap().unwrap();
        assert!(!read_back.healthy);
        assert_eq!(read_back.errors.len(), 1);
    }

    #[test]
    fn missing_file_is_none_not_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.json");
        assert!(read_heartbeat(&path).unwrap().is_none());
        assert!(heartbeat_age(&path).unwrap().is_none());
    }
}
