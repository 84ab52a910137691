//! Resolves the state directory layout (spec.md §6) and owns a single
//! process lock over it so two `sparkd` instances never share one state
//! directory concurrently.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};

/// All well-known paths under a Spark state directory, resolved once at
/// startup. Individual subsystems open their own files relative to this;
/// `StateDir` itself only creates directories and owns the lock file.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve and create (if absent) the directory layout rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let dirs = [
            root.join("queue"),
            root.join("advisor"),
            root.join("exports"),
        ];
        for dir in &dirs {
            std::fs::create_dir_all(dir)
                .map_err(|e| Error::StateDir(format!("creating {}: {e}", dir.display())))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn events_queue(&self) -> PathBuf {
        self.root.join("queue").join("events.jsonl")
    }

    pub fn cognitive_insights(&self) -> PathBuf {
        self.root.join("cognitive_insights.json")
    }

    pub fn insight_quarantine(&self) -> PathBuf {
        self.root.join("insight_quarantine.jsonl")
    }

    pub fn roast_history(&self) -> PathBuf {
        self.root.join("roast_history.jsonl")
    }

    pub fn advisory_decision_ledger(&self) -> PathBuf {
        self.root.join("advisory_decision_ledger.jsonl")
    }

    pub fn advisory_global_dedupe(&self) -> PathBuf {
        self.root.join("advisory_global_dedupe.jsonl")
    }

    pub fn advisory_low_auth_dedupe(&self) -> PathBuf {
        self.root.join("advisory_low_auth_dedupe.jsonl")
    }

    pub fn advisor_effectiveness(&self) -> PathBuf {
        self.root.join("advisor").join("effectiveness.json")
    }

    pub fn advisor_recent_advice(&self) -> PathBuf {
        self.root.join("advisor").join("recent_advice.jsonl")
    }

    pub fn advisor_metrics(&self) -> PathBuf {
        self.root.join("advisor").join("metrics.json")
    }

    pub fn outcome_links(&self) -> PathBuf {
        self.root.join("outcome_links.jsonl")
    }

    pub fn outcome_tracker(&self) -> PathBuf {
        self.root.join("outcome_tracker.json")
    }

    pub fn outcome_predictor(&self) -> PathBuf {
        self.root.join("outcome_predictor.json")
    }

    pub fn distillations(&self) -> PathBuf {
        self.root.join("distillations.json")
    }

    pub fn tastebank(&self) -> PathBuf {
        self.root.join("tastebank.jsonl")
    }

    pub fn content_pattern_seen(&self) -> PathBuf {
        self.root.join("content_patterns_seen.json")
    }

    pub fn tool_sequence_seen(&self) -> PathBuf {
        self.root.join("tool_sequence_seen.json")
    }

    pub fn chips_dir(&self) -> PathBuf {
        self.root.join("chips")
    }

    pub fn bridge_cursor(&self) -> PathBuf {
        self.root.join("bridge_cursor.json")
    }

    pub fn bridge_worker_heartbeat(&self) -> PathBuf {
        self.root.join("bridge_worker_heartbeat.json")
    }

    pub fn sparkd_heartbeat(&self) -> PathBuf {
        self.root.join("sparkd_heartbeat.json")
    }

    pub fn scheduler_heartbeat(&self) -> PathBuf {
        self.root.join("scheduler_heartbeat.json")
    }

    pub fn tuneables(&self) -> PathBuf {
        self.root.join("tuneables.json")
    }

    pub fn era(&self) -> PathBuf {
        self.root.join("era.json")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn token_file(&self) -> PathBuf {
        self.root.join("auth_token")
    }

    pub fn baseline_advice(&self) -> PathBuf {
        self.root.join("baseline_advice.json")
    }

    fn lock_file_path(&self) -> PathBuf {
        self.root.join("sparkd.lock")
    }

    /// Acquire an exclusive, non-blocking lock over the state directory.
    /// Returns `Error::Fatal` if another process already holds it — the
    /// daemon refuses to start rather than corrupt shared state.
    pub fn acquire_lock(&self) -> Result<StateDirLock> {
        let path = self.lock_file_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Fatal(format!("opening lock file {}: {e}", path.display())))?;
        file.try_lock_exclusive().map_err(|_| {
            Error::Fatal(format!(
                "state directory {} is already locked by another sparkd instance",
                self.root.display()
            ))
        })?;
        Ok(StateDirLock { _file: file })
    }
}

/// RAII guard over the state directory's exclusive lock. Dropping it (e.g.
/// on daemon shutdown) releases the lock.
pub struct StateDirLock {
    _file: std::fs::File,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_subdirectories() {
        let dir = tempdir().unwrap();
        let state = StateDir::open(dir.path()).unwrap();
        assert!(state.root().join("queue").is_dir());
        assert!(state.root().join("advisor").is_dir());
        assert!(state.root().join("exports").is_dir());
    }

    #[test]
    fn second_lock_attempt_fails() {
        let dir = tempdir().unwrap();
        let state = StateDir::open(dir.path()).unwrap();
        let _lock = state.acquire_lock().unwrap();
        let err = state.acquire_lock().unwrap_err();
        assert!(matches!(err, Error::Fatal(_)));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let state = StateDir::open(dir.path()).unwrap();
        {
            let _lock = state.acquire_lock().unwrap();
        }
        let _lock2 = state.acquire_lock().unwrap();
    }
}
