//! Operator-tunable policy (`tuneables.json`, spec.md §6) and process-level
//! runtime flags read from the environment/CLI at startup.
//!
//! Every section has `#[serde(default)]` so an operator can ship a
//! tuneables file that only overrides one knob; the rest fall back to the
//! built-in defaults below. Hot-reload is the caller's responsibility
//! (`Tuneables::reload_if_changed`, driven once per bridge cycle).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryEngineTuneables {
    pub force_programmatic_synth: bool,
    pub selective_ai_synth_enabled: bool,
    pub selective_ai_min_authority: f64,
    pub selective_ai_min_remaining_ms: u64,
    pub fallback_budget_cap: u32,
    pub fallback_budget_window_s: u64,
    pub advisory_text_repeat_cooldown_s: u64,
    /// How much to boost an advice item's authority when the outcome
    /// predictor (feature-gated on `SPARK_OUTCOME_PREDICTOR`) estimates
    /// elevated failure risk for this (phase, intent_family, tool). Clamped
    /// to [0.0, 0.5] wherever it's applied.
    pub outcome_predictor_authority_bump: f64,
}

impl Default for AdvisoryEngineTuneables {
    fn default() -> Self {
        Self {
            force_programmatic_synth: false,
            selective_ai_synth_enabled: false,
            selective_ai_min_authority: 0.6,
            selective_ai_min_remaining_ms: 800,
            fallback_budget_cap: 5,
            fallback_budget_window_s: 3600,
            advisory_text_repeat_cooldown_s: 900,
            outcome_predictor_authority_bump: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryGateTuneables {
    pub note_threshold: f64,
    pub whisper_threshold: f64,
    pub warning_threshold: f64,
    pub tool_cooldown_s: u64,
    pub advice_repeat_cooldown_s: u64,
    pub max_emit_per_call: u32,
    pub phase_policy: HashMap<String, PhasePolicy>,
}

impl Default for AdvisoryGateTuneables {
    fn default() -> Self {
        Self {
            note_threshold: 0.3,
            whisper_threshold: 0.5,
            warning_threshold: 0.8,
            tool_cooldown_s: 120,
            advice_repeat_cooldown_s: 600,
            max_emit_per_call: 1,
            phase_policy: HashMap::new(),
        }
    }
}

/// Per-phase override of emission policy (spec.md §4.6 "phase policy").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasePolicy {
    pub enabled: bool,
    pub min_authority: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorTuneables {
    pub max_items: usize,
    pub max_advice_items: usize,
    pub min_rank_score: f64,
    pub chip_advice_limit: usize,
    pub chip_advice_min_score: f64,
    pub chip_source_boost: f64,
}

impl Default for AdvisorTuneables {
    fn default() -> Self {
        Self {
            max_items: 200,
            max_advice_items: 3,
            min_rank_score: 0.15,
            chip_advice_limit: 2,
            chip_advice_min_score: 0.4,
            chip_source_boost: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalTuneables {
    pub level: String,
    pub domain_profile_enabled: bool,
    pub overrides: HashMap<String, f64>,
    pub domain_profiles: HashMap<String, HashMap<String, f64>>,
}

impl Default for RetrievalTuneables {
    fn default() -> Self {
        Self {
            level: "standard".into(),
            domain_profile_enabled: true,
            overrides: HashMap::new(),
            domain_profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticTuneables {
    pub enabled: bool,
    pub min_similarity: f64,
    pub min_fusion_score: f64,
    pub rescue_min_similarity: f64,
    pub exclude_categories: Vec<String>,
}

impl Default for SemanticTuneables {
    fn default() -> Self {
        Self {
            enabled: false,
            min_similarity: 0.25,
            min_fusion_score: 0.2,
            rescue_min_similarity: 0.45,
            exclude_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesizerTuneables {
    pub ai_timeout_s: u64,
}

impl Default for SynthesizerTuneables {
    fn default() -> Self {
        Self { ai_timeout_s: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTuneables {
    pub validate_and_store_enabled: bool,
}

impl Default for FlowTuneables {
    fn default() -> Self {
        Self {
            validate_and_store_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTunerTuneables {
    pub source_boosts: HashMap<String, f64>,
}

impl Default for AutoTunerTuneables {
    fn default() -> Self {
        Self {
            source_boosts: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChipMergeTuneables {
    pub min_cognitive_value: f64,
    pub min_actionability: f64,
    pub min_transferability: f64,
    pub min_statement_len: usize,
}

impl Default for ChipMergeTuneables {
    fn default() -> Self {
        Self {
            min_cognitive_value: 0.3,
            min_actionability: 0.3,
            min_transferability: 0.2,
            min_statement_len: 12,
        }
    }
}

/// The full `tuneables.json` document (spec.md §6). All sections default
/// independently, so a partial file parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuneables {
    pub advisory_engine: AdvisoryEngineTuneables,
    pub advisory_gate: AdvisoryGateTuneables,
    pub advisor: AdvisorTuneables,
    pub retrieval: RetrievalTuneables,
    pub semantic: SemanticTuneables,
    pub synthesizer: SynthesizerTuneables,
    pub flow: FlowTuneables,
    pub auto_tuner: AutoTunerTuneables,
    pub chip_merge: ChipMergeTuneables,
    /// Ordered named stages reserved for a depth-lens training loop. No
    /// trainer reads this yet; the key exists so a future implementer has
    /// the shape without us building the trainer itself.
    pub depth_lens_set: Vec<String>,
}

impl Tuneables {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path).map_err(Error::from)?;
        serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Watches a tuneables file's mtime and re-parses on change, once per
/// bridge cycle (spec.md §6 "hot-reloaded once per bridge cycle").
pub struct TuneablesWatcher {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
    current: Tuneables,
}

impl TuneablesWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = Tuneables::load(&path)?;
        let last_mtime = std::fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        Ok(Self {
            path,
            last_mtime,
            current,
        })
    }

    pub fn current(&self) -> &Tuneables {
        &self.current
    }

    /// Re-read the file if its mtime advanced since the last check. Returns
    /// `true` if the in-memory tuneables changed.
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        let mtime = std::fs::metadata(&self.path).ok().and_then(|m| m.modified().ok());
        if mtime == self.last_mtime {
            return Ok(false);
        }
        self.current = Tuneables::load(&self.path)?;
        self.last_mtime = mtime;
        Ok(true)
    }
}

/// Process-level flags resolved once at daemon startup from CLI/env (spec.md
/// §6). Feature flags default to disabled so ablation and experimental
/// behavior stay opt-in.
#[derive(Debug, Clone)]
pub struct RuntimeFlags {
    pub outcome_predictor: bool,
    pub advisory_disable_chips: bool,
    pub personality_evolution_v1: bool,
    pub personality_evolution_observer: bool,
}

impl RuntimeFlags {
    pub fn from_env() -> Self {
        Self {
            outcome_predictor: env_flag("SPARK_OUTCOME_PREDICTOR"),
            advisory_disable_chips: env_flag("SPARK_ADVISORY_DISABLE_CHIPS"),
            personality_evolution_v1: env_flag("SPARK_PERSONALITY_EVOLUTION_V1"),
            personality_evolution_observer: env_flag("SPARK_PERSONALITY_EVOLUTION_OBSERVER"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let tuneables = Tuneables::load(dir.path().join("tuneables.json")).unwrap();
        assert_eq!(tuneables.advisory_gate.max_emit_per_call, 1);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuneables.json");
        std::fs::write(&path, r#"{"advisor": {"max_advice_items": 7}}"#).unwrap();
        let tuneables = Tuneables::load(&path).unwrap();
        assert_eq!(tuneables.advisor.max_advice_items, 7);
        assert_eq!(tuneables.advisor.max_items, 200);
        assert_eq!(tuneables.advisory_gate.note_threshold, 0.3);
    }

    #[test]
    fn watcher_reloads_on_mtime_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuneables.json");
        std::fs::write(&path, r#"{"advisor": {"max_advice_items": 1}}"#).unwrap();
        let mut watcher = TuneablesWatcher::new(&path).unwrap();
        assert_eq!(watcher.current().advisor.max_advice_items, 1);

        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&path, r#"{"advisor": {"max_advice_items": 9}}"#).unwrap();
        let changed = watcher.reload_if_changed().unwrap();
        assert!(changed);
        assert_eq!(watcher.current().advisor.max_advice_items, 9);
    }

    #[test]
    fn watcher_noop_when_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tuneables.json");
        std::fs::write(&path, "{}").unwrap();
        let mut watcher = TuneablesWatcher::new(&path).unwrap();
        assert!(!watcher.reload_if_changed().unwrap());
    }
}
