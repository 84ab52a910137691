//! Chip observers: domain-scoped learners fanned out to by the bridge
//! cycle's chip-processing step (spec.md §4.3 steps 9–10). Each chip
//! narrows event-to-insight extraction to a domain vocabulary instead of
//! the generic content learner, and every candidate it proposes is
//! screened by the chip's own `SafetyPolicy` before it ever reaches
//! `validate_and_store`.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::policy::SafetyPolicy;
use super::schema::ChipSpec;
use crate::config::ChipMergeTuneables;
use crate::event::Event;
use crate::insight::{Evidence, InsightCandidate, InsightCategory};

/// A loaded, validated chip: its spec, the project it's scoped to, and the
/// safety policy derived from its `harm_avoidance` hints.
pub struct ChipDefinition {
    pub spec: ChipSpec,
    pub project_root: PathBuf,
    pub policy: SafetyPolicy,
}

impl ChipDefinition {
    pub fn id(&self) -> &str {
        self.spec.chip.id.as_deref().unwrap_or("unknown")
    }
}

/// Chips active across one or more project roots, keyed by id. Holds no
/// I/O state beyond what was loaded at startup/reload.
#[derive(Default)]
pub struct ChipRegistry {
    chips: Vec<ChipDefinition>,
}

impl ChipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.yaml`/`*.yml` file in `dir` as a chip spec scoped to
    /// `project_root`. Invalid specs are logged and skipped rather than
    /// aborting the load — one malformed chip must not disable the rest.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>, project_root: impl Into<PathBuf>) {
        let dir = dir.as_ref();
        let project_root = project_root.into();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if !is_yaml {
                continue;
            }
            match std::fs::read_to_string(&path).and_then(|data| {
                ChipSpec::from_yaml(&data)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            }) {
                Ok(spec) => {
                    let errors = spec.validate();
                    if !errors.is_empty() {
                        warn!(path = %path.display(), ?errors, "skipping invalid chip spec");
                        continue;
                    }
                    let policy = SafetyPolicy::from_chip_spec(&spec);
                    self.chips.push(ChipDefinition {
                        spec,
                        project_root: project_root.clone(),
                        policy,
                    });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read chip spec"),
            }
        }
    }

    /// Chips whose project root is a prefix of `cwd` (spec.md §4.3 step 9
    /// "fan out filtered events by cwd").
    pub fn active_for(&self, cwd: &Path) -> Vec<&ChipDefinition> {
        self.chips
            .iter()
            .filter(|chip| cwd.starts_with(&chip.project_root))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chips.is_empty()
    }
}

/// Domain vocabulary used to decide whether an event is relevant to a
/// chip's domain. Falls back to splitting the chip id on `_` for chips
/// outside this known set, so an unrecognized domain still gets a coarse
/// signal instead of silently observing nothing.
fn domain_keywords(chip_id: &str) -> Vec<String> {
    match chip_id {
        "game_dev" => ["game", "player", "health", "level"].iter().map(|s| s.to_string()).collect(),
        "marketing" => ["campaign", "audience", "brand"].iter().map(|s| s.to_string()).collect(),
        "vibecoding" => ["component", "hook", "api"].iter().map(|s| s.to_string()).collect(),
        other => other.split('_').map(|s| s.to_string()).collect(),
    }
}

pub struct ChipObserver;

impl ChipObserver {
    /// Observe one event against one chip, proposing a chip-scoped insight
    /// candidate when the event's text hits the chip's domain vocabulary
    /// and clears the chip's safety policy.
    pub fn observe(event: &Event, chip: &ChipDefinition) -> Option<InsightCandidate> {
        let text = event_text(event)?;
        let keywords = domain_keywords(chip.id());
        let lowered = text.to_lowercase();
        if !keywords.iter().any(|kw| lowered.contains(kw.as_str())) {
            return None;
        }
        if !chip.policy.check_text(&text).allowed {
            return None;
        }

        Some(InsightCandidate {
            key: format!("chip:{}:{}", chip.id(), slug(&text)),
            text: text.chars().take(280).collect(),
            category: InsightCategory::Context,
            confidence: 0.5,
            evidence: vec![Evidence {
                trace_id: event.trace_id.clone(),
                note: format!("chip:{}", chip.id()),
                ts: event.ts,
            }],
            source_chip: Some(chip.id().to_string()),
        })
    }

    /// Whether a chip-scoped candidate clears the merge bar into the
    /// global store (spec.md §4.3 step 10, `tuneables.json`'s
    /// `chip_merge` section).
    pub fn clears_merge_bar(
        candidate: &InsightCandidate,
        actionability: f64,
        transferability: f64,
        tuneables: &ChipMergeTuneables,
    ) -> bool {
        let cognitive_value = (actionability + transferability) / 2.0;
        cognitive_value >= tuneables.min_cognitive_value
            && actionability >= tuneables.min_actionability
            && transferability >= tuneables.min_transferability
            && candidate.text.trim().len() >= tuneables.min_statement_len
    }
}

fn event_text(event: &Event) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(text) = event.user_prompt_text() {
        parts.push(text.to_string());
    }
    if let Some(input) = &event.tool_input {
        if let Some(obj) = input.as_object() {
            for value in obj.values() {
                if let Some(s) = value.as_str() {
                    parts.push(s.to_string());
                }
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn slug(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .take(24)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chips::schema::Chip;
    use crate::event::EventKind;
    use chrono::Utc;
    use serde_json::json;

    fn chip(id: &str) -> ChipDefinition {
        let spec = ChipSpec {
            chip: Chip {
                id: Some(id.into()),
                risk_level: Some("low".into()),
                ..Default::default()
            },
        };
        ChipDefinition {
            policy: SafetyPolicy::from_chip_spec(&spec),
            spec,
            project_root: PathBuf::from("/tmp/project"),
        }
    }

    fn prompt_event(text: &str) -> Event {
        Event {
            v: 1,
            source: "openclaw".into(),
            kind: EventKind::UserPrompt,
            ts: Utc::now(),
            session_id: "s1".into(),
            trace_id: Some("t1".into()),
            tool_name: None,
            tool_input: None,
            payload: json!({"role": "user", "text": text}),
            extra: Default::default(),
        }
    }

    #[test]
    fn matching_domain_vocabulary_produces_candidate() {
        let chip = chip("game_dev");
        let event = prompt_event("the player health bar should regenerate over time");
        let candidate = ChipObserver::observe(&event, &chip).unwrap();
        assert_eq!(candidate.source_chip.as_deref(), Some("game_dev"));
    }

    #[test]
    fn unrelated_text_produces_nothing() {
        let chip = chip("game_dev");
        let event = prompt_event("please refactor the invoice export logic");
        assert!(ChipObserver::observe(&event, &chip).is_none());
    }

    #[test]
    fn active_for_matches_cwd_prefix() {
        let mut registry = ChipRegistry::new();
        registry.chips.push(chip("game_dev"));
        let active = registry.active_for(Path::new("/tmp/project/src"));
        assert_eq!(active.len(), 1);
        let inactive = registry.active_for(Path::new("/other/place"));
        assert!(inactive.is_empty());
    }

    #[test]
    fn merge_bar_rejects_low_scores() {
        let candidate = InsightCandidate {
            key: "chip:game_dev:x".into(),
            text: "short".into(),
            category: InsightCategory::Context,
            confidence: 0.5,
            evidence: vec![],
            source_chip: Some("game_dev".into()),
        };
        let tuneables = ChipMergeTuneables::default();
        assert!(!ChipObserver::clears_merge_bar(&candidate, 0.1, 0.1, &tuneables));
    }

    #[test]
    fn merge_bar_accepts_strong_candidate() {
        let candidate = InsightCandidate {
            key: "chip:game_dev:x".into(),
            text: "always regenerate player health gradually after combat ends".into(),
            category: InsightCategory::Context,
            confidence: 0.7,
            evidence: vec![],
            source_chip: Some("game_dev".into()),
        };
        let tuneables = ChipMergeTuneables::default();
        assert!(ChipObserver::clears_merge_bar(&candidate, 0.6, 0.5, &tuneables));
    }
}
