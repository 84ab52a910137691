//! Chip safety policy, ported from
//! `examples/original_source/lib/chips/policy.py`. Deliberately
//! conservative and local: no external service, just a banned-pattern
//! block list and a risk-level gate for human approval.

use regex::Regex;

use super::schema::ChipSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Info,
    High,
}

#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
    pub severity: Severity,
}

impl PolicyDecision {
    fn ok(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            severity: Severity::Info,
        }
    }

    fn blocked(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            severity: Severity::High,
        }
    }
}

/// Evaluates text and chip specs against a chip's banned-pattern list.
pub struct SafetyPolicy {
    patterns: Vec<Regex>,
}

impl SafetyPolicy {
    pub fn new(block_patterns: impl IntoIterator<Item = String>) -> Self {
        let patterns = block_patterns
            .into_iter()
            .filter_map(|p| {
                regex::RegexBuilder::new(&p)
                    .case_insensitive(true)
                    .build()
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    /// Block text that matches a banned pattern (spec.md §9 chip safety).
    pub fn check_text(&self, text: &str) -> PolicyDecision {
        if text.is_empty() {
            return PolicyDecision::ok("empty");
        }
        for pattern in &self.patterns {
            if pattern.is_match(text) {
                return PolicyDecision::blocked(format!("blocked by pattern: {}", pattern.as_str()));
            }
        }
        PolicyDecision::ok("ok")
    }

    /// High-risk chips require explicit human approval before their
    /// insights evolve policy, rather than being merged automatically.
    pub fn requires_human_approval(spec: &ChipSpec) -> bool {
        spec.chip.risk_level.as_deref() == Some("high")
    }

    /// Build a policy from a chip spec's own `harm_avoidance` hints,
    /// treated as literal substrings rather than regexes (matching the
    /// original's `re.escape` of each entry).
    pub fn from_chip_spec(spec: &ChipSpec) -> Self {
        let patterns = spec
            .chip
            .harm_avoidance
            .iter()
            .filter(|h| !h.is_empty())
            .map(|h| regex::escape(h));
        Self::new(patterns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chips::schema::Chip;

    fn spec_with(risk: &str, harm: Vec<&str>) -> ChipSpec {
        ChipSpec {
            chip: Chip {
                risk_level: Some(risk.into()),
                harm_avoidance: harm.into_iter().map(String::from).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn empty_text_is_allowed() {
        let policy = SafetyPolicy::new(vec!["foo".into()]);
        assert!(policy.check_text("").allowed);
    }

    #[test]
    fn matching_pattern_blocks() {
        let policy = SafetyPolicy::new(vec!["rm -rf".into()]);
        let decision = policy.check_text("run rm -rf / please");
        assert!(!decision.allowed);
        assert_eq!(decision.severity, Severity::High);
    }

    #[test]
    fn non_matching_text_is_allowed() {
        let policy = SafetyPolicy::new(vec!["rm -rf".into()]);
        assert!(policy.check_text("just refactor the module").allowed);
    }

    #[test]
    fn high_risk_requires_approval() {
        let spec = spec_with("high", vec![]);
        assert!(SafetyPolicy::requires_human_approval(&spec));
    }

    #[test]
    fn low_risk_does_not_require_approval() {
        let spec = spec_with("low", vec![]);
        assert!(!SafetyPolicy::requires_human_approval(&spec));
    }

    #[test]
    fn policy_from_chip_spec_blocks_harm_avoidance_entries() {
        let spec = spec_with("medium", vec!["cheat codes"]);
        let policy = SafetyPolicy::from_chip_spec(&spec);
        assert!(!policy.check_text("here are some cheat codes").allowed);
    }
}
