//! Domain retrieval profiles (spec.md §4.5 step 5): per-domain overrides of
//! weights, limits, and similarity floors applied when the query's inferred
//! domain (its intent family) matches a configured profile.

use crate::config::RetrievalTuneables;

#[derive(Debug, Clone, Copy, Default)]
pub struct DomainProfile {
    pub limit: Option<usize>,
    pub min_fused_score: Option<f64>,
    pub reliability_floor: Option<f64>,
}

/// Resolve the effective profile for `intent_family`, falling back to the
/// tuneables' flat `overrides` map, and to "no override" (all `None`) when
/// domain profiles are disabled or nothing matches.
pub fn resolve_profile(tuneables: &RetrievalTuneables, intent_family: &str) -> DomainProfile {
    let mut profile = DomainProfile {
        limit: tuneables.overrides.get("limit").map(|v| *v as usize),
        min_fused_score: tuneables.overrides.get("min_fused_score").copied(),
        reliability_floor: tuneables.overrides.get("reliability_floor").copied(),
    };

    if !tuneables.domain_profile_enabled {
        return profile;
    }

    if let Some(domain_overrides) = tuneables.domain_profiles.get(intent_family) {
        if let Some(limit) = domain_overrides.get("limit") {
            profile.limit = Some(*limit as usize);
        }
        if let Some(min_fused) = domain_overrides.get("min_fused_score") {
            profile.min_fused_score = Some(*min_fused);
        }
        if let Some(floor) = domain_overrides.get("reliability_floor") {
            profile.reliability_floor = Some(*floor);
        }
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn no_matching_domain_falls_back_to_flat_overrides() {
        let mut tuneables = RetrievalTuneables::default();
        tuneables.overrides.insert("limit".into(), 3.0);
        let profile = resolve_profile(&tuneables, "deployment");
        assert_eq!(profile.limit, Some(3));
    }

    #[test]
    fn matching_domain_profile_overrides_flat_defaults() {
        let mut tuneables = RetrievalTuneables::default();
        tuneables.overrides.insert("limit".into(), 3.0);
        let mut domain = HashMap::new();
        domain.insert("limit".to_string(), 1.0);
        tuneables.domain_profiles.insert("deployment".into(), domain);
        let profile = resolve_profile(&tuneables, "deployment");
        assert_eq!(profile.limit, Some(1));
    }

    #[test]
    fn disabled_domain_profiles_ignore_per_domain_overrides() {
        let mut tuneables = RetrievalTuneables::default();
        tuneables.domain_profile_enabled = false;
        let mut domain = HashMap::new();
        domain.insert("limit".to_string(), 1.0);
        tuneables.domain_profiles.insert("deployment".into(), domain);
        let profile = resolve_profile(&tuneables, "deployment");
        assert_eq!(profile.limit, None);
    }
}
