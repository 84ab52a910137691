//! Chip spec validation, ported from
//! `examples/original_source/lib/chips/schema.py`. Chip YAML *authoring* is
//! out of scope (spec.md §1); this only validates an already-loaded spec
//! well enough to refuse a malformed chip before it ever reaches the
//! bridge cycle's chip-processing step.

use serde::{Deserialize, Serialize};

pub const REQUIRED_CHIP_FIELDS: &[&str] = &[
    "id",
    "name",
    "version",
    "description",
    "human_benefit",
    "harm_avoidance",
    "risk_level",
];

pub const ALLOWED_RISK_LEVELS: &[&str] = &["low", "medium", "high"];

/// The `chip:` body of a chip spec document. Fields are optional at the
/// type level (so a malformed YAML document still deserializes) and the
/// required-field check happens in `validate`, matching the original's
/// "report every missing field" behavior rather than failing on the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chip {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub human_benefit: Option<String>,
    #[serde(default)]
    pub harm_avoidance: Vec<String>,
    pub risk_level: Option<String>,
    #[serde(default)]
    pub safety_tests: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChipSpec {
    pub chip: Chip,
}

impl ChipSpec {
    pub fn from_yaml(data: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(data)
    }

    /// Validate this spec, returning every error found (not just the
    /// first), matching `validate_chip_spec`'s "report everything" shape.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let chip = &self.chip;

        for field in REQUIRED_CHIP_FIELDS {
            let missing = match *field {
                "id" => chip.id.as_deref().unwrap_or("").is_empty(),
                "name" => chip.name.as_deref().unwrap_or("").is_empty(),
                "version" => chip.version.as_deref().unwrap_or("").is_empty(),
                "description" => chip.description.as_deref().unwrap_or("").is_empty(),
                "human_benefit" => chip.human_benefit.as_deref().unwrap_or("").is_empty(),
                "harm_avoidance" => chip.harm_avoidance.is_empty(),
                "risk_level" => chip.risk_level.as_deref().unwrap_or("").is_empty(),
                _ => false,
            };
            if missing {
                errors.push(format!("missing chip.{field}"));
            }
        }

        if let Some(risk) = &chip.risk_level {
            if !risk.is_empty() && !ALLOWED_RISK_LEVELS.contains(&risk.as_str()) {
                errors.push(format!("invalid chip.risk_level: {risk}"));
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
