//! Baseline advice (spec.md §3 "Baseline advice", §4.5 step 3): a small
//! deterministic set keyed by `(tool, phase)`, used as the safety net when
//! retrieval returns nothing — subject to the fallback budget rather than
//! emitted unconditionally.

use std::path::Path;

use serde::Deserialize;

use super::context::Phase;
use crate::retrieval::BaselineAdvice;

#[derive(Debug, Deserialize)]
struct BaselineRow {
    tool: String,
    phase: Option<Phase>,
    text: String,
}

/// The built-in table, covering the tools/phases most likely to precede a
/// risky action when nothing has been learned yet.
pub fn default_baseline() -> Vec<BaselineAdvice> {
    vec![
        BaselineAdvice {
            tool: "Bash".into(),
            phase: Some(Phase::Deployment),
            text: "double check destructive or irreversible commands before running them".into(),
        },
        BaselineAdvice {
            tool: "Bash".into(),
            phase: None,
            text: "prefer a dry run or targeted scope over a broad command when unsure".into(),
        },
        BaselineAdvice {
            tool: "Write".into(),
            phase: None,
            text: "check whether the target file already has content worth preserving".into(),
        },
        BaselineAdvice {
            tool: "Edit".into(),
            phase: None,
            text: "re-read the surrounding context before editing to avoid breaking callers".into(),
        },
    ]
}

/// Load an operator-provided override table from `path` (JSON array of
/// `{tool, phase, text}`), falling back to `default_baseline()` if the
/// file is absent. A present-but-malformed file is a configuration error
/// the daemon surfaces rather than silently degrading to the default.
pub fn load_baseline(path: impl AsRef<Path>) -> crate::error::Result<Vec<BaselineAdvice>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(default_baseline());
    }
    let data = std::fs::read(path).map_err(crate::error::Error::from)?;
    let rows: Vec<BaselineRow> = serde_json::from_slice(&data)?;
    Ok(rows
        .into_iter()
        .map(|r| BaselineAdvice {
            tool: r.tool,
            phase: r.phase,
            text: r.text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_bash_in_deployment() {
        let table = default_baseline();
        assert!(table
            .iter()
            .any(|b| b.tool == "Bash" && b.phase == Some(Phase::Deployment)));
    }

    #[test]
    fn missing_override_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_baseline(dir.path().join("baseline_advice.json")).unwrap();
        assert_eq!(loaded.len(), default_baseline().len());
    }
}
