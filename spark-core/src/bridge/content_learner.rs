//! Content learner (spec.md §4.3 step 7): extracts coding-style
//! observations from edited/written file content, ported from
//! `examples/original_source/lib/content_learner.py`'s per-language regex
//! checks. These are observations about the project, not preferences —
//! they never override an explicit `PREFERENCE:` marker or a parsed taste
//! statement, and only get stored once a pattern has recurred three times.

use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use super::patterns::PatternTracker;
use crate::error::Result;
use crate::insight::{Evidence, InsightCandidate, InsightCategory};

fn detect_language(ext: &str) -> Option<&'static str> {
    match ext {
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "rs" => Some("rust"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "sh" => Some("bash"),
        _ => None,
    }
}

static PY_DEF_SNAKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"def [a-z]+_[a-z]+\(").unwrap());
static PY_ERROR_BROAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"except Exception\b").unwrap());
static PY_ERROR_SPECIFIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"except \w+Error").unwrap());
static PY_FSTRING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"f"[^"]*\{|f'[^']*\{"#).unwrap());

static JS_ARROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"const \w+ = \([^)]*\) =>").unwrap());
static JS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"function \w+\(").unwrap());
static JS_ASYNC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\basync \w+").unwrap());

fn analyze_python(code: &str) -> Vec<(&'static str, &'static str)> {
    let mut found = Vec::new();
    if PY_DEF_SNAKE.is_match(code) {
        found.push(("naming_style", "snake_case"));
    }
    if PY_ERROR_BROAD.is_match(code) {
        found.push(("error_handling", "broad_except"));
    } else if PY_ERROR_SPECIFIC.is_match(code) {
        found.push(("error_handling", "specific_except"));
    }
    if code.contains("\"\"\"") || code.contains("'''") {
        found.push(("documentation", "docstrings"));
    }
    if PY_FSTRING.is_match(code) {
        found.push(("string_style", "f_strings"));
    } else if code.contains(".format(") {
        found.push(("string_style", "format_method"));
    }
    found
}

fn analyze_js_ts(code: &str) -> Vec<(&'static str, &'static str)> {
    let mut found = Vec::new();
    if JS_ARROW.is_match(code) {
        found.push(("function_style", "arrow_functions"));
    }
    if JS_FUNCTION.is_match(code) {
        found.push(("function_style", "function_declarations"));
    }
    if code.contains("export default") {
        found.push(("export_style", "default_export"));
    }
    if JS_ASYNC.is_match(code) {
        found.push(("async_style", "async_await"));
    } else if code.contains(".then(") {
        found.push(("async_style", "promise_chains"));
    }
    found
}

fn analyze_generic(code: &str) -> Vec<(&'static str, &'static str)> {
    let mut found = Vec::new();
    if code.contains('\t') {
        found.push(("indentation", "tabs"));
    } else if code.lines().any(|l| l.starts_with("    ")) {
        found.push(("indentation", "4_spaces"));
    }
    found
}

/// Accumulates per-pattern occurrence counts across edits and turns a
/// pattern into a `ContentPattern` insight candidate the third time it's
/// seen.
pub struct ContentLearner {
    tracker: PatternTracker,
}

impl ContentLearner {
    pub fn open(state_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            tracker: PatternTracker::open(state_path)?,
        })
    }

    /// Analyze one edited/written file's content, below 50 bytes there is
    /// too little signal to bother (matches the original's floor).
    pub fn learn_from_edit(&self, file_path: &str, content: &str) -> Result<Vec<InsightCandidate>> {
        if content.len() < 50 {
            return Ok(Vec::new());
        }
        let ext = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let lang = detect_language(ext);

        let mut found = match lang {
            Some("python") => analyze_python(content),
            Some("javascript") | Some("typescript") => analyze_js_ts(content),
            _ => Vec::new(),
        };
        found.extend(analyze_generic(content));

        let mut candidates = Vec::new();
        for (pattern_type, value) in found {
            let mut key = format!("content_pattern:{pattern_type}:{value}");
            if let Some(lang) = lang {
                key.push(':');
                key.push_str(lang);
            }
            if self.tracker.record(&key)? {
                let lang_note = lang.map(|l| format!(" in {l}")).unwrap_or_default();
                let text = format!(
                    "Project uses {}{lang_note} ({pattern_type})",
                    value.replace('_', " ")
                );
                candidates.push(InsightCandidate {
                    key,
                    text,
                    category: InsightCategory::ContentPattern,
                    confidence: 0.6,
                    evidence: vec![Evidence {
                        trace_id: None,
                        note: "Seen 3+ times in project code".into(),
                        ts: chrono::Utc::now(),
                    }],
                    source_chip: None,
                });
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_sample() -> String {
        let mut s = String::from("def read_config_file():\n    \"\"\"Load config.\"\"\"\n");
        s.push_str("    try:\n        pass\n    except Exception as e:\n        raise\n");
        s.push_str(&"    # padding\n".repeat(5));
        s
    }

    #[test]
    fn stores_observation_only_on_third_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let learner = ContentLearner::open(dir.path().join("seen.json")).unwrap();
        let code = python_sample();
        assert!(learner.learn_from_edit("app.py", &code).unwrap().is_empty());
        assert!(learner.learn_from_edit("app.py", &code).unwrap().is_empty());
        let third = learner.learn_from_edit("app.py", &code).unwrap();
        assert!(!third.is_empty());
        assert!(third.iter().any(|c| c.key.contains("naming_style")));
    }

    #[test]
    fn short_content_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let learner = ContentLearner::open(dir.path().join("seen.json")).unwrap();
        assert!(learner.learn_from_edit("app.py", "x = 1").unwrap().is_empty());
    }
}
