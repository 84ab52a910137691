//! OpenClaw output adapter — writes `SPARK_CONTEXT.md` into the OpenClaw
//! workspace, ported from
//! `examples/original_source/lib/output_adapters/openclaw.py`. The only
//! adapter with its own template (session stats, self-report quick
//! reference) and a hard output cap, matching the original.

use std::path::PathBuf;

use super::common::{write_marked_section, FrontendAdapter};
use crate::error::Result;

const MARKER_START: &str = "<!-- SPARK:BEGIN -->";
const MARKER_END: &str = "<!-- SPARK:END -->";
const MAX_BYTES: usize = 2048;

/// Session counters folded into the rendered template when present.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub events_processed: Option<u64>,
    pub insights_count: Option<u64>,
    pub last_sync: Option<String>,
}

pub struct OpenClawAdapter {
    path: PathBuf,
}

impl OpenClawAdapter {
    /// Resolves the workspace from `SPARK_OPENCLAW_WORKSPACE` or
    /// `OPENCLAW_WORKSPACE`, falling back to `~/.openclaw/workspace`.
    pub fn new() -> Self {
        let workspace = std::env::var("SPARK_OPENCLAW_WORKSPACE")
            .or_else(|_| std::env::var("OPENCLAW_WORKSPACE"))
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs_home().join(".openclaw").join("workspace")
            });
        Self {
            path: workspace.join("SPARK_CONTEXT.md"),
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn write_with_stats(&self, context: &str, stats: &SessionStats) -> Result<bool> {
        let formatted = format_context(context, stats);
        write_marked_section(
            &self.path,
            &formatted,
            MARKER_START,
            MARKER_END,
            Some("# Spark Intelligence Context"),
        )
    }
}

impl Default for OpenClawAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrontendAdapter for OpenClawAdapter {
    fn write(&self, content: &str) -> Result<bool> {
        self.write_with_stats(content, &SessionStats::default())
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

fn format_context(context: &str, stats: &SessionStats) -> String {
    let mut sections = vec![context.trim_end().to_string()];

    let mut parts = Vec::new();
    if let Some(n) = stats.events_processed {
        parts.push(format!("Events processed: {n}"));
    }
    if let Some(n) = stats.insights_count {
        parts.push(format!("Active insights: {n}"));
    }
    if let Some(ts) = &stats.last_sync {
        parts.push(format!("Last sync: {ts}"));
    }
    if !parts.is_empty() {
        sections.push(format!("## Session Stats\n{}", parts.join(" | ")));
    }

    sections.push(SELF_REPORT_REFERENCE.to_string());

    let formatted = sections.join("\n\n");
    cap_to_bytes(&formatted, MAX_BYTES)
}

const SELF_REPORT_REFERENCE: &str = "## How to Self-Report\n\n\
Write a JSON file to `~/.openclaw/workspace/spark_reports/` and Spark picks it up automatically.\n\n\
**Quick ref**:\n\
```json\n\
{\"kind\": \"decision\", \"intent\": \"...\", \"reasoning\": \"...\", \"confidence\": 0.9}\n\
{\"kind\": \"outcome\", \"result\": \"...\", \"lesson\": \"...\"}\n\
{\"kind\": \"preference\", \"liked\": \"...\", \"disliked\": \"...\"}\n\
```";

/// Trims `text` to at most `max_bytes` UTF-8 bytes, keeping whole lines and
/// appending a truncation marker, matching the original's ~2KB cap on the
/// OpenClaw context file so it never bloats the agent's prompt.
fn cap_to_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut out = String::new();
    for line in text.split_inclusive('\n') {
        if out.len() + line.len() > max_bytes {
            break;
        }
        out.push_str(line);
    }
    format!("{}\n... [truncated to ~2KB]", out.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_context_with_stats_template() {
        let dir = tempdir().unwrap();
        let adapter = OpenClawAdapter::with_path(dir.path().join("SPARK_CONTEXT.md"));
        let stats = SessionStats {
            events_processed: Some(42),
            insights_count: Some(7),
            last_sync: None,
        };
        adapter.write_with_stats("prefer tabs", &stats).unwrap();
        let data = std::fs::read_to_string(dir.path().join("SPARK_CONTEXT.md")).unwrap();
        assert!(data.contains("prefer tabs"));
        assert!(data.contains("Events processed: 42"));
        assert!(data.contains("Self-Report"));
    }

    #[test]
    fn caps_output_near_2kb() {
        let long_context = "x".repeat(5000);
        let formatted = format_context(&long_context, &SessionStats::default());
        assert!(formatted.len() <= MAX_BYTES + 64);
        assert!(formatted.contains("truncated"));
    }
}
