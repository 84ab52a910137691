//! Claude Code output adapter — writes `CLAUDE.md` at the project root,
//! ported from `examples/original_source/lib/output_adapters/claude_code.py`
//! (391 chars in the original; this is deliberately just as thin).

use std::path::PathBuf;

use super::common::{write_marked_section, FrontendAdapter, MARKER_START, MARKER_END};
use crate::error::Result;

pub struct ClaudeCodeAdapter {
    path: PathBuf,
}

impl ClaudeCodeAdapter {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: project_dir.into().join("CLAUDE.md"),
        }
    }
}

impl FrontendAdapter for ClaudeCodeAdapter {
    fn write(&self, content: &str) -> Result<bool> {
        write_marked_section(&self.path, content, MARKER_START, MARKER_END, Some("# CLAUDE"))
    }
}
