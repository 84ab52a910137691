//! Cursor output adapter — writes `.cursorrules` at the project root,
//! ported from `examples/original_source/lib/output_adapters/cursor.py`.

use std::path::PathBuf;

use super::common::{write_marked_section, FrontendAdapter, MARKER_START, MARKER_END};
use crate::error::Result;

pub struct CursorAdapter {
    path: PathBuf,
}

impl CursorAdapter {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: project_dir.into().join(".cursorrules"),
        }
    }
}

impl FrontendAdapter for CursorAdapter {
    fn write(&self, content: &str) -> Result<bool> {
        write_marked_section(&self.path, content, MARKER_START, MARKER_END, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_cursorrules_without_header() {
        let dir = tempdir().unwrap();
        let adapter = CursorAdapter::new(dir.path());
        adapter.write("run tests before committing").unwrap();
        let data = std::fs::read_to_string(dir.path().join(".cursorrules")).unwrap();
        assert!(data.contains("run tests before committing"));
        assert!(data.contains(MARKER_START));
    }
}
