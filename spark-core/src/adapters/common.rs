//! Shared marker-bounded writer for output adapters, ported from
//! `examples/original_source/lib/output_adapters/common.py`. Every
//! concrete adapter (`claude_code`, `cursor`, `openclaw`) is thin
//! configuration of this one function: a target path and a pair of marker
//! strings.

use std::path::Path;

use crate::error::{Error, Result};

pub const MARKER_START: &str = "<!-- SPARK_LEARNINGS_START -->";
pub const MARKER_END: &str = "<!-- SPARK_LEARNINGS_END -->";

/// A frontend's rendered-context writer (spec.md §4.3 step 1 "render
/// context into marker-bounded regions of each enabled output adapter
/// file").
pub trait FrontendAdapter {
    /// Write `content` into this frontend's target file, replacing any
    /// existing marker-bounded section or appending a new one. Returns
    /// `false` (no write performed) when `content` is empty — a safety
    /// guard against truncating a file with nothing (P8).
    fn write(&self, content: &str) -> Result<bool>;
}

/// Write a marker-bounded section into `path`. If the markers already
/// exist in the file, the enclosed region is replaced; otherwise the block
/// is appended (optionally after writing `create_header` into an empty
/// file). Refuses to write when `content` is blank, so a transient empty
/// render can never truncate a file with useful prior content (P8).
pub fn write_marked_section(
    path: &Path,
    content: &str,
    marker_start: &str,
    marker_end: &str,
    create_header: Option<&str>,
) -> Result<bool> {
    if content.trim().is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(Error::from)?;
    }
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let block = format!("{marker_start}\n{content}\n{marker_end}");

    let updated = if existing.contains(marker_start) && existing.contains(marker_end) {
        replace_marked_region(&existing, marker_start, marker_end, &block)
    } else {
        let mut base = if existing.is_empty() {
            match create_header {
                Some(header) => format!("{header}\n"),
                None => String::new(),
            }
        } else {
            existing
        };
        if !base.is_empty() && !base.ends_with('\n') {
            base.push('\n');
        }
        if !base.is_empty() {
            base.push('\n');
        }
        base.push_str(&block);
        base
    };

    std::fs::write(path, updated).map_err(Error::from)?;
    Ok(true)
}

/// Replace the first marker-delimited region (non-greedy, across newlines)
/// with `block`. Falls back to appending if the start marker is found
/// without a matching end marker (shouldn't happen given the caller's
/// containment check, but never silently drops content).
fn replace_marked_region(existing: &str, start: &str, end: &str, block: &str) -> String {
    let Some(start_idx) = existing.find(start) else {
        return format!("{existing}\n{block}");
    };
    let Some(end_rel) = existing[start_idx..].find(end) else {
        return format!("{existing}\n{block}");
    };
    let end_idx = start_idx + end_rel + end.len();
    format!("{}{}{}", &existing[..start_idx], block, &existing[end_idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_content_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.md");
        let wrote = write_marked_section(&path, "   ", MARKER_START, MARKER_END, None).unwrap();
        assert!(!wrote);
        assert!(!path.exists());
    }

    #[test]
    fn first_write_creates_header_and_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.md");
        write_marked_section(&path, "insight one", MARKER_START, MARKER_END, Some("# CLAUDE")).unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.starts_with("# CLAUDE\n"));
        assert!(data.contains(MARKER_START));
        assert!(data.contains("insight one"));
        assert!(data.contains(MARKER_END));
    }

    #[test]
    fn second_write_replaces_existing_section_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.md");
        write_marked_section(&path, "first", MARKER_START, MARKER_END, None).unwrap();
        write_marked_section(&path, "second", MARKER_START, MARKER_END, None).unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert!(!data.contains("first"));
        assert!(data.contains("second"));
        assert_eq!(data.matches(MARKER_START).count(), 1);
    }

    #[test]
    fn write_preserves_content_outside_markers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.md");
        std::fs::write(&path, "# Project notes\nsome handwritten content\n").unwrap();
        write_marked_section(&path, "insight", MARKER_START, MARKER_END, None).unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains("some handwritten content"));
        assert!(data.contains("insight"));
    }
}
