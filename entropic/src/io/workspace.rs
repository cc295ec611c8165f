//! Workspace file access for step plans.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use similar::TextDiff;

/// Resolve a plan-relative path inside `root`.
///
/// Absolute paths and any `..` component are rejected so a plan can never
/// write outside the workspace.
pub fn resolve_in_workspace(root: &Path, relative: &str) -> Result<PathBuf> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        bail!("empty file path");
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("path {relative:?} escapes the workspace"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("path {relative:?} is absolute")
            }
        }
    }
    Ok(root.join(rel))
}

/// Read a text file lossily; missing files read as empty.
pub fn read_text_or_empty(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok(String::new());
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Replace the full content of `path`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Unified diff with `a/<path>` and `b/<path>` headers; empty when equal.
pub fn unified_diff(old: &str, new: &str, path: &str) -> String {
    let from = format!("a/{path}");
    let to = format!("b/{path}");
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff().header(&from, &to).to_string()
}

/// Cut `text` to at most `limit` bytes on a char boundary, marking the cut.
pub fn truncate_for_display(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (truncated)", &text[..end])
}
