//! Canonical workspace file layout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// All canonical paths for a workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub entropic_dir: PathBuf,
    pub state_path: PathBuf,
    pub worklog_path: PathBuf,
    pub config_path: PathBuf,
    pub schemas_dir: PathBuf,
    pub calls_dir: PathBuf,
    pub spec_md_path: PathBuf,
    pub risks_md_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let entropic_dir = root.join(".entropic");
        Self {
            state_path: entropic_dir.join("state.json"),
            worklog_path: entropic_dir.join("worklog.md"),
            config_path: entropic_dir.join("config.toml"),
            schemas_dir: entropic_dir.join("schemas"),
            calls_dir: entropic_dir.join("calls"),
            spec_md_path: root.join("SPEC.md"),
            risks_md_path: root.join("RISKS.md"),
            entropic_dir,
            root,
        }
    }

    /// Create the workspace root and `.entropic/` if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.entropic_dir)
            .with_context(|| format!("create {}", self.entropic_dir.display()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
