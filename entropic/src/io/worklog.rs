//! Append-only human-readable worklog (`.entropic/worklog.md`).
//!
//! The worklog is a product artifact: it is always written, independent of
//! `RUST_LOG`, and never rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Worklog {
    path: PathBuf,
}

impl Worklog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the goal header once; an existing worklog is left untouched.
    pub fn ensure_header(&self, goal: &str) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&self.path, format!("# Worklog\n\n## Goal\n{goal}\n\n"))
            .with_context(|| format!("write {}", self.path.display()))
    }

    /// Append a timestamped `## <time> - <title>` entry.
    pub fn append(&self, title: &str, body: &str) -> Result<()> {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format!("\n## {ts} - {title}\n\n{body}\n");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(entry.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))
    }

    /// Append an entry whose body is `value` as a pretty JSON code block.
    pub fn append_json<T: Serialize>(&self, title: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value).context("serialize worklog entry")?;
        self.append(title, &format!("```json\n{json}\n```"))
    }
}
