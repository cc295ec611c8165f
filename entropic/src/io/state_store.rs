//! Agent state storage (`.entropic/state.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::AgentState;

/// Load agent state from disk.
pub fn load_state(path: &Path) -> Result<AgentState> {
    debug!(path = %path.display(), "loading agent state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: AgentState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(
        tasks = state.tasks.len(),
        risks = state.risks.len(),
        history = state.history.len(),
        "agent state loaded"
    );
    Ok(state)
}

/// Load agent state, or `None` if the file does not exist yet.
pub fn load_state_if_present(path: &Path) -> Result<Option<AgentState>> {
    if !path.exists() {
        return Ok(None);
    }
    load_state(path).map(Some)
}

/// Atomically write agent state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &AgentState) -> Result<()> {
    debug!(path = %path.display(), iterations = state.iterations, "writing agent state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize agent state")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}
