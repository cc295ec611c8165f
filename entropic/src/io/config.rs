//! Workspace configuration stored under `.entropic/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::entropy::Thresholds;
use crate::core::policy::{CommandPolicy, PolicyConfig};

/// Workspace configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values below; a missing file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntropicConfig {
    /// Upper bound on run-loop iterations per `entropic run`.
    pub max_iters: u32,

    /// Corrective steps attempted after a failed step before escalating.
    pub max_repairs_per_step: u32,

    /// Independent risk registers sampled per scan.
    pub risk_samples: usize,

    /// Bytes of stdout/stderr kept per planned command.
    pub command_output_limit_bytes: usize,

    /// Bytes of diffs and command output shown in panels.
    pub display_limit_bytes: usize,

    /// Maximum prompt size before droppable sections are removed.
    pub prompt_budget_bytes: usize,

    pub thresholds: Thresholds,

    pub policy: PolicyConfig,

    pub oracle: OracleConfig,
}

impl Default for EntropicConfig {
    fn default() -> Self {
        Self {
            max_iters: 50,
            max_repairs_per_step: 3,
            risk_samples: 3,
            command_output_limit_bytes: 1_000_000,
            display_limit_bytes: 4000,
            prompt_budget_bytes: 60_000,
            thresholds: Thresholds::default(),
            policy: PolicyConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

/// `[oracle]`: the external structured-output backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Program spawned for each call (`<command> exec ...`).
    pub command: String,
    pub timeout_secs: u64,
    /// Attempts per call before giving up on malformed output.
    pub retries: u32,
    /// Truncate backend stdout/stderr logs beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Low-diversity profile used for everything except risk scans.
    pub planning: SamplingProfile,
    /// High-diversity profile used for risk registers.
    ///
    /// Disagreement between registers is the entropy signal, so scans want
    /// varied answers. `codex exec` exposes no sampling temperature; the
    /// default stands in for "no reasoning, hot sampling" with `minimal`
    /// effort, and `args` can pass a backend-specific sampling override.
    pub scan: SamplingProfile,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: "codex".to_string(),
            timeout_secs: 15 * 60,
            retries: 2,
            output_limit_bytes: 200_000,
            planning: SamplingProfile {
                model: None,
                reasoning_effort: "medium".to_string(),
                args: Vec::new(),
            },
            scan: SamplingProfile {
                model: None,
                reasoning_effort: "minimal".to_string(),
                args: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SamplingProfile {
    /// Backend model name; the backend default when unset.
    pub model: Option<String>,
    pub reasoning_effort: String,
    /// Extra arguments passed through to the backend verbatim.
    pub args: Vec<String>,
}

impl Default for SamplingProfile {
    fn default() -> Self {
        Self {
            model: None,
            reasoning_effort: "medium".to_string(),
            args: Vec::new(),
        }
    }
}

impl EntropicConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(anyhow!("max_iters must be > 0"));
        }
        if self.risk_samples == 0 {
            return Err(anyhow!("risk_samples must be > 0"));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(anyhow!("command_output_limit_bytes must be > 0"));
        }
        if self.display_limit_bytes == 0 {
            return Err(anyhow!("display_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        for (name, value) in [
            ("thresholds.severe_min", self.thresholds.severe_min),
            ("thresholds.any_min", self.thresholds.any_min),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(anyhow!("{name} must be a finite number >= 0"));
            }
        }
        if self.oracle.command.trim().is_empty() {
            return Err(anyhow!("oracle.command must be non-empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.retries == 0 {
            return Err(anyhow!("oracle.retries must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        CommandPolicy::new(&self.policy).context("invalid [policy]")?;
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EntropicConfig::default()`.
pub fn load_config(path: &Path) -> Result<EntropicConfig> {
    if !path.exists() {
        let cfg = EntropicConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EntropicConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Load config, first writing the defaults when the file is missing so the
/// workspace carries an editable copy.
pub fn load_or_init_config(path: &Path) -> Result<EntropicConfig> {
    if !path.exists() {
        info!(path = %path.display(), "writing default config");
        write_config(path, &EntropicConfig::default())?;
    }
    load_config(path)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EntropicConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
