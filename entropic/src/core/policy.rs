//! Static allow/deny classification of shell command strings.
//!
//! A command is allowed only when its first shell token is on the allowlist
//! and no deny pattern matches anywhere in the full string. Deny patterns
//! override the allowlist, which is what catches chained commands such as
//! `pip install x && rm -rf /`.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ALLOWED_PREFIXES: &[&str] = &[
    "python", "python3", "pytest", "pip", "pip3", "ruff", "black", "mypy", "node", "npm", "pnpm",
    "git",
];

pub const DEFAULT_DENIED_PATTERNS: &[&str] = &[
    r"\brm\b",
    r"\bsudo\b",
    r"\bshutdown\b",
    r"\breboot\b",
    r"\bmkfs\b",
    r"\b:\(\)\s*\{",
    r"\bchmod\s+777\b",
    r"\bcurl\b",
    r"\bwget\b",
];

/// `[policy]` section of the workspace config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allowed_prefixes: Vec<String>,
    pub denied_patterns: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: DEFAULT_ALLOWED_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
            denied_patterns: DEFAULT_DENIED_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }

    pub fn reason(&self) -> &str {
        match self {
            PolicyDecision::Allow => "ok",
            PolicyDecision::Deny { reason } => reason,
        }
    }
}

/// Compiled command policy.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    allowed: BTreeSet<String>,
    denied: Vec<(String, Regex)>,
}

impl CommandPolicy {
    /// Compile a policy from config. Fails on an invalid deny pattern.
    pub fn new(config: &PolicyConfig) -> Result<Self> {
        let denied = config
            .denied_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("compile denied pattern {pattern:?}"))
                    .map(|re| (pattern.clone(), re))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            allowed: config.allowed_prefixes.iter().cloned().collect(),
            denied,
        })
    }

    pub fn classify(&self, cmd: &str) -> PolicyDecision {
        let cmd = cmd.trim();
        if cmd.is_empty() {
            return deny("Empty command".to_string());
        }
        let Some(tokens) = shlex::split(cmd) else {
            return deny("Command could not be tokenized".to_string());
        };
        let Some(first) = tokens.first() else {
            return deny("Empty command".to_string());
        };
        if !self.allowed.contains(first) {
            return deny(format!("Command '{first}' not in allowlist"));
        }
        if let Some((pattern, _)) = self.denied.iter().find(|(_, re)| re.is_match(cmd)) {
            return deny(format!("Denied by pattern: {pattern}"));
        }
        PolicyDecision::Allow
    }
}

fn deny(reason: String) -> PolicyDecision {
    PolicyDecision::Deny { reason }
}
