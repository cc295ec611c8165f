//! An opened workspace: state plus every collaborator the loop phases share.

use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use tracing::{debug, info};

use crate::core::policy::CommandPolicy;
use crate::core::state::AgentState;
use crate::io::backend::Backend;
use crate::io::config::EntropicConfig;
use crate::io::human::Human;
use crate::io::paths::WorkspacePaths;
use crate::io::state_store::{load_state_if_present, write_state};
use crate::io::workspace::{read_text_or_empty, truncate_for_display};
use crate::io::worklog::Worklog;
use crate::oracle::Oracle;

/// How a session is opened.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Goal for a fresh workspace; must match the stored goal otherwise.
    pub goal: Option<String>,
    /// Never prompt for write confirmation or policy overrides.
    pub auto: bool,
    /// Overrides `max_iters` from the config file.
    pub max_iters: Option<u32>,
}

pub struct Session<B, H> {
    pub paths: WorkspacePaths,
    pub config: EntropicConfig,
    pub oracle: Oracle<B>,
    pub human: H,
    pub policy: CommandPolicy,
    pub worklog: Worklog,
    pub state: AgentState,
    pub auto: bool,
}

impl<B: Backend, H: Human> Session<B, H> {
    /// Open `root`, creating the state for `options.goal` when none exists.
    ///
    /// Fails when there is neither stored state nor a goal, or when the
    /// given goal differs from the stored one.
    pub fn open(
        root: &Path,
        mut config: EntropicConfig,
        backend: B,
        human: H,
        options: &SessionOptions,
    ) -> Result<Self> {
        let paths = WorkspacePaths::new(root);
        paths.ensure_dirs()?;
        if let Some(max_iters) = options.max_iters {
            config.max_iters = max_iters;
        }
        config.validate().context("invalid configuration")?;

        let goal = options
            .goal
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty());
        let state = match (load_state_if_present(&paths.state_path)?, goal) {
            (Some(state), Some(goal)) if state.goal != goal => bail!(
                "workspace {} already works on a different goal: {:?}",
                paths.root.display(),
                state.goal
            ),
            (Some(state), _) => {
                debug!(iterations = state.iterations, "resuming stored state");
                state
            }
            (None, Some(goal)) => AgentState::new(goal),
            (None, None) => bail!(
                "no state at {} and no goal given (pass --goal)",
                paths.state_path.display()
            ),
        };

        let session_id = format!(
            "{}-{}",
            Local::now().format("%Y%m%d-%H%M%S"),
            std::process::id()
        );
        let oracle = Oracle::new(
            backend,
            &paths,
            config.oracle.clone(),
            config.prompt_budget_bytes,
            &session_id,
        )?;
        let policy = CommandPolicy::new(&config.policy)?;
        let worklog = Worklog::new(paths.worklog_path.clone());
        worklog.ensure_header(&state.goal)?;
        info!(root = %paths.root.display(), session = %session_id, auto = options.auto, "opened workspace");

        let session = Self {
            paths,
            config,
            oracle,
            human,
            policy,
            worklog,
            state,
            auto: options.auto,
        };
        session.save()?;
        Ok(session)
    }

    /// Persist the full state.
    pub fn save(&self) -> Result<()> {
        write_state(&self.paths.state_path, &self.state)
    }

    /// `SPEC.md`, or the stored spec as JSON when it has not been written.
    pub fn spec_text(&self) -> Result<String> {
        if self.paths.spec_md_path.exists() {
            return read_text_or_empty(&self.paths.spec_md_path);
        }
        match &self.state.spec {
            Some(spec) => serde_json::to_string_pretty(spec).context("serialize spec"),
            None => Ok(String::new()),
        }
    }

    /// `RISKS.md`, empty when missing.
    pub fn risks_text(&self) -> Result<String> {
        read_text_or_empty(&self.paths.risks_md_path)
    }

    /// Panel with the body cut to `display_limit_bytes`.
    pub fn show(&self, title: &str, body: &str) {
        self.human
            .panel(title, &truncate_for_display(body, self.config.display_limit_bytes));
    }
}
