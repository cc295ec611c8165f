//! Test-only helpers: builders, scripted oracle backend, scripted human and
//! scratch workspaces.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tempfile::TempDir;

use crate::core::entropy::{EntropyAnnotation, ScoredRisk};
use crate::core::types::{ProjectSpec, Risk, RiskRegister, Severity, StepPlan};
use crate::io::backend::{Backend, BackendRequest};
use crate::io::config::SamplingProfile;
use crate::io::human::{Human, parse_choice};
use crate::io::paths::WorkspacePaths;

/// Medium-severity risk with confidence 0.5 and no resolution hints.
pub fn risk(id: &str, title: &str) -> Risk {
    Risk {
        id: id.to_string(),
        area: "general".to_string(),
        title: title.to_string(),
        description: format!("{title} description"),
        severity: Severity::Medium,
        confidence: 0.5,
        signals: Vec::new(),
        resolution_modes: Vec::new(),
        user_questions: Vec::new(),
        suggested_experiments: Vec::new(),
    }
}

pub fn register(risks: Vec<Risk>) -> RiskRegister {
    RiskRegister { risks }
}

/// A scored risk with an explicit score; `appear_frac` is fixed at 1.
pub fn scored(id: &str, title: &str, severity: Severity, score: f64) -> ScoredRisk {
    let mut risk = risk(id, title);
    risk.severity = severity;
    ScoredRisk {
        risk,
        entropy: EntropyAnnotation {
            appear_frac: 1.0,
            score,
            samples: 3,
        },
        last_seen_iter: None,
    }
}

/// Step plan with no files and no commands.
pub fn step_plan(goal: &str) -> StepPlan {
    StepPlan {
        step_goal: goal.to_string(),
        rationale: format!("because {goal}"),
        file_writes: Vec::new(),
        commands: Vec::new(),
        expected_outcomes: Vec::new(),
        new_tasks: Vec::new(),
        notes: Vec::new(),
        closes_task: None,
    }
}

pub fn project_spec(tasks: &[&str]) -> ProjectSpec {
    ProjectSpec {
        goal: "goal".to_string(),
        definition_of_done: vec!["tests pass".to_string()],
        constraints: vec!["local only".to_string()],
        assumptions: vec!["python 3".to_string()],
        clarifying_questions: Vec::new(),
        initial_tasks: tasks.iter().map(|t| t.to_string()).collect(),
    }
}

/// One scripted oracle answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Written verbatim as the backend's final message.
    Raw(String),
    /// The backend process fails with this message.
    Fail(String),
}

impl Reply {
    pub fn raw(text: impl Into<String>) -> Self {
        Reply::Raw(text.into())
    }

    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(text) => Reply::Raw(text),
            Err(err) => Reply::Fail(format!("unserializable scripted reply: {err}")),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Reply::Fail(message.into())
    }
}

/// Backend that replays queued replies and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<Reply>>,
    requests: RefCell<Vec<BackendRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.prompt.clone()).collect()
    }

    pub fn purposes(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.purpose.clone()).collect()
    }

    pub fn profiles(&self) -> Vec<SamplingProfile> {
        self.requests.borrow().iter().map(|r| r.profile.clone()).collect()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let left = self.replies.borrow().len();
        if left > 0 {
            bail!("{left} scripted backend replies were not consumed");
        }
        Ok(())
    }
}

impl Backend for ScriptedBackend {
    fn exec(&self, request: &BackendRequest) -> Result<()> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left for {}", request.purpose))?;
        match reply {
            Reply::Raw(text) => {
                if let Some(parent) = request.output_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&request.output_path, text)
                    .with_context(|| format!("write {}", request.output_path.display()))
            }
            Reply::Fail(message) => Err(anyhow!(message)),
        }
    }
}

/// Human that replays queued answers and records what it was shown.
///
/// `confirm` treats answers starting with `y` as yes; `choose` accepts a
/// 1-based number or the choice text itself. `acknowledge` consumes nothing.
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: RefCell<VecDeque<String>>,
    asked: RefCell<Vec<String>>,
    panels: RefCell<Vec<(String, String)>>,
    acknowledged: RefCell<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: RefCell::new(answers.iter().map(|a| a.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Prompts passed to `ask_text`, `confirm` and `choose`, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }

    pub fn panel_titles(&self) -> Vec<String> {
        self.panels.borrow().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn panels(&self) -> Vec<(String, String)> {
        self.panels.borrow().clone()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.borrow().clone()
    }

    pub fn assert_drained(&self) -> Result<()> {
        let left = self.answers.borrow().len();
        if left > 0 {
            bail!("{left} scripted human answers were not consumed");
        }
        Ok(())
    }

    fn next(&self, prompt: &str) -> Result<String> {
        self.asked.borrow_mut().push(prompt.to_string());
        self.answers
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer left for {prompt:?}"))
    }
}

impl Human for ScriptedHuman {
    fn panel(&self, title: &str, body: &str) {
        self.panels
            .borrow_mut()
            .push((title.to_string(), body.to_string()));
    }

    fn ask_text(&self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        Ok(self.next(prompt)?.to_lowercase().starts_with('y'))
    }

    fn choose(&self, prompt: &str, choices: &[String]) -> Result<String> {
        let answer = self.next(prompt)?;
        Ok(parse_choice(&answer, choices).unwrap_or(answer))
    }

    fn acknowledge(&self, prompt: &str) -> Result<()> {
        self.acknowledged.borrow_mut().push(prompt.to_string());
        Ok(())
    }
}

/// Scratch workspace rooted in a temp dir.
pub struct TestWorkspace {
    _temp: TempDir,
    pub paths: WorkspacePaths,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let paths = WorkspacePaths::new(temp.path());
        paths.ensure_dirs()?;
        Ok(Self { _temp: temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn write_file(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read_file(&self, relative: &str) -> Result<String> {
        let path = self.root().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
