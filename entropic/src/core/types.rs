//! Structured proposal types exchanged with the oracle.
//!
//! These mirror the JSON Schemas under `schemas/` one to one. They carry no
//! behavior beyond small predicates and must stay deterministic to serialize.

use serde::{Deserialize, Serialize};

/// How a clarifying question expects to be answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    #[default]
    FreeText,
    YesNo,
    Choice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub id: String,
    pub question: String,
    pub why: String,
    #[serde(default)]
    pub answer_type: AnswerType,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// Spec proposed for the goal on first run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub goal: String,
    pub definition_of_done: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub clarifying_questions: Vec<ClarifyingQuestion>,
    #[serde(default)]
    pub initial_tasks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Multiplicative weight applied to the entropy score.
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 0.2,
            Severity::Medium => 0.5,
            Severity::High => 0.8,
            Severity::Critical => 1.0,
        }
    }

    pub fn is_severe(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    AskUser,
    Experiment,
    WriteTests,
    DesignDecision,
}

/// One hypothesized unknown, as proposed by a single sampling pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: String,
    pub area: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    /// Self-reported certainty in `[0, 1]`.
    pub confidence: f64,
    /// What would we observe if this risk is real?
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub resolution_modes: Vec<ResolutionMode>,
    #[serde(default)]
    pub user_questions: Vec<String>,
    #[serde(default)]
    pub suggested_experiments: Vec<String>,
}

/// One independently sampled set of risks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRegister {
    pub risks: Vec<Risk>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Overwrite,
    CreateOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrite {
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mode: WriteMode,
}

impl FileWrite {
    /// True when the content is deferred: empty, blank, or a `TBD`/`TODO` placeholder.
    pub fn needs_content(&self) -> bool {
        let trimmed = self.content.trim();
        trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("tbd")
            || trimmed.eq_ignore_ascii_case("todo")
    }
}

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

fn default_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub cmd: String,
    pub purpose: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_sec: u64,
}

/// One small, independently verifiable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPlan {
    pub step_goal: String,
    pub rationale: String,
    #[serde(default)]
    pub file_writes: Vec<FileWrite>,
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(default)]
    pub expected_outcomes: Vec<String>,
    #[serde(default)]
    pub new_tasks: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Backlog task this plan is meant to close. Bound by the run loop, never by the oracle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closes_task: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneCheck {
    pub done: bool,
    pub rationale: String,
    #[serde(default)]
    pub remaining_gaps: Vec<String>,
    #[serde(default)]
    pub next_tasks: Vec<String>,
}
