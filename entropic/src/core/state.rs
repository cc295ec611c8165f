//! Durable agent state (`.entropic/state.json`).
//!
//! The run loop is the only writer. Append-only fields (`answers`, `history`)
//! are never rewritten in place; `goal` is fixed at creation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::entropy::ScoredRisk;
use crate::core::types::{ProjectSpec, StepPlan};

/// Exit sentinel recorded for a command killed on timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Outcome of one planned command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed {
        cmd: String,
        exit: i32,
        output: String,
    },
    TimedOut {
        cmd: String,
        exit: i32,
        timeout_secs: u64,
        output: String,
    },
    /// Blocked by policy and not run.
    Skipped { cmd: String, reason: String },
}

impl CommandOutcome {
    pub fn timed_out(cmd: impl Into<String>, timeout_secs: u64, partial: &str) -> Self {
        let mut output = format!("TIMEOUT after {timeout_secs}s");
        if !partial.is_empty() {
            output.push('\n');
            output.push_str(partial);
        }
        CommandOutcome::TimedOut {
            cmd: cmd.into(),
            exit: TIMEOUT_EXIT_CODE,
            timeout_secs,
            output,
        }
    }

    pub fn cmd(&self) -> &str {
        match self {
            CommandOutcome::Completed { cmd, .. }
            | CommandOutcome::TimedOut { cmd, .. }
            | CommandOutcome::Skipped { cmd, .. } => cmd,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Completed { exit: 0, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    Step {
        step: StepPlan,
        cmd_outputs: Vec<CommandOutcome>,
    },
    RiskUserAnswers {
        risk_id: String,
        answers: Vec<QuestionAnswer>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub goal: String,
    #[serde(default)]
    pub spec: Option<ProjectSpec>,
    /// Clarifying question id to answer.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// FIFO backlog; the head is the next task to implement.
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub done_criteria: Vec<String>,
    /// Ranked by entropy score, highest first.
    #[serde(default)]
    pub risks: Vec<ScoredRisk>,
    #[serde(default)]
    pub high_entropy_risk_ids: Vec<String>,
    /// Risks already asked about or experimented on.
    #[serde(default)]
    pub resolved_risk_ids: Vec<String>,
    /// Completed run-loop iterations across all sessions.
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl AgentState {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            spec: None,
            answers: BTreeMap::new(),
            tasks: Vec::new(),
            done_criteria: Vec::new(),
            risks: Vec::new(),
            high_entropy_risk_ids: Vec::new(),
            resolved_risk_ids: Vec::new(),
            iterations: 0,
            history: Vec::new(),
        }
    }

    pub fn risk(&self, id: &str) -> Option<&ScoredRisk> {
        self.risks.iter().find(|r| r.risk.id == id)
    }

    /// The most recent `step` entry, skipping answer entries.
    pub fn latest_step(&self) -> Option<(&StepPlan, &[CommandOutcome])> {
        self.history.iter().rev().find_map(|entry| match entry {
            HistoryEntry::Step { step, cmd_outputs } => Some((step, cmd_outputs.as_slice())),
            HistoryEntry::RiskUserAnswers { .. } => None,
        })
    }

    /// Last `n` history entries in chronological order.
    pub fn recent_history(&self, n: usize) -> &[HistoryEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    /// Drop `id` from the high-entropy set and remember it as resolved.
    pub fn resolve_risk(&mut self, id: &str) {
        self.high_entropy_risk_ids.retain(|x| x != id);
        if !self.resolved_risk_ids.iter().any(|x| x == id) {
            self.resolved_risk_ids.push(id.to_string());
        }
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.resolved_risk_ids.iter().any(|x| x == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::step_plan;

    fn step_entry(goal: &str) -> HistoryEntry {
        HistoryEntry::Step {
            step: step_plan(goal),
            cmd_outputs: vec![CommandOutcome::Completed {
                cmd: "pytest".to_string(),
                exit: 1,
                output: format!("{goal} failed"),
            }],
        }
    }

    #[test]
    fn latest_step_skips_answer_entries() {
        let mut state = AgentState::new("goal");
        assert!(state.latest_step().is_none());

        state.history.push(step_entry("first"));
        state.history.push(step_entry("second"));
        state.history.push(HistoryEntry::RiskUserAnswers {
            risk_id: "R1".to_string(),
            answers: Vec::new(),
        });

        let (step, outputs) = state.latest_step().expect("step entry");
        assert_eq!(step.step_goal, "second");
        assert_eq!(outputs[0].cmd(), "pytest");
    }

    #[test]
    fn history_entries_are_tagged() {
        let entry = HistoryEntry::RiskUserAnswers {
            risk_id: "R1".to_string(),
            answers: vec![QuestionAnswer {
                question: "Which DB?".to_string(),
                answer: "sqlite".to_string(),
            }],
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["type"], "risk_user_answers");

        let json = serde_json::to_value(step_entry("g")).expect("serialize");
        assert_eq!(json["type"], "step");
        assert_eq!(json["cmd_outputs"][0]["outcome"], "completed");
    }

    #[test]
    fn timeout_outcome_carries_sentinel_and_text() {
        let outcome = CommandOutcome::timed_out("pytest", 5, "");
        assert!(!outcome.is_success());
        let CommandOutcome::TimedOut { exit, output, .. } = &outcome else {
            panic!("expected timed out outcome");
        };
        assert_eq!(*exit, TIMEOUT_EXIT_CODE);
        assert_eq!(output, "TIMEOUT after 5s");
    }

    #[test]
    fn resolve_risk_is_idempotent() {
        let mut state = AgentState::new("goal");
        state.high_entropy_risk_ids = vec!["R1".to_string(), "R2".to_string()];
        state.resolve_risk("R1");
        state.resolve_risk("R1");
        assert_eq!(state.high_entropy_risk_ids, vec!["R2"]);
        assert_eq!(state.resolved_risk_ids, vec!["R1"]);
        assert!(state.is_resolved("R1"));
    }

    #[test]
    fn recent_history_is_bounded() {
        let mut state = AgentState::new("goal");
        for goal in ["a", "b", "c", "d"] {
            state.history.push(step_entry(goal));
        }
        assert_eq!(state.recent_history(3).len(), 3);
        assert_eq!(state.recent_history(10).len(), 4);
    }
}
