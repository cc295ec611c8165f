//! Choice of the single next unit of work.

use crate::core::entropy::ScoredRisk;
use crate::core::state::AgentState;

/// What the run loop should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Focus {
    /// A high-entropy risk with questions only the user can answer.
    AskUserAboutRisk(ScoredRisk),
    /// A high-entropy risk that a local experiment can shrink.
    ExperimentForRisk(ScoredRisk),
    /// The backlog head.
    ImplementTask(String),
    DoneCheck,
}

impl Focus {
    pub fn label(&self) -> &'static str {
        match self {
            Focus::AskUserAboutRisk(_) => "ask_user_about_risk",
            Focus::ExperimentForRisk(_) => "experiment_for_risk",
            Focus::ImplementTask(_) => "implement_task",
            Focus::DoneCheck => "done_check",
        }
    }
}

/// Walk the high-entropy risks in stored order; the first one with
/// questions or experiments wins, questions first within a risk. Then the
/// backlog head, then a done check. Ids missing from `risks` are skipped.
pub fn next_focus(state: &AgentState) -> Focus {
    for risk in state
        .high_entropy_risk_ids
        .iter()
        .filter_map(|id| state.risk(id))
    {
        if !risk.risk.user_questions.is_empty() {
            return Focus::AskUserAboutRisk(risk.clone());
        }
        if !risk.risk.suggested_experiments.is_empty() {
            return Focus::ExperimentForRisk(risk.clone());
        }
    }
    match state.tasks.first() {
        Some(task) => Focus::ImplementTask(task.clone()),
        None => Focus::DoneCheck,
    }
}
