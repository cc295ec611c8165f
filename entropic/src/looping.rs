//! The run loop: bootstrap, then resolve one focus per iteration until the
//! oracle declares the goal done or `max_iters` is reached.

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{info, warn};

use crate::core::backlog::append_unique_tasks;
use crate::core::entropy::ScoredRisk;
use crate::core::focus::{Focus, next_focus};
use crate::core::state::{HistoryEntry, QuestionAnswer};
use crate::core::types::{DoneCheck, StepPlan};
use crate::intake::collect_spec;
use crate::io::backend::Backend;
use crate::io::human::Human;
use crate::io::prompt::PromptKind;
use crate::oracle::{Profile, SchemaKind};
use crate::repair::execute_with_repair;
use crate::scan::{ScanMode, scan_risks};
use crate::session::Session;

/// Tasks from the front of the backlog shown to the done check.
const DONE_CHECK_TASKS: usize = 20;
/// History entries shown to the done check.
const DONE_CHECK_HISTORY: usize = 3;
const TASK_PREVIEW_CHARS: usize = 80;

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The done check declared the goal met.
    Done { rationale: String },
    /// `max_iters` iterations ran without a done verdict.
    MaxIterations { max_iters: u32 },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Iterations run by this invocation.
    pub iterations: u32,
    pub stop: LoopStop,
}

/// Bootstrap the workspace, then iterate.
///
/// Each iteration fully resolves one [`Focus`] and persists the state.
/// Reaching `max_iters` is a normal stop, not an error.
pub fn run_loop<B: Backend, H: Human>(session: &mut Session<B, H>) -> Result<LoopOutcome> {
    collect_spec(session)?;
    if session.state.risks.is_empty() {
        scan_risks(session, ScanMode::Fresh)?;
    }

    let max_iters = session.config.max_iters;
    for iteration in 1..=max_iters {
        let focus = next_focus(&session.state);
        info!(iteration, max_iters, focus = focus.label(), "iteration");
        let verdict = match focus {
            Focus::AskUserAboutRisk(risk) => {
                ask_user_about_risk(session, &risk)?;
                None
            }
            Focus::ExperimentForRisk(risk) => {
                experiment_for_risk(session, &risk)?;
                None
            }
            Focus::ImplementTask(task) => {
                implement_task(session, &task)?;
                None
            }
            Focus::DoneCheck => Some(check_done(session)?),
        };
        session.state.iterations += 1;
        session.save()?;

        if let Some(done) = verdict.filter(|d| d.done) {
            info!(iteration, "goal complete per definition of done");
            return Ok(LoopOutcome {
                iterations: iteration,
                stop: LoopStop::Done {
                    rationale: done.rationale,
                },
            });
        }
    }

    warn!(max_iters, "reached max_iters without declaring done");
    Ok(LoopOutcome {
        iterations: max_iters,
        stop: LoopStop::MaxIterations { max_iters },
    })
}

/// Ask each of the risk's questions, record the answers and resolve it.
fn ask_user_about_risk<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    scored: &ScoredRisk,
) -> Result<()> {
    let risk = &scored.risk;
    let listing = risk
        .user_questions
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n");
    session.human.panel(
        &format!("High-entropy risk needs input: {}", risk.title),
        &listing,
    );

    let total = risk.user_questions.len();
    let mut answers = Vec::with_capacity(total);
    for (i, question) in risk.user_questions.iter().enumerate() {
        let answer = session
            .human
            .ask_text(&format!("({}/{total}) {question}", i + 1))?;
        answers.push(QuestionAnswer {
            question: question.clone(),
            answer,
        });
    }

    session.worklog.append_json(
        &format!("User input for risk {}: {}", risk.id, risk.title),
        &answers,
    )?;
    session.state.history.push(HistoryEntry::RiskUserAnswers {
        risk_id: risk.id.clone(),
        answers,
    });
    session.state.resolve_risk(&risk.id);
    session.save()
}

/// Plan and run one experiment for the risk, then resolve it whatever the
/// outcome.
fn experiment_for_risk<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    scored: &ScoredRisk,
) -> Result<()> {
    let prompt = session.oracle.prompts().render(
        PromptKind::Experiment,
        context! {
            spec => session.spec_text()?,
            risk => serde_json::to_string_pretty(scored).context("serialize risk")?,
            risks => session.risks_text()?,
        },
    )?;
    let step: StepPlan = session.oracle.propose(
        &format!(
            "Planning experiment for risk {}: {}",
            scored.risk.id, scored.risk.title
        ),
        SchemaKind::StepPlan,
        &prompt,
        Profile::Planning,
    )?;

    let outcome = execute_with_repair(session, step)?;
    info!(risk = %scored.risk.id, converged = outcome.converged(), "experiment finished");
    session.state.resolve_risk(&scored.risk.id);
    session.save()
}

/// Plan one small step for the backlog head, bound to close it.
fn implement_task<B: Backend, H: Human>(session: &mut Session<B, H>, task: &str) -> Result<()> {
    let prompt = session.oracle.prompts().render(
        PromptKind::Implement,
        context! {
            spec => session.spec_text()?,
            risks => session.risks_text()?,
            task => task,
        },
    )?;
    let mut step: StepPlan = session.oracle.propose(
        &format!("Planning step for task: {}", preview(task, TASK_PREVIEW_CHARS)),
        SchemaKind::StepPlan,
        &prompt,
        Profile::Planning,
    )?;
    step.closes_task = Some(task.to_string());

    let outcome = execute_with_repair(session, step)?;
    info!(converged = outcome.converged(), repairs = outcome.repairs, "task step finished");
    Ok(())
}

/// Ask for a done verdict; when not done, queue the suggested next tasks.
fn check_done<B: Backend, H: Human>(session: &mut Session<B, H>) -> Result<DoneCheck> {
    let tasks: Vec<&String> = session.state.tasks.iter().take(DONE_CHECK_TASKS).collect();
    let recent = session.state.recent_history(DONE_CHECK_HISTORY);
    let history = if recent.is_empty() {
        String::new()
    } else {
        serde_json::to_string_pretty(recent).context("serialize history")?
    };
    let prompt = session.oracle.prompts().render(
        PromptKind::DoneCheck,
        context! {
            spec => session.spec_text()?,
            tasks => tasks,
            history => history,
        },
    )?;
    let verdict: DoneCheck = session.oracle.propose(
        "Done check",
        SchemaKind::DoneCheck,
        &prompt,
        Profile::Planning,
    )?;

    let mut body = format!("done={}\n\n{}", verdict.done, verdict.rationale);
    if !verdict.remaining_gaps.is_empty() {
        body.push_str("\n\nRemaining gaps:\n- ");
        body.push_str(&verdict.remaining_gaps.join("\n- "));
    }
    session.human.panel("Done check", &body);
    session.worklog.append_json("Done check", &verdict)?;

    if !verdict.done {
        let added = append_unique_tasks(&mut session.state.tasks, &verdict.next_tasks);
        info!(added, gaps = verdict.remaining_gaps.len(), "not done yet");
    }
    session.save()?;
    Ok(verdict)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
