//! Bounded repair around step execution, with escalation to the operator.

use anyhow::{Context, Result};
use minijinja::context;
use tracing::{error, info, warn};

use crate::core::types::StepPlan;
use crate::execute::execute_step;
use crate::io::backend::Backend;
use crate::io::human::Human;
use crate::io::prompt::PromptKind;
use crate::oracle::{Profile, SchemaKind};
use crate::session::Session;

const ESCALATION_TITLE: &str = "Needs human intervention";

/// Where a step is in its repair cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairPhase {
    Executing,
    Repairing,
    Converged,
    Escalated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairOutcome {
    /// `Converged` or `Escalated`.
    pub phase: RepairPhase,
    /// Repair plans that were requested.
    pub repairs: u32,
}

impl RepairOutcome {
    pub fn converged(&self) -> bool {
        self.phase == RepairPhase::Converged
    }
}

/// Execute `step`, then request and execute corrective steps until one
/// succeeds or `max_repairs_per_step` is spent.
///
/// A repair plan inherits the failed plan's `closes_task`. When no repair
/// plan can be produced the cycle stops at once. An unsuccessful end is
/// reported to the operator (and acknowledged outside auto mode); it is
/// never an error.
pub fn execute_with_repair<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    step: StepPlan,
) -> Result<RepairOutcome> {
    let max_repairs = session.config.max_repairs_per_step;
    let mut step = step;
    let mut repairs = 0;
    let mut phase = RepairPhase::Executing;
    loop {
        phase = match phase {
            RepairPhase::Executing => {
                if execute_step(session, &mut step)? {
                    RepairPhase::Converged
                } else if repairs < max_repairs {
                    RepairPhase::Repairing
                } else {
                    RepairPhase::Escalated
                }
            }
            RepairPhase::Repairing => {
                repairs += 1;
                warn!(repair = repairs, max_repairs, "step failed; attempting repair");
                match plan_repair(session) {
                    Ok(mut repair) => {
                        repair.closes_task = step.closes_task.clone();
                        step = repair;
                        RepairPhase::Executing
                    }
                    Err(err) => {
                        error!(err = %format!("{err:#}"), "repair planning failed");
                        RepairPhase::Escalated
                    }
                }
            }
            RepairPhase::Converged | RepairPhase::Escalated => break,
        };
    }

    if phase == RepairPhase::Escalated {
        escalate(session)?;
    } else {
        info!(repairs, "step converged");
    }
    Ok(RepairOutcome { phase, repairs })
}

/// Ask for one minimal corrective step, seeded with the most recent step
/// entry in history and its command outputs.
pub fn plan_repair<B: Backend, H: Human>(session: &Session<B, H>) -> Result<StepPlan> {
    let (failed, outputs) = session
        .state
        .latest_step()
        .context("no executed step to repair")?;
    let prompt = session.oracle.prompts().render(
        PromptKind::Repair,
        context! {
            spec => session.spec_text()?,
            failed_step => serde_json::to_string_pretty(failed).context("serialize step")?,
            outputs => serde_json::to_string_pretty(outputs).context("serialize outputs")?,
        },
    )?;
    session.oracle.propose(
        "Planning repair step",
        SchemaKind::StepPlan,
        &prompt,
        Profile::Planning,
    )
}

fn escalate<B: Backend, H: Human>(session: &Session<B, H>) -> Result<()> {
    let body = format!(
        "Repairs did not converge. This is likely a high-entropy spot.\n\
         Check logs in {} and consider adding constraints/tests or answering missing questions.",
        session.worklog.path().display()
    );
    warn!("repairs did not converge; escalating");
    session.human.panel(ESCALATION_TITLE, &body);
    session.worklog.append(ESCALATION_TITLE, &body)?;
    if !session.auto {
        session.human.acknowledge("Press Enter to continue...")?;
    }
    Ok(())
}
