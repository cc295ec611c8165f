//! Risk scan: sample registers, score disagreement, pick the high-entropy set.

use anyhow::{Context, Result, bail};
use minijinja::context;
use tracing::info;

use crate::core::entropy::{merge_risks, score_registers, select_high_entropy_ids};
use crate::core::types::RiskRegister;
use crate::io::artifacts::write_risks_md;
use crate::io::backend::Backend;
use crate::io::human::Human;
use crate::io::prompt::PromptKind;
use crate::oracle::{Profile, SchemaKind};
use crate::session::Session;

/// History entries shown to a rescan.
const RESCAN_HISTORY_ENTRIES: usize = 3;

/// Whether a scan replaces or folds into the stored ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Fresh,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub risks: usize,
    pub high_entropy: Vec<String>,
}

/// Sample `risk_samples` registers with the scan profile and rank them.
///
/// Resolved risks never re-enter the high-entropy set. Writes `RISKS.md`.
pub fn scan_risks<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    mode: ScanMode,
) -> Result<ScanSummary> {
    if session.state.spec.is_none() {
        bail!("cannot scan risks before a spec has been collected");
    }

    let samples = session.config.risk_samples;
    let spec = session.spec_text()?;
    let history = match mode {
        ScanMode::Fresh => String::new(),
        ScanMode::Merge => {
            let recent = session.state.recent_history(RESCAN_HISTORY_ENTRIES);
            if recent.is_empty() {
                String::new()
            } else {
                serde_json::to_string_pretty(recent).context("serialize history")?
            }
        }
    };

    let mut registers: Vec<RiskRegister> = Vec::with_capacity(samples);
    for sample in 1..=samples {
        let prompt = session.oracle.prompts().render(
            PromptKind::RiskScan,
            context! {
                spec => spec,
                history => history,
                sample => sample,
                samples => samples,
            },
        )?;
        let register: RiskRegister = session.oracle.propose(
            &format!("Risk register sample {sample}/{samples}"),
            SchemaKind::RiskRegister,
            &prompt,
            Profile::Scan,
        )?;
        registers.push(register);
    }

    let scored = score_registers(&registers, samples);
    session.state.risks = match mode {
        ScanMode::Fresh => scored,
        ScanMode::Merge => merge_risks(
            &session.state.risks,
            scored,
            Some(session.state.iterations),
        ),
    };
    let state = &mut session.state;
    let mut high = select_high_entropy_ids(&state.risks, &session.config.thresholds);
    high.retain(|id| !state.is_resolved(id));
    state.high_entropy_risk_ids = high;
    session.save()?;

    let md = write_risks_md(&session.paths.risks_md_path, &session.state)?;
    session.worklog.append("Built risk register", &md)?;
    info!(
        ?mode,
        risks = session.state.risks.len(),
        high_entropy = session.state.high_entropy_risk_ids.len(),
        "wrote RISKS.md"
    );
    Ok(ScanSummary {
        risks: session.state.risks.len(),
        high_entropy: session.state.high_entropy_risk_ids.clone(),
    })
}
