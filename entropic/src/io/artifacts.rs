//! Human-readable `SPEC.md` and `RISKS.md`.
//!
//! Rendering is pure; the write helpers only persist the rendered text.

use std::path::Path;

use anyhow::Result;

use crate::core::state::AgentState;
use crate::core::types::ProjectSpec;
use crate::io::workspace::write_text;

pub fn render_spec_md(goal: &str, spec: &ProjectSpec, state: &AgentState) -> String {
    let mut lines = vec![
        "# SPEC".to_string(),
        String::new(),
        format!("## Goal\n{goal}"),
        String::new(),
        "## Definition of Done".to_string(),
    ];
    lines.extend(state.done_criteria.iter().map(|c| format!("- {c}")));
    lines.push(String::new());
    lines.push("## Constraints".to_string());
    lines.extend(spec.constraints.iter().map(|c| format!("- {c}")));
    lines.push(String::new());
    lines.push("## Assumptions".to_string());
    lines.extend(spec.assumptions.iter().map(|a| format!("- {a}")));
    lines.push(String::new());
    lines.push("## Clarifications (answers)".to_string());
    lines.extend(state.answers.iter().map(|(id, a)| format!("- {id}: {a}")));
    lines.push(String::new());
    lines.push("## Initial tasks".to_string());
    lines.extend(spec.initial_tasks.iter().map(|t| format!("- {t}")));
    lines.push(String::new());
    lines.join("\n")
}

/// One bullet per ranked risk; high-entropy risks are marked `[!]`.
pub fn render_risks_md(state: &AgentState) -> String {
    let mut lines = vec!["# RISKS".to_string(), String::new()];
    for scored in &state.risks {
        let risk = &scored.risk;
        let mark = if state.high_entropy_risk_ids.contains(&risk.id) {
            "[!]"
        } else {
            "[ ]"
        };
        lines.push(format!(
            "- {mark} [{}] {} ({})  (confidence={:.2}, appear={:.2}, entropy={:.2})",
            risk.severity.as_str(),
            risk.title,
            risk.id,
            risk.confidence,
            scored.entropy.appear_frac,
            scored.entropy.score,
        ));
        lines.push(format!("  - area: {}", risk.area));
        lines.push(format!("  - {}", risk.description));
        lines.extend(risk.user_questions.iter().map(|q| format!("  - ask_user: {q}")));
        lines.extend(
            risk.suggested_experiments
                .iter()
                .map(|e| format!("  - experiment: {e}")),
        );
        if state.is_resolved(&risk.id) {
            lines.push("  - resolved".to_string());
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

pub fn write_spec_md(path: &Path, goal: &str, spec: &ProjectSpec, state: &AgentState) -> Result<String> {
    let text = render_spec_md(goal, spec, state);
    write_text(path, &text)?;
    Ok(text)
}

pub fn write_risks_md(path: &Path, state: &AgentState) -> Result<String> {
    let text = render_risks_md(state);
    write_text(path, &text)?;
    Ok(text)
}
