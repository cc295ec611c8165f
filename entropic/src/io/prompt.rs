//! Prompt rendering for oracle calls.
//!
//! Templates are embedded minijinja sources. Each is split into sections by
//! `<!-- section:KEY required|droppable -->` markers so a prompt that exceeds
//! the byte budget can shed context without losing the contract or request.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

const TEMPLATES: &[(&str, &str)] = &[
    ("step_contract", include_str!("prompts/step_contract.md")),
    ("spec", include_str!("prompts/spec.md")),
    ("risk_scan", include_str!("prompts/risk_scan.md")),
    ("experiment", include_str!("prompts/experiment.md")),
    ("implement", include_str!("prompts/implement.md")),
    ("repair", include_str!("prompts/repair.md")),
    ("file_content", include_str!("prompts/file_content.md")),
    ("done_check", include_str!("prompts/done_check.md")),
    ("fix_json", include_str!("prompts/fix_json.md")),
];

/// Droppable sections, least valuable first.
const DROP_ORDER: &[&str] = &["history", "risks", "hint", "spec"];

/// Which prompt to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Spec,
    RiskScan,
    Experiment,
    Implement,
    Repair,
    FileContent,
    DoneCheck,
    FixJson,
}

impl PromptKind {
    fn template_name(self) -> &'static str {
        match self {
            PromptKind::Spec => "spec",
            PromptKind::RiskScan => "risk_scan",
            PromptKind::Experiment => "experiment",
            PromptKind::Implement => "implement",
            PromptKind::Repair => "repair",
            PromptKind::FileContent => "file_content",
            PromptKind::DoneCheck => "done_check",
            PromptKind::FixJson => "fix_json",
        }
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section body, marker excluded.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex is valid")
    });

    let markers: Vec<_> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
                whole.start(),
                whole.end(),
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (key, required, _, body_start)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|(_, _, start, _)| *start)
            .unwrap_or(rendered.len());
        let content = rendered[*body_start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in `DROP_ORDER` until within budget, then truncate
/// the largest remaining section as a last resort.
fn apply_budget(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let overflow = total - budget;
    let before_len = largest.content.len();
    let mut keep = before_len.saturating_sub(overflow + 12);
    while !largest.content.is_char_boundary(keep) {
        keep -= 1;
    }
    largest.content.truncate(keep);
    largest.content.push_str("\n[truncated]");
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders prompts within a byte budget.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)
                .with_context(|| format!("load prompt template {name}"))?;
        }
        Ok(Self { env, budget_bytes })
    }

    pub fn render<S: Serialize>(&self, kind: PromptKind, ctx: S) -> Result<String> {
        let name = kind.template_name();
        let rendered = self
            .env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .with_context(|| format!("render prompt {name}"))?;
        let mut sections = parse_sections(&rendered);
        apply_budget(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
