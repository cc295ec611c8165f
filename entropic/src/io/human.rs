//! Blocking human interaction.
//!
//! The [`Human`] trait decouples the run loop from the terminal. Tests use a
//! scripted human that replays queued answers.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};

/// Request/response interface to the operator.
pub trait Human {
    /// Show a titled block of text.
    fn panel(&self, title: &str, body: &str);
    /// Free-text answer, trimmed.
    fn ask_text(&self, prompt: &str) -> Result<String>;
    /// Yes/no confirmation.
    fn confirm(&self, prompt: &str) -> Result<bool>;
    /// One of `choices`. Callers guarantee `choices` is non-empty.
    fn choose(&self, prompt: &str, choices: &[String]) -> Result<String>;
    /// Block until the operator acknowledges.
    fn acknowledge(&self, prompt: &str) -> Result<()>;
}

/// Terminal human: prompts and panels on stderr, answers from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalHuman;

impl TerminalHuman {
    fn read_line(&self, prompt: &str) -> Result<String> {
        let mut err = std::io::stderr().lock();
        write!(err, "{prompt}").context("write prompt")?;
        err.flush().context("flush prompt")?;
        let mut line = String::new();
        let n = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read stdin")?;
        if n == 0 {
            bail!("stdin closed while waiting for input");
        }
        Ok(line.trim().to_string())
    }
}

impl Human for TerminalHuman {
    fn panel(&self, title: &str, body: &str) {
        eprintln!("{}", render_panel(title, body));
    }

    fn ask_text(&self, prompt: &str) -> Result<String> {
        self.read_line(&format!("\n{prompt}\n> "))
    }

    fn confirm(&self, prompt: &str) -> Result<bool> {
        let answer = self.read_line(&format!("{prompt} (y/n): "))?;
        Ok(answer.to_lowercase().starts_with('y'))
    }

    fn choose(&self, prompt: &str, choices: &[String]) -> Result<String> {
        let mut listing = format!("\n{prompt}\n");
        for (i, choice) in choices.iter().enumerate() {
            listing.push_str(&format!("  {}. {choice}\n", i + 1));
        }
        listing.push_str("Choose number: ");
        let answer = self.read_line(&listing)?;
        if let Some(choice) = parse_choice(&answer, choices) {
            return Ok(choice);
        }
        self.read_line("Enter choice text: ")
    }

    fn acknowledge(&self, prompt: &str) -> Result<()> {
        self.read_line(prompt).map(|_| ())
    }
}

/// 1-based selection from `choices`.
pub fn parse_choice(answer: &str, choices: &[String]) -> Option<String> {
    let idx: usize = answer.trim().parse().ok()?;
    choices.get(idx.checked_sub(1)?).cloned()
}

/// Boxed panel sized to the widest line.
pub fn render_panel(title: &str, body: &str) -> String {
    let width = body
        .lines()
        .chain(std::iter::once(title))
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        + 3;
    let mut out = String::new();
    let title_fill = width.saturating_sub(title.chars().count() + 2);
    out.push_str(&format!("+- {title} {}+\n", "-".repeat(title_fill.saturating_sub(1))));
    for line in body.lines() {
        let pad = width - line.chars().count();
        out.push_str(&format!("| {line}{}|\n", " ".repeat(pad.saturating_sub(1))));
    }
    out.push_str(&format!("+{}+", "-".repeat(width)));
    out
}
