//! Step execution: resolve file contents, write files, run commands, record.
//!
//! The phases are strict sequence points. Every file is written (or skipped)
//! before the first command runs, and the history entry is appended only
//! after every command has an outcome.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use minijinja::context;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::backlog::{append_unique_tasks, pop_if_closed};
use crate::core::policy::PolicyDecision;
use crate::core::state::{CommandOutcome, HistoryEntry};
use crate::core::types::{CommandSpec, FileContent, StepPlan, WriteMode};
use crate::io::backend::Backend;
use crate::io::human::Human;
use crate::io::process::{run_bounded, shell};
use crate::io::prompt::PromptKind;
use crate::io::workspace::{read_text_or_empty, resolve_in_workspace, unified_diff, write_text};
use crate::oracle::{Profile, SchemaKind};
use crate::session::Session;

/// Apply `step` to the workspace and record it. Returns whether it succeeded.
///
/// A step fails when a file path is rejected or any command exits non-zero,
/// times out or is skipped. `step` is updated in place with resolved file
/// contents.
#[instrument(skip_all, fields(step_goal = %step.step_goal))]
pub fn execute_step<B: Backend, H: Human>(
    session: &mut Session<B, H>,
    step: &mut StepPlan,
) -> Result<bool> {
    session.human.panel(
        "Step goal",
        &format!("{}\n\n{}", step.step_goal, step.rationale),
    );

    resolve_file_contents(session, step)?;
    let files_ok = apply_file_writes(session, step)?;
    let (outcomes, commands_ok) = run_commands(session, step)?;
    let succeeded = files_ok && commands_ok;

    session.state.history.push(HistoryEntry::Step {
        step: step.clone(),
        cmd_outputs: outcomes.clone(),
    });
    session.worklog.append_json(
        &format!("Executed step: {}", step.step_goal),
        &json!({ "step": step, "cmd_outputs": outcomes }),
    )?;

    let added = append_unique_tasks(&mut session.state.tasks, &step.new_tasks);
    if let Some(task) = pop_if_closed(&mut session.state.tasks, step, succeeded) {
        info!(task = %task, "closed backlog task");
    }
    session.save()?;
    info!(succeeded, new_tasks = added, "step executed");
    Ok(succeeded)
}

/// Discard any content the plan carried and ask the oracle for each file.
fn resolve_file_contents<B: Backend, H: Human>(
    session: &Session<B, H>,
    step: &mut StepPlan,
) -> Result<()> {
    for fw in &mut step.file_writes {
        if !fw.content.trim().is_empty() {
            fw.content.clear();
        }
    }
    for idx in 0..step.file_writes.len() {
        if !step.file_writes[idx].needs_content() {
            continue;
        }
        let path = step.file_writes[idx].path.clone();
        let content = generate_file_content(session, step, &path)?;
        step.file_writes[idx].content = content;
    }
    Ok(())
}

fn generate_file_content<B: Backend, H: Human>(
    session: &Session<B, H>,
    step: &StepPlan,
    path: &str,
) -> Result<String> {
    let prompt = session.oracle.prompts().render(
        PromptKind::FileContent,
        context! {
            spec => session.spec_text()?,
            risks => session.risks_text()?,
            step_goal => step.step_goal,
            rationale => step.rationale,
            expected_outcomes => step.expected_outcomes,
            notes => step.notes,
            path => path,
        },
    )?;
    let file: FileContent = session.oracle.propose(
        &format!("Writing file content: {path}"),
        SchemaKind::FileContent,
        &prompt,
        Profile::Planning,
    )?;
    Ok(file.content)
}

/// Returns false when any path had to be rejected.
fn apply_file_writes<B: Backend, H: Human>(
    session: &Session<B, H>,
    step: &StepPlan,
) -> Result<bool> {
    let mut ok = true;
    for fw in &step.file_writes {
        let target = match resolve_in_workspace(session.paths.root(), &fw.path) {
            Ok(target) => target,
            Err(err) => {
                report_failed_write(session, "Rejected file write", &fw.path, &err)?;
                ok = false;
                continue;
            }
        };
        if fw.mode == WriteMode::CreateOnly && target.exists() {
            warn!(path = %fw.path, "skipping create_only for existing file");
            continue;
        }

        let old = match read_text_or_empty(&target) {
            Ok(old) => old,
            Err(err) => {
                report_failed_write(session, "Failed file write", &fw.path, &err)?;
                ok = false;
                continue;
            }
        };
        if old != fw.content {
            let diff = unified_diff(&old, &fw.content, &fw.path);
            if !diff.trim().is_empty() {
                session.show(&format!("Diff for {}", fw.path), &diff);
            }
            if !session.auto
                && !session
                    .human
                    .confirm(&format!("Apply changes to {}?", fw.path))?
            {
                warn!(path = %fw.path, "user declined file write");
                continue;
            }
        }
        if let Err(err) = write_text(&target, &fw.content) {
            report_failed_write(session, "Failed file write", &fw.path, &err)?;
            ok = false;
            continue;
        }
        info!(path = %fw.path, bytes = fw.content.len(), "wrote file");
    }
    Ok(ok)
}

/// A write that cannot happen fails the step, not the session.
fn report_failed_write<B: Backend, H: Human>(
    session: &Session<B, H>,
    title: &str,
    path: &str,
    err: &anyhow::Error,
) -> Result<()> {
    warn!(path = %path, title, err = %format!("{err:#}"), "file write failed");
    session.worklog.append(title, &format!("{path}: {err:#}"))?;
    session.human.panel(title, &format!("{path}\n{err:#}"));
    Ok(())
}

fn run_commands<B: Backend, H: Human>(
    session: &Session<B, H>,
    step: &StepPlan,
) -> Result<(Vec<CommandOutcome>, bool)> {
    let mut outcomes = Vec::with_capacity(step.commands.len());
    let mut ok = true;
    for command in &step.commands {
        if let PolicyDecision::Deny { reason } = session.policy.classify(&command.cmd) {
            warn!(cmd = %command.cmd, reason = %reason, auto = session.auto, "command blocked by policy");
            let run_anyway = !session.auto && {
                session.human.panel(
                    "Command blocked by policy",
                    &format!("{}\nReason: {reason}", command.cmd),
                );
                session.human.confirm("Run anyway?")?
            };
            if !run_anyway {
                outcomes.push(CommandOutcome::Skipped {
                    cmd: command.cmd.clone(),
                    reason,
                });
                ok = false;
                continue;
            }
        }

        info!(cmd = %command.cmd, purpose = %command.purpose, "running command");
        let outcome = run_planned_command(
            session.paths.root(),
            command,
            session.config.command_output_limit_bytes,
        )?;
        let (exit, output) = match &outcome {
            CommandOutcome::Completed { exit, output, .. }
            | CommandOutcome::TimedOut { exit, output, .. } => (*exit, output.as_str()),
            CommandOutcome::Skipped { reason, .. } => (-1, reason.as_str()),
        };
        session.show(
            &format!("Command output: {} (exit {exit})", command.cmd),
            output,
        );
        ok &= outcome.is_success();
        outcomes.push(outcome);
    }
    Ok((outcomes, ok))
}

/// Run one planned command through `sh -c` in `root`.
///
/// A timeout becomes a [`CommandOutcome::TimedOut`] carrying the partial
/// output; failing to spawn at all is an error.
pub fn run_planned_command(
    root: &Path,
    command: &CommandSpec,
    output_limit_bytes: usize,
) -> Result<CommandOutcome> {
    let output = run_bounded(
        shell(&command.cmd, root),
        None,
        Duration::from_secs(command.timeout_sec),
        output_limit_bytes,
    )
    .with_context(|| format!("run {:?}", command.cmd))?;
    let text = output.combined_text();
    if output.timed_out {
        warn!(cmd = %command.cmd, timeout_secs = command.timeout_sec, "command timed out");
        return Ok(CommandOutcome::timed_out(
            command.cmd.clone(),
            command.timeout_sec,
            &text,
        ));
    }
    Ok(CommandOutcome::Completed {
        cmd: command.cmd.clone(),
        exit: output.exit_code(),
        output: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::TIMEOUT_EXIT_CODE;
    use crate::core::types::FileWrite;
    use crate::io::config::EntropicConfig;
    use crate::session::SessionOptions;
    use crate::test_support::{
        Reply, ScriptedBackend, ScriptedHuman, TestWorkspace, step_plan,
    };

    fn session(
        ws: &TestWorkspace,
        replies: Vec<Reply>,
        answers: &[&str],
        auto: bool,
    ) -> Session<ScriptedBackend, ScriptedHuman> {
        Session::open(
            ws.root(),
            EntropicConfig::default(),
            ScriptedBackend::new(replies),
            ScriptedHuman::new(answers),
            &SessionOptions {
                goal: Some("goal".to_string()),
                auto,
                max_iters: None,
            },
        )
        .expect("session")
    }

    fn write(path: &str, content: &str, mode: WriteMode) -> FileWrite {
        FileWrite {
            path: path.to_string(),
            content: content.to_string(),
            mode,
        }
    }

    fn command(cmd: &str, timeout_sec: u64) -> CommandSpec {
        CommandSpec {
            cmd: cmd.to_string(),
            purpose: "check".to_string(),
            timeout_sec,
        }
    }

    fn content(text: &str) -> Reply {
        Reply::json(&FileContent {
            content: text.to_string(),
        })
    }

    #[test]
    fn placeholder_and_inline_contents_are_regenerated() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(
            &ws,
            vec![content("print('a')\n"), content("print('b')\n")],
            &[],
            true,
        );
        let mut step = step_plan("Add scripts");
        step.file_writes = vec![
            write("a.py", "TODO", WriteMode::Overwrite),
            write("pkg/b.py", "print('inline')", WriteMode::Overwrite),
        ];

        assert!(execute_step(&mut session, &mut step).expect("execute"));
        assert_eq!(ws.read_file("a.py").expect("a"), "print('a')\n");
        assert_eq!(ws.read_file("pkg/b.py").expect("b"), "print('b')\n");
        assert_eq!(step.file_writes[1].content, "print('b')\n");

        let purposes = session.oracle.backend().purposes();
        assert_eq!(purposes, vec!["Writing file content: a.py", "Writing file content: pkg/b.py"]);
        assert!(session.oracle.backend().prompts()[0].contains("Goal: Add scripts"));
    }

    #[test]
    fn create_only_keeps_existing_file() {
        let ws = TestWorkspace::new().expect("ws");
        ws.write_file("keep.txt", "original").expect("seed");
        let mut session = session(&ws, vec![content("new")], &[], true);
        let mut step = step_plan("Touch keep");
        step.file_writes = vec![write("keep.txt", "", WriteMode::CreateOnly)];

        assert!(execute_step(&mut session, &mut step).expect("execute"));
        assert_eq!(ws.read_file("keep.txt").expect("keep"), "original");
    }

    #[test]
    fn interactive_decline_skips_the_write() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, vec![content("x = 1\n")], &["n"], false);
        let mut step = step_plan("Write x");
        step.file_writes = vec![write("x.py", "", WriteMode::Overwrite)];

        assert!(execute_step(&mut session, &mut step).expect("execute"));
        assert!(!ws.root().join("x.py").exists());
        assert!(session.human.panel_titles().contains(&"Diff for x.py".to_string()));
        assert_eq!(session.human.asked(), vec!["Apply changes to x.py?"]);
    }

    #[test]
    fn escaping_paths_fail_the_step_without_writing() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, vec![content("evil"), content("fine")], &[], true);
        let mut step = step_plan("Escape");
        step.file_writes = vec![
            write("../outside.txt", "", WriteMode::Overwrite),
            write("inside.txt", "", WriteMode::Overwrite),
        ];

        assert!(!execute_step(&mut session, &mut step).expect("execute"));
        assert!(!ws.root().join("../outside.txt").exists());
        assert_eq!(ws.read_file("inside.txt").expect("inside"), "fine");
    }

    #[test]
    fn directory_target_fails_the_step_and_is_recorded() {
        let ws = TestWorkspace::new().expect("ws");
        ws.write_file("src/lib.py", "").expect("seed");
        let mut session = session(&ws, vec![content("x"), content("ok\n")], &[], true);
        let mut step = step_plan("Write into a directory");
        step.file_writes = vec![
            write("src", "", WriteMode::Overwrite),
            write("after.txt", "", WriteMode::Overwrite),
        ];

        assert!(!execute_step(&mut session, &mut step).expect("step failure is not an error"));
        assert!(ws.root().join("src").is_dir());
        assert_eq!(ws.read_file("after.txt").expect("after"), "ok\n");
        let (recorded, _) = session.state.latest_step().expect("history");
        assert_eq!(recorded.step_goal, "Write into a directory");
        assert!(session.human.panel_titles().contains(&"Failed file write".to_string()));
        let log = ws.read_file(".entropic/worklog.md").expect("worklog");
        assert!(log.contains("Failed file write"));
    }

    #[test]
    fn auto_mode_never_runs_blocked_commands() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, Vec::new(), &[], true);
        let mut step = step_plan("Clean");
        step.commands = vec![command("echo hi > marker.txt", 5)];

        assert!(!execute_step(&mut session, &mut step).expect("execute"));
        assert!(!ws.root().join("marker.txt").exists());
        let (_, outputs) = session.state.latest_step().expect("history");
        assert!(matches!(
            &outputs[0],
            CommandOutcome::Skipped { reason, .. } if reason.contains("'echo' not in allowlist")
        ));
    }

    #[test]
    fn interactive_override_runs_blocked_command() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, Vec::new(), &["y"], false);
        let mut step = step_plan("Say hi");
        step.commands = vec![command("echo hi", 5)];

        assert!(execute_step(&mut session, &mut step).expect("execute"));
        let (_, outputs) = session.state.latest_step().expect("history");
        assert!(matches!(
            &outputs[0],
            CommandOutcome::Completed { exit: 0, output, .. } if output.contains("hi")
        ));
    }

    #[test]
    fn files_are_written_before_commands_run() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, vec![content("exit 3\n")], &["y", "y"], false);
        let mut step = step_plan("Fail on purpose");
        step.file_writes = vec![write("fail.sh", "", WriteMode::Overwrite)];
        step.commands = vec![command("sh fail.sh", 30)];

        let ok = execute_step(&mut session, &mut step).expect("execute");
        assert!(!ok);
        let (_, outputs) = session.state.latest_step().expect("history");
        assert!(matches!(&outputs[0], CommandOutcome::Completed { exit: 3, .. }));
        assert_eq!(
            session.human.asked(),
            vec!["Apply changes to fail.sh?", "Run anyway?"]
        );
    }

    #[test]
    fn timeout_is_a_distinct_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = run_planned_command(temp.path(), &command("sleep 3", 1), 10_000)
            .expect("run");
        match outcome {
            CommandOutcome::TimedOut {
                exit,
                timeout_secs,
                output,
                ..
            } => {
                assert_eq!(exit, TIMEOUT_EXIT_CODE);
                assert_eq!(timeout_secs, 1);
                assert!(output.starts_with("TIMEOUT after 1s"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn success_pops_the_closed_task_and_records_history() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, Vec::new(), &[], true);
        session.state.tasks = vec!["Implement parser".to_string(), "Docs".to_string()];
        let mut step = step_plan("Parser slice");
        step.closes_task = Some("Implement parser".to_string());
        step.new_tasks = vec!["Docs".to_string(), "Benchmarks".to_string()];

        assert!(execute_step(&mut session, &mut step).expect("execute"));
        assert_eq!(session.state.tasks, vec!["Docs", "Benchmarks"]);
        assert_eq!(session.state.history.len(), 1);

        let log = ws.read_file(".entropic/worklog.md").expect("worklog");
        assert!(log.contains("Executed step: Parser slice"));
        let stored = crate::io::state_store::load_state(&ws.paths.state_path).expect("state");
        assert_eq!(stored.tasks, session.state.tasks);
    }

    #[test]
    fn failure_keeps_the_head() {
        let ws = TestWorkspace::new().expect("ws");
        let mut session = session(&ws, Vec::new(), &[], true);
        session.state.tasks = vec!["Implement parser".to_string()];
        let mut step = step_plan("Implement parser");
        step.commands = vec![command("exit 1", 30)];

        assert!(!execute_step(&mut session, &mut step).expect("execute"));
        assert_eq!(session.state.tasks, vec!["Implement parser"]);
    }
}
