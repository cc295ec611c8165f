//! Risk-entropy driven agent loop.
//!
//! Keeps all state under `<workspace>/.entropic/` and the human-readable
//! `SPEC.md` / `RISKS.md` at the workspace root, so every run is resumable.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use entropic::core::focus::{Focus, next_focus};
use entropic::core::policy::CommandPolicy;
use entropic::exit_codes;
use entropic::io::backend::CodexBackend;
use entropic::io::config::{EntropicConfig, load_config, load_or_init_config};
use entropic::io::human::TerminalHuman;
use entropic::io::paths::WorkspacePaths;
use entropic::io::state_store::load_state;
use entropic::logging;
use entropic::looping::{LoopStop, run_loop};
use entropic::scan::{ScanMode, scan_risks};
use entropic::session::{Session, SessionOptions};

#[derive(Parser)]
#[command(
    name = "entropic",
    version,
    about = "Risk-entropy driven agent loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Collect the spec, scan risks and iterate until done or `max_iters`.
    Run {
        /// Workspace directory (created if missing).
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        /// Goal for a fresh workspace; must match the stored goal on resume.
        #[arg(long)]
        goal: Option<String>,
        /// Never block on optional input; unsafe commands are skipped.
        #[arg(long)]
        auto: bool,
        /// Override `max_iters` from the config.
        #[arg(long)]
        max_iters: Option<u32>,
    },
    /// Re-sample the risk register and merge it into the stored ranking.
    Rescan {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Print the next focus without side effects.
    Next {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Evaluate a shell command against the safety policy.
    Check {
        cmd: String,
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workspace,
            goal,
            auto,
            max_iters,
        } => cmd_run(
            &workspace,
            &SessionOptions {
                goal,
                auto,
                max_iters,
            },
        ),
        Command::Rescan { workspace } => cmd_rescan(&workspace),
        Command::Next { workspace } => cmd_next(&workspace),
        Command::Check { cmd, workspace } => cmd_check(&workspace, &cmd),
    }
}

fn cmd_run(workspace: &Path, options: &SessionOptions) -> Result<i32> {
    let mut session = open_session(workspace, options)?;
    let outcome = run_loop(&mut session)?;
    match outcome.stop {
        LoopStop::Done { rationale } => {
            println!("done after {} iterations: {}", outcome.iterations, rationale);
            Ok(exit_codes::OK)
        }
        LoopStop::MaxIterations { max_iters } => {
            println!("stopped at max_iters={max_iters} without a done verdict");
            Ok(exit_codes::INCOMPLETE)
        }
    }
}

fn cmd_rescan(workspace: &Path) -> Result<i32> {
    let mut session = open_session(workspace, &SessionOptions::default())?;
    let summary = scan_risks(&mut session, ScanMode::Merge)?;
    println!(
        "{} risks, high-entropy: [{}]",
        summary.risks,
        summary.high_entropy.join(", ")
    );
    Ok(exit_codes::OK)
}

fn cmd_next(workspace: &Path) -> Result<i32> {
    let paths = WorkspacePaths::new(workspace);
    let state = load_state(&paths.state_path)?;
    let focus = next_focus(&state);
    match &focus {
        Focus::AskUserAboutRisk(risk) | Focus::ExperimentForRisk(risk) => {
            println!("{}\t{}: {}", focus.label(), risk.id(), risk.risk.title);
        }
        Focus::ImplementTask(task) => println!("{}\t{}", focus.label(), task),
        Focus::DoneCheck => println!("{}", focus.label()),
    }
    Ok(exit_codes::OK)
}

fn cmd_check(workspace: &Path, cmd: &str) -> Result<i32> {
    let config = workspace_config(workspace)?;
    let policy = CommandPolicy::new(&config.policy)?;
    let decision = policy.classify(cmd);
    println!("{}", decision.reason());
    Ok(if decision.is_allowed() {
        exit_codes::OK
    } else {
        exit_codes::BLOCKED
    })
}

fn open_session(
    workspace: &Path,
    options: &SessionOptions,
) -> Result<Session<CodexBackend, TerminalHuman>> {
    let config = load_or_init_config(&WorkspacePaths::new(workspace).config_path)?;
    let backend = CodexBackend::new(config.oracle.command.clone());
    Session::open(workspace, config, backend, TerminalHuman, options)
}

fn workspace_config(workspace: &Path) -> Result<EntropicConfig> {
    load_config(&WorkspacePaths::new(workspace).config_path)
}
