//! Backend abstraction for oracle invocation.
//!
//! The [`Backend`] trait decouples the oracle adapter from the process that
//! actually answers (currently `codex exec`). Tests use scripted backends that
//! write predetermined outputs without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::SamplingProfile;
use crate::io::process::{ProcessOutput, run_bounded};

/// Parameters for one backend invocation.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Working directory for the backend process.
    pub workdir: PathBuf,
    /// Short label for logs (`spec`, `risk sample 2/3`, ...).
    pub purpose: String,
    pub prompt: String,
    /// JSON Schema constraining the final message.
    pub output_schema_path: PathBuf,
    /// Where the backend must write its final message.
    pub output_path: PathBuf,
    /// Where backend stdout/stderr are logged.
    pub log_path: PathBuf,
    pub profile: SamplingProfile,
    pub timeout: Duration,
    /// Truncate backend output logs beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over oracle backends.
pub trait Backend {
    /// Answer `request`. Must write the raw answer to `request.output_path`.
    fn exec(&self, request: &BackendRequest) -> Result<()>;
}

/// Backend that spawns `<program> exec` (Codex CLI).
#[derive(Debug, Clone)]
pub struct CodexBackend {
    program: String,
}

impl CodexBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_command(&self, request: &BackendRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("exec")
            .arg("-c")
            .arg(format!(
                "model_reasoning_effort={}",
                request.profile.reasoning_effort
            ))
            .arg("--sandbox")
            .arg("read-only")
            .arg("--skip-git-repo-check");
        if let Some(model) = &request.profile.model {
            cmd.arg("-m").arg(model);
        }
        cmd.args(&request.profile.args)
            .arg("--output-schema")
            .arg(&request.output_schema_path)
            .arg("--output-last-message")
            .arg(&request.output_path)
            .arg("-")
            .current_dir(&request.workdir);
        cmd
    }
}

impl Backend for CodexBackend {
    #[instrument(skip_all, fields(purpose = %request.purpose, timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &BackendRequest) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting backend exec");

        if !request.output_schema_path.exists() {
            return Err(anyhow!(
                "missing output schema {}",
                request.output_schema_path.display()
            ));
        }
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let output = run_bounded(
            self.build_command(request),
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {} exec", self.program))?;

        write_backend_log(&request.log_path, &output, request.output_limit_bytes)?;

        if output.timed_out {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "backend exec timed out"
            );
            return Err(anyhow!(
                "{} exec timed out after {:?}",
                self.program,
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "backend exec failed");
            return Err(anyhow!(
                "{} exec failed with status {:?}",
                self.program,
                output.status.code()
            ));
        }

        debug!("backend exec completed successfully");
        Ok(())
    }
}

/// Run the backend and return its raw answer text.
#[instrument(skip_all, fields(output_path = %request.output_path.display()))]
pub fn exec_and_read<B: Backend + ?Sized>(backend: &B, request: &BackendRequest) -> Result<String> {
    backend.exec(request)?;
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing backend output {}",
            request.output_path.display()
        ));
    }
    fs::read_to_string(&request.output_path)
        .with_context(|| format!("read backend output {}", request.output_path.display()))
}

fn write_backend_log(path: &Path, output: &ProcessOutput, output_limit: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create backend log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&output.stdout.text("backend stdout"));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&output.stderr.text("backend stderr"));
    if output.timed_out {
        buf.push_str("\n[backend timed out]\n");
    }

    if buf.len() > output_limit {
        let mut cut = output_limit;
        while !buf.is_char_boundary(cut) {
            cut -= 1;
        }
        let truncated = format!("{}\n[truncated {} bytes]\n", &buf[..cut], buf.len() - cut);
        return fs::write(path, truncated)
            .with_context(|| format!("write backend log {}", path.display()));
    }

    fs::write(path, buf).with_context(|| format!("write backend log {}", path.display()))
}
