//! Child processes with a deadline and a cap on kept output.
//!
//! Both the oracle backend and planned step commands go through
//! [`run_bounded`], so a chatty or hung child can neither deadlock a pipe nor
//! grow memory without bound. On unix the child leads its own process group
//! and a timeout kills the whole group, so grandchildren that inherited the
//! pipes cannot outlive the deadline.

use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes kept from one stream, plus how many were read and dropped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    /// Lossy text, with a `[<label> truncated N bytes]` line when bytes were dropped.
    pub fn text(&self, label: &str) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[{label} truncated {} bytes]\n", self.dropped));
        }
        text
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    /// The deadline passed and the child was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Stdout then stderr, as a planned command's recorded output.
    pub fn combined_text(&self) -> String {
        let mut out = self.stdout.text("stdout");
        out.push_str(&self.stderr.text("stderr"));
        out
    }

    /// Exit code, or `-1` when the process was ended by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// `sh -c <cmd>` with `workdir` as the current directory.
pub fn shell(cmd: &str, workdir: &Path) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd).current_dir(workdir);
    command
}

/// Spawn `cmd`, feed it `stdin`, and wait at most `timeout`.
///
/// Both pipes are drained on reader threads while the child runs; at most
/// `keep_bytes` per stream are kept. A timed-out child's process group is
/// killed and the child reaped, and whatever it printed so far is returned
/// with `timed_out` set.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), keep_bytes))]
pub fn run_bounded(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    keep_bytes: usize,
) -> Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "spawned child");

    if let Some(input) = stdin {
        // Dropping the handle closes the pipe so the child sees EOF.
        let mut pipe = child.stdin.take().context("stdin was not piped")?;
        pipe.write_all(input).context("write stdin")?;
    }
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;
    let stdout = thread::spawn(move || drain(stdout, keep_bytes));
    let stderr = thread::spawn(move || drain(stderr, keep_bytes));

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "deadline passed; killing process group");
            kill_group(&mut child)?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    let stdout = join(stdout).context("collect stdout")?;
    let stderr = join(stderr).context("collect stderr")?;
    if stdout.dropped > 0 || stderr.dropped > 0 {
        debug!(stdout_dropped = stdout.dropped, stderr_dropped = stderr.dropped, "output capped");
    }
    debug!(exit_code = ?status.code(), timed_out, "child finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

/// SIGKILL the child's process group; a group that is already gone is fine.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(i32::try_from(child.id()).context("pid out of range")?);
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err).context("kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> Result<()> {
    child.kill().context("kill command")
}

fn join(handle: JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Read `reader` to EOF, keeping the first `keep` bytes.
fn drain<R: Read>(mut reader: R, keep: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(captured);
        }
        let room = keep.saturating_sub(captured.bytes.len()).min(n);
        captured.bytes.extend_from_slice(&chunk[..room]);
        captured.dropped += n - room;
    }
}
