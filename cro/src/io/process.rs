//! Child processes with timeouts and bounded output capture.
//!
//! Both the model executor and the retrieval command go through here.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Fail unless the process exited zero within its timeout.
    pub fn ensure_success(&self, label: &str, timeout: Duration) -> Result<()> {
        if self.timed_out {
            return Err(anyhow!("{label} timed out after {:?}", timeout));
        }
        if !self.status.success() {
            let stderr = String::from_utf8_lossy(&self.stderr);
            let stderr = stderr.trim();
            return Err(anyhow!(
                "{label} failed with status {:?}{}",
                self.status.code(),
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                }
            ));
        }
        Ok(())
    }

    /// Render stdout/stderr for a log file, with truncation notices.
    pub fn render_log(&self, label: &str) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str(&format!("\n[{label} timed out]\n"));
        }
        buf
    }
}

/// Run `cmd` to completion or until `timeout`, capturing both output streams.
///
/// Stdin is fed and both output streams are drained on their own threads, so
/// neither side can block on a full pipe and `timeout` bounds the whole call.
/// At most `output_limit_bytes` per stream
/// are kept; the rest is counted and discarded.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    let program = cmd.get_program().to_owned();
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    debug!(?program, "spawning child process");
    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, ?program, "failed to spawn command");
        anyhow!(err).context(format!("spawn {program:?}"))
    })?;

    let stdin_writer = match stdin {
        Some(input) => {
            let pipe = child.stdin.take().context("stdin was not piped")?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(pipe, &input)))
        }
        None => None,
    };
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;
    let stdout_reader = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_reader = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    if let Some(writer) = stdin_writer {
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(anyhow!("stdin writer thread panicked")));
        // A child that exits or is killed before reading all input closes the pipe.
        if let Err(err) = written {
            warn!(err = %format!("{err:#}"), timed_out, "stdin not fully written");
        }
    }
    let (stdout, stdout_truncated) = join_output(stdout_reader).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_reader).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }
    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Wait up to `timeout`; kill and reap the child if it is still running.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

/// Write `input` and close the pipe so the child sees EOF.
fn write_stdin<W: Write>(mut pipe: W, input: &[u8]) -> Result<()> {
    pipe.write_all(input).context("write stdin")?;
    pipe.flush().context("flush stdin")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("output reader thread panicked")))
}

/// Read `reader` to EOF, keeping the first `limit` bytes.
///
/// Returns the kept bytes and the number of bytes dropped.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let read = reader.read(&mut chunk).context("read output")?;
        if read == 0 {
            return Ok((kept, dropped));
        }
        let take = read.min(limit.saturating_sub(kept.len()));
        kept.extend_from_slice(&chunk[..take]);
        dropped += read - take;
    }
}
