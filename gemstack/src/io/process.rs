//! Helpers for running child processes with timeouts and bounded output.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child output with stdout and stderr interleaved by line.
#[derive(Debug)]
pub struct MergedOutput {
    pub status: ExitStatus,
    pub output: String,
    pub truncated: usize,
    pub timed_out: bool,
}

/// Where a reader thread mirrors the lines it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Echo {
    Stdout,
    Stderr,
    Off,
}

#[derive(Debug, Default)]
struct Collected {
    buf: Vec<u8>,
    truncated: usize,
}

/// Run a command with a timeout, merging stdout and stderr into one buffer.
///
/// Both pipes are read line by line on their own threads, so lines land in
/// the buffer in arrival order. With `echo` set each line is also mirrored
/// to the parent's matching stream as soon as it arrives. At most
/// `output_limit_bytes` are kept; the rest is drained and counted.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, echo))]
pub fn run_command_merged(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
    echo: bool,
) -> Result<MergedOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let collected = Arc::new(Mutex::new(Collected::default()));
    let (out_echo, err_echo) = if echo {
        (Echo::Stdout, Echo::Stderr)
    } else {
        (Echo::Off, Echo::Off)
    };
    let stdout_handle = {
        let collected = Arc::clone(&collected);
        thread::spawn(move || read_lines_into(stdout, output_limit_bytes, &collected, out_echo))
    };
    let stderr_handle = {
        let collected = Arc::clone(&collected);
        thread::spawn(move || read_lines_into(stderr, output_limit_bytes, &collected, err_echo))
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    join_reader(stdout_handle).context("join stdout")?;
    join_reader(stderr_handle).context("join stderr")?;

    let collected = std::mem::take(&mut *collected.lock().unwrap_or_else(PoisonError::into_inner));
    if collected.truncated > 0 {
        warn!(truncated = collected.truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(MergedOutput {
        status,
        output: String::from_utf8_lossy(&collected.buf).into_owned(),
        truncated: collected.truncated,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_lines_into<R: Read>(
    reader: R,
    limit: usize,
    collected: &Mutex<Collected>,
    echo: Echo,
) -> Result<()> {
    let mut buf_reader = BufReader::new(reader);

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Err(e) = mirror(echo, &line) {
            warn!(err = %e, "failed to mirror child output");
        }

        let mut collected = collected.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(collected.buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.buf.extend_from_slice(&line[..keep]);
            collected.truncated += n.saturating_sub(keep);
        } else {
            collected.truncated += n;
        }
    }

    Ok(())
}

fn mirror(echo: Echo, line: &[u8]) -> std::io::Result<()> {
    match echo {
        Echo::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(line)?;
            out.flush()
        }
        Echo::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(line)?;
            err.flush()
        }
        Echo::Off => Ok(()),
    }
}
