//! Runs an external download program, streaming its output lines and killing
//! it when the job's cancellation token fires.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::DownloadError;

/// How often the runner checks the cancellation token while the child is quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of stderr kept for the error message.
const STDERR_TAIL: usize = 20;

pub(super) struct ProcessOutput {
    pub status: ExitStatus,
    pub stderr_tail: Vec<String>,
}

impl ProcessOutput {
    /// Error for a non-zero exit, quoting the last stderr line if any.
    pub fn failure(&self, program: &str) -> DownloadError {
        let detail = self
            .stderr_tail
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| format!(": {}", l.trim()))
            .unwrap_or_default();
        DownloadError::Failed(format!("{program} exited with {}{detail}", self.status))
    }
}

enum Line {
    Stdout(String),
    Stderr(String),
}

fn forward_lines<R: Read + Send + 'static>(
    reader: R,
    tx: mpsc::Sender<Line>,
    wrap: fn(String) -> Line,
) {
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    });
}

/// Spawns `cmd`, calls `on_stdout` for every stdout line, and waits for exit.
/// Returns `DownloadError::Cancelled` after killing the child if `cancel` fires first.
pub(super) fn run(
    program: &str,
    cmd: &mut Command,
    cancel: &CancellationToken,
    mut on_stdout: impl FnMut(&str),
) -> Result<ProcessOutput, DownloadError> {
    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DownloadError::Spawn {
            program: program.to_string(),
            source,
        })?;
    tracing::debug!(program, pid = child.id(), "spawned download process");

    let (tx, rx) = mpsc::channel();
    if let Some(out) = child.stdout.take() {
        forward_lines(out, tx.clone(), Line::Stdout);
    }
    if let Some(err) = child.stderr.take() {
        forward_lines(err, tx.clone(), Line::Stderr);
    }
    drop(tx);

    let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut exited = false;
    loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(program, "download process killed on cancel");
            return Err(DownloadError::Cancelled);
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Line::Stdout(line)) => on_stdout(&line),
            Ok(Line::Stderr(line)) => {
                tracing::trace!(program, "{}", line);
                if stderr_tail.len() == STDERR_TAIL {
                    stderr_tail.pop_front();
                }
                stderr_tail.push_back(line);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // A grandchild may hold the pipes open after the child exits;
                // give the readers one quiet interval, then stop waiting for EOF.
                if exited {
                    break;
                }
                exited = child.try_wait()?.is_some();
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = child.wait()?;
    Ok(ProcessOutput {
        status,
        stderr_tail: stderr_tail.into_iter().collect(),
    })
}
