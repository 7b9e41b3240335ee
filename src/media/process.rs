//! External command execution with a wall-clock timeout
//!
//! stdout and stderr are drained on helper threads so a chatty child can
//! never block on a full pipe while we poll for exit. Each stream keeps at
//! most `MAX_CAPTURE_BYTES`; the rest is read and discarded.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Poll interval while waiting for a child
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Bytes kept per captured stream
pub const MAX_CAPTURE_BYTES: u64 = 4 * 1024 * 1024;

/// How long to wait for the output pipes to close after the child is gone
///
/// A grandchild holding an inherited pipe keeps it open; after this the
/// reader is detached and whatever it has not delivered is lost.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed (timeout or signal)
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }

    /// Exit code as recorded in metadata; killed processes report -1
    pub fn recorded_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(-1)
    }
}

/// Run `program args...`, killing it after `timeout`
///
/// Spawn failures (binary missing, permission denied) are returned as
/// `io::Error`; everything after spawn is reported in `ToolOutput`.
pub fn run_with_timeout(
    program: &Path,
    args: &[String],
    timeout: Duration,
) -> std::io::Result<ToolOutput> {
    let start = Instant::now();
    debug!("Running {} {}", program.display(), args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout_reader = child.stdout.take().map(|r| spawn_reader(r, MAX_CAPTURE_BYTES));
    let stderr_reader = child.stderr.take().map(|r| spawn_reader(r, MAX_CAPTURE_BYTES));

    let mut timed_out = false;
    let exit_code = loop {
        match child.try_wait()? {
            Some(status) => break status.code(),
            None if start.elapsed() >= timeout => {
                warn!(
                    "{} exceeded {}s, killing",
                    program.display(),
                    timeout.as_secs()
                );
                // Kill can race with a natural exit; either way we reap below
                let _ = child.kill();
                let _ = child.wait();
                timed_out = true;
                break None;
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let stdout = join_reader(stdout_reader, program);
    let mut stderr = join_reader(stderr_reader, program);
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("command timed out after {}s", timeout.as_secs()));
    }

    Ok(ToolOutput {
        exit_code,
        stdout,
        stderr,
        duration_ms: start.elapsed().as_millis() as u64,
        timed_out,
    })
}

/// Captured bytes of one stream and its full length
struct Captured {
    bytes: Vec<u8>,
    total: u64,
}

fn spawn_reader<R: Read + Send + 'static>(source: R, limit: u64) -> Receiver<Captured> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let _ = tx.send(read_capped(source, limit));
    });
    rx
}

/// Keep the first `limit` bytes, drain the rest so the writer never blocks
fn read_capped<R: Read>(source: R, limit: u64) -> Captured {
    let mut bytes = Vec::new();
    let mut head = source.take(limit);
    let kept = head.read_to_end(&mut bytes).unwrap_or(0) as u64;
    let mut rest = head.into_inner();
    let dropped = io::copy(&mut rest, &mut io::sink()).unwrap_or(0);
    Captured {
        bytes,
        total: kept + dropped,
    }
}

fn join_reader(reader: Option<Receiver<Captured>>, program: &Path) -> String {
    let Some(rx) = reader else {
        return String::new();
    };
    match rx.recv_timeout(READER_GRACE) {
        Ok(captured) => {
            let mut text = String::from_utf8_lossy(&captured.bytes).into_owned();
            if captured.total > captured.bytes.len() as u64 {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&format!(
                    "... (output truncated, original length: {})",
                    captured.total
                ));
            }
            text
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "Output pipe of {} still open after exit, detaching reader",
                program.display()
            );
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    }
}
