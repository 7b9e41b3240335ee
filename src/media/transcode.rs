//! ffmpeg execution and the per-file conversion log

use super::process::{run_with_timeout, ToolOutput};
use super::traits::{ToolFailure, Transcoder};
use chrono::Utc;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Wall-clock limit for one transcode
pub const TRANSCODE_TIMEOUT: Duration = Duration::from_secs(180);

/// Transcoder running planned ffmpeg commands
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Transcoder for FfmpegTranscoder {
    fn program(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    fn run(&self, command: &[String]) -> Result<ToolOutput, ToolFailure> {
        let (program, args) = command.split_first().ok_or_else(|| ToolFailure::Spawn {
            tool: "ffmpeg".to_string(),
            reason: "empty command".to_string(),
        })?;

        let output = run_with_timeout(Path::new(program), args, self.timeout).map_err(|e| {
            ToolFailure::Spawn {
                tool: "ffmpeg".to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!(
            "ffmpeg finished in {}ms (exit {:?})",
            output.duration_ms, output.exit_code
        );
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Write `convert.log`: timestamp, paths, the full command and untruncated
/// stdout/stderr
pub fn write_convert_log(
    log_path: &Path,
    input: &Path,
    output_path: &Path,
    command_str: &str,
    result: &ToolOutput,
) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(log_path)?);

    writeln!(w, "timestamp: {}", Utc::now().to_rfc3339())?;
    writeln!(w, "input: {}", input.display())?;
    writeln!(w, "output: {}", output_path.display())?;
    writeln!(w, "command: {}", command_str)?;
    writeln!(w, "exit_code: {}", result.recorded_exit_code())?;
    writeln!(w, "duration_ms: {}", result.duration_ms)?;
    if result.timed_out {
        writeln!(w, "timed_out: true")?;
    }
    writeln!(w)?;
    writeln!(w, "--- stdout ---")?;
    w.write_all(result.stdout.as_bytes())?;
    if !result.stdout.ends_with('\n') {
        writeln!(w)?;
    }
    writeln!(w, "--- stderr ---")?;
    w.write_all(result.stderr.as_bytes())?;
    if !result.stderr.ends_with('\n') {
        writeln!(w)?;
    }

    w.flush()
}
