//! External tool abstractions
//!
//! The pipeline never talks to ffmpeg/ffprobe directly; it goes through
//! these traits so backends can be swapped (and faked in tests) without
//! changing orchestration code.

use super::deps::DepsReport;
use super::process::ToolOutput;
use crate::types::ProbeResult;
use std::path::Path;
use thiserror::Error;

/// Failure to obtain a result from an external tool
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolFailure {
    #[error("{tool} could not be started: {reason}")]
    Spawn { tool: String, reason: String },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} exited with code {exit_code}")]
    Failed {
        tool: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to parse {tool} output: {reason}")]
    Parse { tool: String, reason: String },
}

impl ToolFailure {
    /// Diagnostic payload worth keeping (stderr or parse reason)
    pub fn detail(&self) -> Option<&str> {
        match self {
            ToolFailure::Failed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            ToolFailure::Parse { reason, .. } => Some(reason),
            ToolFailure::Spawn { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Media introspection backend
pub trait MediaProber: Send + Sync {
    /// Describe the streams of a media file
    fn probe(&self, path: &Path) -> Result<ProbeResult, ToolFailure>;

    /// Get the name of this prober (for logging)
    fn name(&self) -> &'static str;
}

/// Audio transcoding backend
pub trait Transcoder: Send + Sync {
    /// Program placed at the head of planned commands
    fn program(&self) -> String;

    /// Execute a planned command (program + arguments)
    ///
    /// A non-zero exit is an `Ok` result; `Err` means the process could not
    /// be run at all.
    fn run(&self, command: &[String]) -> Result<ToolOutput, ToolFailure>;

    /// Get the name of this transcoder (for logging)
    fn name(&self) -> &'static str;
}

/// Dependency availability check, run once per ingest run
pub trait DependencyChecker: Send + Sync {
    fn check(&self) -> DepsReport;
}
