//! Unified error types for wavprep
//!
//! Error strategy:
//! - Per-file failures (missing input, bad stream selection, transcode
//!   failure): never raised, recorded as `IssueEntry` values in that file's
//!   meta.json and manifest line (see `pipeline::outcome`)
//! - Run-level failures (config, out-root, manifest, log file): fatal, abort
//!   the run before or between files
//!
//! All errors include actionable suggestions where possible.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for wavprep operations
#[derive(Debug, Error)]
pub enum WavprepError {
    #[error("Failed to load config '{path}': {reason}\n  Tip: Config files are YAML mappings, e.g. `sample_rate: 16000`")]
    ConfigError { path: PathBuf, reason: String },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },

    #[error("Input path does not exist: '{0}'\n  Tip: Check the path exists and is accessible")]
    InputNotFound(PathBuf),

    #[error("Failed to serialize '{what}': {reason}")]
    SerializeError { what: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wavprep operations
pub type Result<T> = std::result::Result<T, WavprepError>;

impl WavprepError {
    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!(
                    "Directory does not exist: {}",
                    path.parent().map(|p| p.display().to_string()).unwrap_or_default()
                )
            }
            std::io::ErrorKind::AlreadyExists => {
                format!("File already exists: {}", path.display())
            }
            _ => err.to_string(),
        };
        WavprepError::OutputError { path, reason }
    }

    /// Create a config error for a specific file
    pub fn config_error(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WavprepError::ConfigError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error comes from configuration loading
    pub fn is_config_error(&self) -> bool {
        matches!(self, WavprepError::ConfigError { .. })
    }
}

impl From<serde_json::Error> for WavprepError {
    fn from(err: serde_json::Error) -> Self {
        WavprepError::SerializeError {
            what: "json".to_string(),
            reason: err.to_string(),
        }
    }
}
