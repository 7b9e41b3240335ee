//! Error/warning taxonomy and per-file outcome classification
//!
//! Raw tool results and stage failures are mapped here, and only here, into
//! `ErrorCode`/`WarningCode` entries. Warnings never change a file's status.

use crate::config::ParamError;
use crate::media::{SelectionError, ToolFailure, ToolOutput};
use crate::types::{AudioFormat, Status};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Exit codes
// =============================================================================

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DEPS: u8 = 2;
pub const EXIT_INPUT_NOT_FOUND: u8 = 10;
pub const EXIT_OUTPUT_NOT_WRITABLE: u8 = 11;
pub const EXIT_OVERWRITE_CONFLICT: u8 = 12;
pub const EXIT_INVALID_PARAMS: u8 = 13;
pub const EXIT_PROBE_FAILED: u8 = 20;
pub const EXIT_CONVERT_FAILED: u8 = 21;
pub const EXIT_NO_AUDIO: u8 = 22;
pub const EXIT_INTERNAL: u8 = 99;

/// Manifest message cap, in characters
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Embedded diagnostic cap, in bytes
pub const MAX_DETAIL_BYTES: usize = 2000;

// =============================================================================
// Codes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DepsMissing,
    DepsBroken,
    DepsInsufficient,
    InputNotFound,
    InputInvalid,
    InputUnsupported,
    OutputNotWritable,
    OverwriteConflict,
    InvalidParams,
    ProbeFailed,
    ConvertFailed,
    NoAudioStream,
    InvalidStreamSelection,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::DepsMissing => "deps_missing",
            ErrorCode::DepsBroken => "deps_broken",
            ErrorCode::DepsInsufficient => "deps_insufficient",
            ErrorCode::InputNotFound => "input_not_found",
            ErrorCode::InputInvalid => "input_invalid",
            ErrorCode::InputUnsupported => "input_unsupported",
            ErrorCode::OutputNotWritable => "output_not_writable",
            ErrorCode::OverwriteConflict => "overwrite_conflict",
            ErrorCode::InvalidParams => "invalid_params",
            ErrorCode::ProbeFailed => "probe_failed",
            ErrorCode::ConvertFailed => "convert_failed",
            ErrorCode::NoAudioStream => "no_audio_stream",
            ErrorCode::InvalidStreamSelection => "invalid_stream_selection",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// Process exit code for a file failing with this code alone
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCode::DepsMissing | ErrorCode::DepsBroken | ErrorCode::DepsInsufficient => {
                EXIT_DEPS
            }
            ErrorCode::InputNotFound | ErrorCode::InputInvalid | ErrorCode::InputUnsupported => {
                EXIT_INPUT_NOT_FOUND
            }
            ErrorCode::OutputNotWritable => EXIT_OUTPUT_NOT_WRITABLE,
            ErrorCode::OverwriteConflict => EXIT_OVERWRITE_CONFLICT,
            ErrorCode::InvalidParams => EXIT_INVALID_PARAMS,
            ErrorCode::ProbeFailed => EXIT_PROBE_FAILED,
            ErrorCode::ConvertFailed => EXIT_CONVERT_FAILED,
            ErrorCode::NoAudioStream | ErrorCode::InvalidStreamSelection => EXIT_NO_AUDIO,
            ErrorCode::InternalError => EXIT_INTERNAL,
        }
    }

    /// Lower wins when several errors are present
    fn priority(self) -> u8 {
        match self {
            ErrorCode::DepsMissing | ErrorCode::DepsBroken | ErrorCode::DepsInsufficient => 0,
            ErrorCode::InternalError => 1,
            ErrorCode::InputNotFound | ErrorCode::InputInvalid | ErrorCode::InputUnsupported => 2,
            ErrorCode::OutputNotWritable => 3,
            ErrorCode::OverwriteConflict => 4,
            ErrorCode::InvalidParams => 5,
            ErrorCode::ProbeFailed => 6,
            ErrorCode::ConvertFailed => 7,
            ErrorCode::NoAudioStream | ErrorCode::InvalidStreamSelection => 8,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// The produced audio could not be probed
    ProbeFailed,
    /// The produced audio probed without an audio stream
    ProbeNoAudioStream,
    /// The produced audio differs from the expected format
    OutputProbeMismatch,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningCode::ProbeFailed => "probe_failed",
            WarningCode::ProbeNoAudioStream => "probe_no_audio_stream",
            WarningCode::OutputProbeMismatch => "output_probe_mismatch",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Entries
// =============================================================================

/// One recorded error or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEntry<C> {
    pub code: C,
    pub message: String,
    pub hint: Option<String>,
    /// Size-capped diagnostic payload (e.g. stderr)
    pub detail: Option<String>,
}

pub type ErrorEntry = IssueEntry<ErrorCode>;
pub type WarningEntry = IssueEntry<WarningCode>;

impl<C> IssueEntry<C> {
    pub fn new(code: C, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            detail: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a diagnostic payload, truncated to `MAX_DETAIL_BYTES`
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let trimmed = detail.trim();
        self.detail = if trimmed.is_empty() {
            None
        } else {
            Some(truncate_bytes(trimmed, MAX_DETAIL_BYTES))
        };
        self
    }
}

/// Cut `text` to at most `max` bytes on a char boundary, appending a marker
pub fn truncate_bytes(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}... (truncated, original length: {})",
        &text[..end],
        text.len()
    )
}

/// Cut `text` to at most `max` characters
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Exit code of a file from its errors; highest-priority error wins
pub fn exit_code_for(errors: &[ErrorEntry]) -> u8 {
    errors
        .iter()
        .map(|e| e.code)
        .min_by_key(|c| c.priority())
        .map(ErrorCode::exit_code)
        .unwrap_or(EXIT_OK)
}

/// Terminal status from errors and the dry-run flag
pub fn status_for(errors: &[ErrorEntry], planned: bool) -> Status {
    if !errors.is_empty() {
        Status::Failed
    } else if planned {
        Status::Planned
    } else {
        Status::Success
    }
}

// =============================================================================
// Classification
// =============================================================================

pub fn classify_param_error(err: &ParamError) -> ErrorEntry {
    ErrorEntry::new(ErrorCode::InvalidParams, err.to_string()).with_hint(err.hint())
}

pub fn classify_selection_error(err: &SelectionError) -> ErrorEntry {
    match err {
        SelectionError::NoAudioStream => ErrorEntry::new(ErrorCode::NoAudioStream, err.to_string())
            .with_hint("The input contains no decodable audio"),
        SelectionError::IndexNotFound { .. } | SelectionError::LanguageNotFound { .. } => {
            ErrorEntry::new(ErrorCode::InvalidStreamSelection, err.to_string())
                .with_hint("Check --audio-stream-index / --audio-language against the probe output")
        }
    }
}

/// The input probe is required to proceed, so failure is fatal for the file
pub fn classify_input_probe(err: &ToolFailure) -> ErrorEntry {
    let entry = ErrorEntry::new(ErrorCode::ProbeFailed, format!("input probe failed: {}", err))
        .with_hint("Check that the input is a readable media file");
    match err.detail() {
        Some(detail) => entry.with_detail(detail),
        None => entry,
    }
}

/// Verification of the produced audio only ever warns
pub fn classify_output_probe(err: &ToolFailure) -> WarningEntry {
    let entry = WarningEntry::new(
        WarningCode::ProbeFailed,
        format!("output probe failed: {}", err),
    );
    match err.detail() {
        Some(detail) => entry.with_detail(detail),
        None => entry,
    }
}

/// `None` when the transcode succeeded
pub fn classify_transcode(result: &Result<ToolOutput, ToolFailure>) -> Option<ErrorEntry> {
    match result {
        Ok(out) if out.success() => None,
        Ok(out) if out.timed_out => Some(
            ErrorEntry::new(ErrorCode::ConvertFailed, "ffmpeg timed out")
                .with_hint("See convert.log in the workdir")
                .with_detail(&out.stderr),
        ),
        Ok(out) => Some(
            ErrorEntry::new(
                ErrorCode::ConvertFailed,
                format!("ffmpeg exited with code {}", out.recorded_exit_code()),
            )
            .with_hint("See convert.log in the workdir for full output")
            .with_detail(&out.stderr),
        ),
        Err(failure) => {
            let entry = ErrorEntry::new(
                ErrorCode::ConvertFailed,
                format!("ffmpeg could not be run: {}", failure),
            );
            Some(match failure.detail() {
                Some(detail) => entry.with_detail(detail),
                None => entry,
            })
        }
    }
}

pub fn internal_error(message: impl Into<String>) -> ErrorEntry {
    ErrorEntry::new(ErrorCode::InternalError, message)
        .with_hint("This is a bug; please report it with the meta.json")
}

/// Compare read-back audio with what was requested
pub fn output_mismatch(expected: &AudioFormat, actual: &AudioFormat) -> Option<WarningEntry> {
    let mut diffs = Vec::new();
    if expected.codec != actual.codec {
        diffs.push(format!(
            "codec {} != {}",
            actual.codec.as_deref().unwrap_or("?"),
            expected.codec.as_deref().unwrap_or("?")
        ));
    }
    if expected.sample_rate != actual.sample_rate {
        diffs.push(format!(
            "sample_rate {} != {}",
            actual.sample_rate, expected.sample_rate
        ));
    }
    if expected.channels != actual.channels {
        diffs.push(format!("channels {} != {}", actual.channels, expected.channels));
    }
    if actual.bit_depth != 0 && expected.bit_depth != actual.bit_depth {
        diffs.push(format!("bit_depth {} != {}", actual.bit_depth, expected.bit_depth));
    }

    if diffs.is_empty() {
        None
    } else {
        Some(WarningEntry::new(
            WarningCode::OutputProbeMismatch,
            format!("output differs from expected: {}", diffs.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorCode::InvalidStreamSelection).unwrap();
        assert_eq!(json, "\"invalid_stream_selection\"");
        assert_eq!(ErrorCode::OverwriteConflict.as_str(), "overwrite_conflict");
        let json = serde_json::to_string(&WarningCode::ProbeNoAudioStream).unwrap();
        assert_eq!(json, "\"probe_no_audio_stream\"");
    }

    #[test]
    fn test_exit_code_priority() {
        assert_eq!(exit_code_for(&[]), EXIT_OK);
        let errors = vec![
            ErrorEntry::new(ErrorCode::ConvertFailed, "a"),
            ErrorEntry::new(ErrorCode::OverwriteConflict, "b"),
        ];
        assert_eq!(exit_code_for(&errors), EXIT_OVERWRITE_CONFLICT);

        let errors = vec![
            ErrorEntry::new(ErrorCode::NoAudioStream, "a"),
            ErrorEntry::new(ErrorCode::InternalError, "b"),
            ErrorEntry::new(ErrorCode::InputNotFound, "c"),
        ];
        assert_eq!(exit_code_for(&errors), EXIT_INTERNAL);
    }

    #[test]
    fn test_exit_code_table() {
        assert_eq!(ErrorCode::InvalidParams.exit_code(), 13);
        assert_eq!(ErrorCode::ProbeFailed.exit_code(), 20);
        assert_eq!(ErrorCode::InvalidStreamSelection.exit_code(), 22);
        assert_eq!(ErrorCode::OutputNotWritable.exit_code(), 11);
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundary() {
        let text = "é".repeat(1500); // 3000 bytes
        let cut = truncate_bytes(&text, MAX_DETAIL_BYTES);
        assert!(cut.ends_with("... (truncated, original length: 3000)"));
        let body = cut.split("...").next().unwrap();
        assert!(body.len() <= MAX_DETAIL_BYTES);
        assert_eq!(truncate_bytes("short", 10), "short");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[test]
    fn test_transcode_failure_caps_stderr() {
        let out = ToolOutput {
            exit_code: Some(1),
            stderr: "x".repeat(5000),
            ..Default::default()
        };
        let entry = classify_transcode(&Ok(out)).unwrap();
        assert_eq!(entry.code, ErrorCode::ConvertFailed);
        let detail = entry.detail.unwrap();
        assert!(detail.contains("original length: 5000"));
        assert!(detail.len() < 2100);
    }

    #[test]
    fn test_transcode_success_is_none() {
        let out = ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(classify_transcode(&Ok(out)).is_none());
    }

    #[test]
    fn test_selection_classification() {
        let e = classify_selection_error(&SelectionError::NoAudioStream);
        assert_eq!(e.code, ErrorCode::NoAudioStream);
        let e = classify_selection_error(&SelectionError::IndexNotFound {
            index: 3,
            available: vec![0],
        });
        assert_eq!(e.code, ErrorCode::InvalidStreamSelection);
    }

    #[test]
    fn test_output_probe_is_warning() {
        let w = classify_output_probe(&ToolFailure::Timeout {
            tool: "ffprobe".into(),
            secs: 30,
        });
        assert_eq!(w.code, WarningCode::ProbeFailed);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(status_for(&[], false), Status::Success);
        assert_eq!(status_for(&[], true), Status::Planned);
        let errors = vec![internal_error("boom")];
        assert_eq!(status_for(&errors, true), Status::Failed);
    }

    #[test]
    fn test_output_mismatch() {
        let expected = AudioFormat {
            codec: Some("pcm_s16le".into()),
            sample_rate: 16000,
            channels: 1,
            bit_depth: 16,
        };
        assert!(output_mismatch(&expected, &expected).is_none());
        let mut actual = expected.clone();
        actual.sample_rate = 44100;
        let w = output_mismatch(&expected, &actual).unwrap();
        assert_eq!(w.code, WarningCode::OutputProbeMismatch);
        assert!(w.message.contains("sample_rate"));
    }
}
