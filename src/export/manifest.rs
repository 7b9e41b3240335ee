//! Append-only JSONL batch manifest
//!
//! One self-contained canonical JSON object per line, written in scan order
//! and flushed immediately. Lines are never rewritten.

use crate::digest::canonical_json;
use crate::error::{Result, WavprepError};
use crate::pipeline::ingest::FileOutcome;
use crate::pipeline::outcome::{truncate_chars, ErrorCode, WarningCode, MAX_MESSAGE_CHARS};
use crate::types::Status;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_SCHEMA_VERSION: &str = "manifest.v1";
pub const MANIFEST_PLAN_SCHEMA_VERSION: &str = "manifest.plan.v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInput {
    pub path: String,
    pub relpath: String,
    pub ext: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutput {
    pub workdir: String,
    pub audio_wav: String,
    pub meta_json: String,
    pub convert_log: String,
    pub work_id: Option<String>,
    pub work_key: Option<String>,
}

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub schema_version: String,
    pub input: ManifestInput,
    pub output: ManifestOutput,
    pub status: Status,
    /// `None` for planned records
    pub exit_code: Option<u8>,
    pub error_codes: Vec<ErrorCode>,
    pub error_messages: Vec<String>,
    pub warning_codes: Vec<WarningCode>,
    pub warning_messages: Vec<String>,
    pub errors_summary: String,
    /// `None` when no meta.json was written
    pub meta_json_path: Option<String>,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub params_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_audio_stream: Option<u32>,
}

impl ManifestRecord {
    /// Schema version for executed or planned runs
    pub fn schema_for(planned: bool) -> &'static str {
        if planned {
            MANIFEST_PLAN_SCHEMA_VERSION
        } else {
            MANIFEST_SCHEMA_VERSION
        }
    }

    /// Manifest line for a processed file
    pub fn from_outcome(outcome: &FileOutcome) -> Self {
        let meta = &outcome.meta;
        let outputs = &outcome.outputs;
        let identity = outcome.identity.as_ref();

        let mut record = Self {
            schema_version: Self::schema_for(outcome.planned()).to_string(),
            input: ManifestInput {
                path: outcome.file.path.display().to_string(),
                relpath: outcome.file.relpath.clone(),
                ext: outcome.file.ext.clone(),
                size_bytes: outcome.file.size_bytes,
            },
            output: ManifestOutput {
                workdir: outputs.workdir.display().to_string(),
                audio_wav: outputs.audio_wav.display().to_string(),
                meta_json: outputs.meta_json.display().to_string(),
                convert_log: outputs.convert_log.display().to_string(),
                work_id: identity.map(|i| i.id.clone()),
                work_key: identity.map(|i| i.work_key.clone()),
            },
            status: meta.status,
            exit_code: (meta.status != Status::Planned).then_some(outcome.exit_code),
            error_codes: meta.errors.iter().map(|e| e.code).collect(),
            error_messages: Vec::new(),
            warning_codes: meta.warnings.iter().map(|w| w.code).collect(),
            warning_messages: Vec::new(),
            errors_summary: String::new(),
            meta_json_path: outcome
                .meta_path
                .as_ref()
                .map(|p| p.display().to_string()),
            started_at: outcome
                .started_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            ended_at: outcome.ended_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms: outcome.duration_ms,
            params_digest: meta.integrity.params_digest.clone(),
            message: Some(truncate_chars(&outcome.message(), MAX_MESSAGE_CHARS)),
            cmd_digest: meta.execution.cmd_digest.clone(),
            selected_audio_stream: meta.probe.selected_audio_stream,
        };
        record.set_messages(
            meta.errors.iter().map(|e| e.message.clone()).collect(),
            meta.warnings.iter().map(|w| w.message.clone()).collect(),
        );
        record
    }

    /// Cap messages and derive the summary
    pub fn set_messages(&mut self, errors: Vec<String>, warnings: Vec<String>) {
        self.errors_summary = truncate_chars(&errors.join("; "), MAX_MESSAGE_CHARS);
        self.error_messages = errors
            .iter()
            .map(|m| truncate_chars(m, MAX_MESSAGE_CHARS))
            .collect();
        self.warning_messages = warnings
            .iter()
            .map(|m| truncate_chars(m, MAX_MESSAGE_CHARS))
            .collect();
    }
}

/// Single writer for a run's manifest
pub struct ManifestWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    lines_written: usize,
}

impl ManifestWriter {
    /// Create (or truncate) the manifest at the start of a run
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| WavprepError::output_error(parent, e))?;
        }
        let file = File::create(path).map_err(|e| WavprepError::output_error(path, e))?;
        debug!("Manifest: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            lines_written: 0,
        })
    }

    /// Append one record and flush it to disk
    pub fn append(&mut self, record: &ManifestRecord) -> Result<()> {
        let mut line = canonical_json(record)?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| WavprepError::output_error(&self.path, e))?;
        self.lines_written += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read a manifest back, one record per line
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(WavprepError::from))
        .collect()
}
