//! Per-file `meta.json` (schema `meta.v1`)
//!
//! `meta.v1` may only gain optional fields. Removing, retyping or making a
//! field required needs `meta.v2`.

use crate::config::{IngestParams, ParamProvenance, ResolvedParams};
use crate::discovery::{DiscoveredFile, WorkdirIdentity};
use crate::error::{Result, WavprepError};
use crate::media::{DepsReport, SelectedStream, SelectionStrategy, ToolInfo, ToolOutput};
use crate::pipeline::outcome::{status_for, ErrorEntry, WarningEntry};
use crate::pipeline::plan::{ExecutionPlan, AUDIO_WAV, CONVERT_LOG, META_JSON, OUTPUT_CODEC};
use crate::types::{AudioFormat, ProbeResult, Status};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;

pub const META_SCHEMA_VERSION: &str = "meta.v1";

pub const REPO_NAME: &str = "wavprep";

/// Fields guaranteed present and type-stable across runs for the same input
/// and params
pub const CORE_FIELDS: &[&str] = &[
    "schema_version",
    "pipeline.repo",
    "input.relpath",
    "input.ext",
    "input.size_bytes",
    "params.sample_rate",
    "params.channels",
    "params.bit_depth",
    "params.normalize",
    "params.normalize_mode",
    "params.normalize_config",
    "params.ffmpeg_extra_args",
    "params.audio_stream_index",
    "params.audio_language",
    "params_sources.sample_rate",
    "params_sources.channels",
    "params_sources.bit_depth",
    "params_sources.normalize",
    "params_sources.normalize_mode",
    "params_sources.normalize_config",
    "params_sources.ffmpeg_extra_args",
    "params_sources.audio_stream_index",
    "params_sources.audio_language",
    "output.work_id",
    "output.work_key",
    "output.audio_wav",
    "output.meta_json",
    "output.convert_log",
    "output.expected_audio.codec",
    "output.expected_audio.sample_rate",
    "output.expected_audio.channels",
    "output.expected_audio.bit_depth",
    "execution.ffmpeg_filtergraph",
    "execution.planned",
    "integrity.params_digest",
];

/// Fields that legitimately vary across runs or machines
pub const NON_CORE_FIELDS: &[&str] = &[
    "created_at",
    "status",
    "pipeline.repo_version",
    "input.path",
    "input.abspath",
    "input.mtime_epoch",
    "tooling",
    "probe",
    "output.workdir",
    "output.actual_audio",
    "execution.ffmpeg_cmd",
    "execution.ffmpeg_cmd_str",
    "execution.cmd_digest",
    "execution.result",
    "integrity.output_audio_sha256",
    "errors",
    "warnings",
];

const STABLE_FIELDS_NOTES: &str = "Core fields are stable for a given input and params: \
relative artifact names, params and their sources, expected audio and the params digest. \
Non-core fields change with clocks, absolute paths, platform and ffmpeg build. \
work_id/work_key derive from relpath and size and are null outside batch runs. \
Normalization output depends on the ffmpeg build even with the fixed loudnorm configuration.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub schema_version: String,
    pub created_at: String,
    pub status: Status,
    pub pipeline: PipelineInfo,
    pub input: InputInfo,
    /// `None` when the params could not be resolved
    pub params: Option<IngestParams>,
    pub params_sources: Option<ParamProvenance>,
    pub tooling: ToolingInfo,
    pub probe: ProbeSection,
    pub output: OutputSection,
    pub execution: ExecutionSection,
    pub integrity: IntegritySection,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<WarningEntry>,
    pub stable_fields: StableFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub repo: String,
    pub repo_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    pub path: String,
    pub relpath: String,
    pub abspath: String,
    pub ext: String,
    pub size_bytes: u64,
    pub mtime_epoch: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolingInfo {
    pub ffmpeg: Option<ToolInfo>,
    pub ffprobe: Option<ToolInfo>,
    pub runtime: String,
    pub platform: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeSection {
    pub input: Option<ProbeResult>,
    pub output: Option<ProbeResult>,
    pub selected_audio_stream: Option<u32>,
    pub selection_strategy: Option<SelectionStrategy>,
    /// Messages of warnings raised while probing
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSection {
    pub workdir: String,
    pub work_id: Option<String>,
    pub work_key: Option<String>,
    /// Artifact names relative to `workdir`
    pub audio_wav: String,
    pub meta_json: String,
    pub convert_log: String,
    pub expected_audio: AudioFormat,
    pub actual_audio: Option<AudioFormat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSection {
    pub ffmpeg_cmd: Option<Vec<String>>,
    pub ffmpeg_cmd_str: Option<String>,
    pub ffmpeg_filtergraph: Option<String>,
    pub cmd_digest: Option<String>,
    pub planned: bool,
    pub result: Option<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySection {
    pub params_digest: Option<String>,
    pub output_audio_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableFields {
    pub core: Vec<String>,
    pub non_core: Vec<String>,
    pub notes: String,
}

impl StableFields {
    pub fn v1() -> Self {
        Self {
            core: CORE_FIELDS.iter().map(|s| s.to_string()).collect(),
            non_core: NON_CORE_FIELDS.iter().map(|s| s.to_string()).collect(),
            notes: STABLE_FIELDS_NOTES.to_string(),
        }
    }
}

/// Expected WAV format for a parameter set
pub fn expected_audio(params: &IngestParams) -> AudioFormat {
    AudioFormat {
        codec: Some(OUTPUT_CODEC.to_string()),
        sample_rate: params.sample_rate,
        channels: params.channels,
        bit_depth: params.bit_depth,
    }
}

/// Read the produced format back from an output probe
pub fn actual_audio(probe: &ProbeResult) -> Option<AudioFormat> {
    probe.audio_streams.first().map(|s| AudioFormat {
        codec: s.codec_name.clone(),
        sample_rate: s.sample_rate,
        channels: s.channels,
        bit_depth: s.bits_per_sample.unwrap_or(0),
    })
}

/// Assembles one `MetaRecord` from the stage outputs of a file
#[derive(Debug, Clone)]
pub struct MetaBuilder {
    record: MetaRecord,
}

impl MetaBuilder {
    pub fn new(file: &DiscoveredFile, workdir: &Path, identity: Option<&WorkdirIdentity>) -> Self {
        let defaults = IngestParams::default();
        let record = MetaRecord {
            schema_version: META_SCHEMA_VERSION.to_string(),
            created_at: Utc::now().to_rfc3339(),
            status: Status::Failed,
            pipeline: PipelineInfo {
                repo: REPO_NAME.to_string(),
                repo_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            input: input_info(file),
            params: None,
            params_sources: None,
            tooling: ToolingInfo {
                ffmpeg: None,
                ffprobe: None,
                runtime: runtime(),
                platform: crate::media::deps::platform(),
            },
            probe: ProbeSection::default(),
            output: OutputSection {
                workdir: workdir.display().to_string(),
                work_id: identity.map(|i| i.id.clone()),
                work_key: identity.map(|i| i.work_key.clone()),
                audio_wav: AUDIO_WAV.to_string(),
                meta_json: META_JSON.to_string(),
                convert_log: CONVERT_LOG.to_string(),
                expected_audio: expected_audio(&defaults),
                actual_audio: None,
            },
            execution: ExecutionSection::default(),
            integrity: IntegritySection::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            stable_fields: StableFields::v1(),
        };
        Self { record }
    }

    pub fn tooling(&mut self, deps: &DepsReport) -> &mut Self {
        self.record.tooling.ffmpeg = deps.ffmpeg.clone();
        self.record.tooling.ffprobe = deps.ffprobe.clone();
        self
    }

    pub fn params(&mut self, resolved: &ResolvedParams) -> &mut Self {
        self.record.output.expected_audio = expected_audio(&resolved.params);
        self.record.params = Some(resolved.params.clone());
        self.record.params_sources = Some(resolved.provenance.clone());
        self
    }

    pub fn input_probe(&mut self, probe: &ProbeResult) -> &mut Self {
        self.record.probe.input = Some(probe.clone());
        self
    }

    pub fn selection(&mut self, selected: &SelectedStream) -> &mut Self {
        self.record.probe.selected_audio_stream = Some(selected.index);
        self.record.probe.selection_strategy = Some(selected.strategy);
        self
    }

    pub fn plan(&mut self, plan: &ExecutionPlan) -> &mut Self {
        let exec = &mut self.record.execution;
        exec.ffmpeg_cmd = Some(plan.command.clone());
        exec.ffmpeg_cmd_str = Some(plan.command_str.clone());
        exec.ffmpeg_filtergraph = plan.filtergraph.clone();
        exec.cmd_digest = Some(plan.cmd_digest.clone());
        exec.planned = plan.planned;
        self.record.integrity.params_digest = Some(plan.params_digest.clone());
        self
    }

    /// Params digest when planning did not happen
    pub fn params_digest(&mut self, digest: String) -> &mut Self {
        self.record.integrity.params_digest = Some(digest);
        self
    }

    pub fn execution_result(&mut self, output: &ToolOutput) -> &mut Self {
        self.record.execution.result = Some(ExecutionResult {
            exit_code: output.recorded_exit_code(),
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
        });
        self
    }

    pub fn output_probe(&mut self, probe: &ProbeResult) -> &mut Self {
        self.record.output.actual_audio = actual_audio(probe);
        self.record.probe.output = Some(probe.clone());
        self
    }

    pub fn output_sha256(&mut self, digest: String) -> &mut Self {
        self.record.integrity.output_audio_sha256 = Some(digest);
        self
    }

    pub fn error(&mut self, entry: ErrorEntry) -> &mut Self {
        self.record.errors.push(entry);
        self
    }

    pub fn warning(&mut self, entry: WarningEntry) -> &mut Self {
        self.record.probe.warnings.push(entry.message.clone());
        self.record.warnings.push(entry);
        self
    }

    pub fn expected_audio(&self) -> &AudioFormat {
        &self.record.output.expected_audio
    }

    /// Finish the record; status follows from the errors and `planned`
    pub fn build(mut self, planned: bool) -> MetaRecord {
        self.record.execution.planned = planned;
        self.record.status = status_for(&self.record.errors, planned);
        self.record
    }
}

fn input_info(file: &DiscoveredFile) -> InputInfo {
    let abspath = std::fs::canonicalize(&file.path)
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join(&file.path)))
        .unwrap_or_else(|_| file.path.clone());
    let mtime_epoch = std::fs::metadata(&file.path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64());

    InputInfo {
        path: file.path.display().to_string(),
        relpath: file.relpath.clone(),
        abspath: abspath.display().to_string(),
        ext: file.ext.clone(),
        size_bytes: file.size_bytes,
        mtime_epoch,
    }
}

fn runtime() -> String {
    format!("{} {}", REPO_NAME, env!("CARGO_PKG_VERSION"))
}

/// Write `meta.json` with sorted keys via temp file + rename
pub fn write_meta(record: &MetaRecord, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("json.tmp");

    // serde_json's default map is ordered, so keys come out sorted
    let value = serde_json::to_value(record)?;
    let mut text = serde_json::to_string_pretty(&value)?;
    text.push('\n');

    std::fs::write(&temp_path, text).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        WavprepError::output_error(path, e)
    })?;

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        WavprepError::OutputError {
            path: path.to_path_buf(),
            reason: format!("Failed to finalize file: {}", e),
        }
    })?;

    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::outcome::{ErrorCode, WarningCode};
    use serde_json::Value;
    use tempfile::TempDir;

    fn file() -> DiscoveredFile {
        DiscoveredFile {
            path: "in/song.mp3".into(),
            relpath: "song.mp3".into(),
            ext: ".mp3".into(),
            size_bytes: 42,
        }
    }

    fn lookup<'a>(value: &'a Value, dotted: &str) -> Option<&'a Value> {
        dotted.split('.').try_fold(value, |v, key| v.get(key))
    }

    #[test]
    fn test_status_follows_errors() {
        let mut b = MetaBuilder::new(&file(), Path::new("out"), None);
        b.warning(WarningEntry::new(WarningCode::ProbeFailed, "output probe failed"));
        assert_eq!(b.clone().build(false).status, Status::Success);
        assert_eq!(b.clone().build(true).status, Status::Planned);
        b.error(ErrorEntry::new(ErrorCode::ConvertFailed, "boom"));
        assert_eq!(b.build(false).status, Status::Failed);
    }

    #[test]
    fn test_core_fields_present() {
        let resolved = crate::config::ParamLayers::default().resolve().unwrap();
        let ident = WorkdirIdentity::derive("song.mp3", 42);
        let mut b = MetaBuilder::new(&file(), Path::new("out"), Some(&ident));
        b.params(&resolved);
        b.params_digest("d".into());
        let value = serde_json::to_value(b.build(true)).unwrap();

        for field in CORE_FIELDS {
            assert!(lookup(&value, field).is_some(), "missing core field {}", field);
        }
        assert_eq!(value["output"]["audio_wav"], "audio.wav");
        assert_eq!(value["output"]["work_id"], ident.id.as_str());
        assert_eq!(value["schema_version"], "meta.v1");
    }

    #[test]
    fn test_write_meta_sorted_and_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");
        let record = MetaBuilder::new(&file(), dir.path(), None).build(false);
        write_meta(&record, &path).unwrap();

        assert!(!dir.path().join("meta.json.tmp").exists());
        let text = std::fs::read_to_string(&path).unwrap();
        let created = text.find("\"created_at\"").unwrap();
        let schema = text.find("\"schema_version\"").unwrap();
        assert!(created < schema);
        let parsed: MetaRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_actual_audio_from_probe() {
        let json = r#"{"streams": [{"index": 0, "codec_type": "audio",
            "codec_name": "pcm_s16le", "sample_rate": "16000", "channels": 1,
            "bits_per_sample": 16}]}"#;
        let probe = crate::media::probe::parse_ffprobe_json(json).unwrap();
        let actual = actual_audio(&probe).unwrap();
        assert_eq!(actual, expected_audio(&IngestParams::default()));
    }
}
