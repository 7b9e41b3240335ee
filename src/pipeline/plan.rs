//! Deterministic ffmpeg command planning and reproducibility digests
//!
//! Dry-run and executed runs go through `plan` identically; only the
//! `planned` flag differs. That is what makes their digests comparable.

use crate::config::IngestParams;
use crate::digest::{canonical_json, sha256_hex};
use crate::error::Result;
use crate::media::SelectedStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const AUDIO_WAV: &str = "audio.wav";
pub const META_JSON: &str = "meta.json";
pub const CONVERT_LOG: &str = "convert.log";

/// Output codec; fixed by the 16-bit contract
pub const OUTPUT_CODEC: &str = "pcm_s16le";

/// Fixed artifact paths inside one workdir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub workdir: PathBuf,
    pub audio_wav: PathBuf,
    pub meta_json: PathBuf,
    pub convert_log: PathBuf,
}

impl OutputPaths {
    pub fn in_workdir(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            audio_wav: workdir.join(AUDIO_WAV),
            meta_json: workdir.join(META_JSON),
            convert_log: workdir.join(CONVERT_LOG),
        }
    }

    /// Artifacts that already exist and would be replaced
    pub fn existing(&self) -> Vec<&Path> {
        [&self.audio_wav, &self.meta_json, &self.convert_log]
            .into_iter()
            .filter(|p| p.exists())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// A planned (and possibly executed) transcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub command: Vec<String>,
    pub command_str: String,
    pub filtergraph: Option<String>,
    pub cmd_digest: String,
    pub params_digest: String,
    pub planned: bool,
}

/// Build the transcode command for one input
///
/// Overwrite conflicts are checked before planning, so the command always
/// carries `-y`.
pub fn plan(
    params: &IngestParams,
    selected: Option<&SelectedStream>,
    input: &Path,
    outputs: &OutputPaths,
    program: &str,
    planned: bool,
) -> Result<ExecutionPlan> {
    let filtergraph = params
        .normalize_config
        .as_ref()
        .filter(|_| params.normalize)
        .map(|c| c.filtergraph.clone());

    let mut command: Vec<String> = vec![
        program.to_string(),
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
    ];
    if let Some(stream) = selected {
        command.push("-map".into());
        command.push(format!("0:{}", stream.index));
    }
    command.extend([
        "-vn".to_string(),
        "-ar".to_string(),
        params.sample_rate.to_string(),
        "-ac".to_string(),
        params.channels.to_string(),
    ]);
    if let Some(fg) = &filtergraph {
        command.push("-af".into());
        command.push(fg.clone());
    }
    command.extend(
        [
            "-c:a",
            OUTPUT_CODEC,
            "-map_metadata",
            "-1",
            "-fflags",
            "+bitexact",
            "-flags:a",
            "+bitexact",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    command.extend(params.extra_args.iter().cloned());
    command.push(outputs.audio_wav.to_string_lossy().to_string());

    let cmd_digest = cmd_digest(&command, filtergraph.as_deref())?;

    Ok(ExecutionPlan {
        command_str: shell_join(&command),
        command,
        filtergraph,
        cmd_digest,
        params_digest: params_digest(params)?,
        planned,
    })
}

/// `sha256(canonical_json(command) + canonical_json(filtergraph))`
pub fn cmd_digest(command: &[String], filtergraph: Option<&str>) -> Result<String> {
    let mut payload = canonical_json(command)?;
    payload.push_str(&canonical_json(&filtergraph)?);
    Ok(sha256_hex(payload.as_bytes()))
}

/// Digest of the full effective parameter set; contains no paths
pub fn params_digest(params: &IngestParams) -> Result<String> {
    Ok(sha256_hex(canonical_json(params)?.as_bytes()))
}

/// Join arguments into a string a POSIX shell would split back identically
pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}
