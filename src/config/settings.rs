//! Runtime configuration settings

use super::cli::IngestArgs;
use super::loader;
use super::params::{self, IngestParams, ParamError, ParamLayer, ResolvedParams};
use crate::error::Result;
use crate::types::DEFAULT_EXTENSIONS;
use std::path::PathBuf;

/// The four configuration layers, loaded once per run
#[derive(Debug, Clone, Default)]
pub struct ParamLayers {
    pub builtin: IngestParams,
    pub file_defaults: ParamLayer,
    pub user_config: Option<ParamLayer>,
    pub cli: ParamLayer,
}

impl ParamLayers {
    /// Resolve effective params for one input
    pub fn resolve(&self) -> std::result::Result<ResolvedParams, ParamError> {
        params::resolve(
            &self.builtin,
            &self.file_defaults,
            self.user_config.as_ref(),
            &self.cli,
        )
    }
}

/// Runtime settings for an ingest run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Input path (file or directory)
    pub input: PathBuf,
    /// Workdir (single mode) or output root (batch mode)
    pub output: PathBuf,
    /// Configuration layers
    pub layers: ParamLayers,
    /// Replace existing workdir outputs
    pub overwrite: bool,
    /// Plan without executing ffmpeg
    pub dry_run: bool,
    /// Keep going after a failed file
    pub continue_on_error: bool,
    /// Scan recursively
    pub recursive: bool,
    /// Lower-cased extensions (no dot) picked up by the scanner
    pub extensions: Vec<String>,
    /// Manifest file name inside the output root
    pub manifest_name: String,
    /// Files processed concurrently
    pub jobs: usize,
    /// Show progress bars
    pub show_progress: bool,
}

impl Settings {
    /// Create settings from CLI arguments, loading config files
    pub fn from_cli(args: &IngestArgs, quiet: bool) -> Result<Self> {
        let file_defaults = loader::builtin_default_layer()?;
        let user_config = match &args.config {
            Some(path) => Some(loader::load_config_layer(path)?),
            None => None,
        };

        Ok(Self {
            input: args.input.clone(),
            output: args.out.clone(),
            layers: ParamLayers {
                builtin: IngestParams::default(),
                file_defaults,
                user_config,
                cli: cli_layer(args),
            },
            overwrite: args.overwrite,
            dry_run: args.dry_run,
            continue_on_error: !args.fail_fast,
            recursive: !args.no_recursive,
            extensions: normalize_extensions(&args.extensions),
            manifest_name: args.manifest_name.clone(),
            jobs: args.jobs.unwrap_or(1).max(1),
            show_progress: !quiet,
        })
    }

    /// Manifest path for this run; dry runs write `<stem>.plan.jsonl`
    pub fn manifest_path(&self) -> PathBuf {
        if self.dry_run {
            let stem = self
                .manifest_name
                .strip_suffix(".jsonl")
                .unwrap_or(&self.manifest_name);
            self.output.join(format!("{}.plan.jsonl", stem))
        } else {
            self.output.join(&self.manifest_name)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            output: PathBuf::from("./out"),
            layers: ParamLayers::default(),
            overwrite: false,
            dry_run: false,
            continue_on_error: true,
            recursive: true,
            extensions: normalize_extensions(&[]),
            manifest_name: "manifest.jsonl".to_string(),
            jobs: 1,
            show_progress: true,
        }
    }
}

/// Build the CLI layer from explicitly given flags only
fn cli_layer(args: &IngestArgs) -> ParamLayer {
    let mut layer = ParamLayer::new();
    if let Some(v) = args.sample_rate {
        layer.set("sample_rate", v);
    }
    if let Some(v) = args.channels {
        layer.set("channels", v);
    }
    if let Some(v) = args.bit_depth {
        layer.set("bit_depth", v);
    }
    if let Some(v) = args.normalize_override() {
        layer.set("normalize", v);
    }
    if let Some(v) = args.audio_stream_index {
        layer.set("audio_stream_index", v);
    }
    if let Some(v) = &args.audio_language {
        layer.set("audio_language", v.clone());
    }
    if !args.ffmpeg_args.is_empty() {
        layer.set("ffmpeg_extra_args", args.ffmpeg_args.clone());
    }
    layer
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    if exts.is_empty() {
        return DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect();
    }
    exts.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::{Cli, Command};
    use crate::config::params::ParamSource;
    use clap::Parser;

    fn ingest_args(argv: &[&str]) -> IngestArgs {
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Ingest(args) => args,
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_cli_layer_only_sets_given_flags() {
        let args = ingest_args(&["wavprep", "ingest", "in", "--out", "o", "--sample-rate", "48000"]);
        let settings = Settings::from_cli(&args, true).unwrap();
        let resolved = settings.layers.resolve().unwrap();
        assert_eq!(resolved.params.sample_rate, 48000);
        assert_eq!(resolved.provenance.get("sample_rate"), Some(ParamSource::Cli));
        assert_eq!(resolved.provenance.get("channels"), Some(ParamSource::Default));
    }

    #[test]
    fn test_plan_manifest_name() {
        let settings = Settings {
            output: PathBuf::from("out"),
            dry_run: true,
            manifest_name: "run1.jsonl".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.manifest_path(), PathBuf::from("out/run1.plan.jsonl"));
    }

    #[test]
    fn test_extensions_normalized() {
        assert_eq!(
            normalize_extensions(&[".MP3".to_string(), "wav".to_string()]),
            vec!["mp3", "wav"]
        );
        assert!(normalize_extensions(&[]).contains(&"mkv".to_string()));
    }
}
