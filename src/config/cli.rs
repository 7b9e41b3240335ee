//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// wavprep - Standardize audio/video inputs into PCM WAV
///
/// Converts single files or whole directories into 16-bit PCM WAV workdirs,
/// each with a schema-versioned meta.json, and records batch runs in an
/// append-only JSONL manifest. Requires ffmpeg and ffprobe on PATH.
#[derive(Parser, Debug)]
#[command(name = "wavprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only, no progress bar)
    #[arg(short, long, default_value = "false", global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a file (single mode) or a directory (batch mode)
    Ingest(IngestArgs),
    /// Check that ffmpeg/ffprobe are installed and capable
    CheckDeps(CheckDepsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Input file or directory
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Workdir (file input) or output root (directory input)
    #[arg(long, alias = "out-root", value_name = "DIR")]
    pub out: PathBuf,

    /// YAML config file overriding the built-in defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Target sample rate in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Target channel count
    #[arg(long, value_name = "N")]
    pub channels: Option<u32>,

    /// Output bit depth (only 16 is supported)
    #[arg(long, value_name = "BITS")]
    pub bit_depth: Option<u32>,

    /// Enable single-pass loudness normalization
    #[arg(long, overrides_with = "no_normalize")]
    pub normalize: bool,

    /// Disable loudness normalization
    #[arg(long, overrides_with = "normalize")]
    pub no_normalize: bool,

    /// Container index of the audio stream to extract
    #[arg(long, value_name = "INDEX")]
    pub audio_stream_index: Option<u32>,

    /// Preferred audio language tag (e.g. eng, jpn)
    #[arg(long, value_name = "LANG")]
    pub audio_language: Option<String>,

    /// Extra argument passed to ffmpeg before the output path (repeatable)
    #[arg(long = "ffmpeg-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub ffmpeg_args: Vec<String>,

    /// Replace existing outputs in the workdir
    #[arg(long, default_value = "false")]
    pub overwrite: bool,

    /// Plan only: record commands and digests without running ffmpeg
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Stop the batch at the first failed file
    #[arg(long, default_value = "false")]
    pub fail_fast: bool,

    /// Only scan the top level of the input directory
    #[arg(long, default_value = "false")]
    pub no_recursive: bool,

    /// File extension to include in batch scans (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Manifest file name inside the output root
    #[arg(long, value_name = "NAME", default_value = "manifest.jsonl")]
    pub manifest_name: String,

    /// Batch log file (defaults to <out>/ingest.log)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Number of files processed concurrently in batch mode
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Print meta.json (single mode) to stdout
    #[arg(long, default_value = "false")]
    pub json: bool,
}

impl IngestArgs {
    /// `Some(true)` for --normalize, `Some(false)` for --no-normalize
    pub fn normalize_override(&self) -> Option<bool> {
        match (self.normalize, self.no_normalize) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }

    /// Whether the input should be processed as a batch
    pub fn is_batch(&self) -> bool {
        self.input.is_dir()
    }

    /// Get the effective batch log file
    pub fn batch_log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.out.join("ingest.log"))
    }
}

#[derive(Args, Debug, Clone)]
pub struct CheckDepsArgs {
    /// Output the report as JSON
    #[arg(long, default_value = "false")]
    pub json: bool,
}

impl Cli {
    /// Get the log level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
