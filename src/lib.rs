//! wavprep - Reproducible batch ingestion of audio/video into PCM WAV
//!
//! Standardizes single files or whole directory trees into per-input
//! workdirs holding `audio.wav` (16-bit PCM), a schema-versioned `meta.json`
//! and a `convert.log`, and records batch runs in an append-only JSONL
//! manifest. Transcoding and probing are delegated to ffmpeg/ffprobe.
//!
//! # Architecture
//!
//! - `config`: CLI parsing, YAML layers and parameter resolution with provenance
//! - `discovery`: Input scanning and deterministic workdir identity
//! - `media`: ffprobe/ffmpeg backends, stream selection, dependency checks
//! - `pipeline`: Command planning, per-file state machine, outcome
//!   classification and batch orchestration
//! - `export`: meta.json and manifest writers
//!
//! # Example
//!
//! ```no_run
//! use wavprep::{config::Settings, media::Toolchain, pipeline};
//!
//! let settings = Settings::default();
//! let result = pipeline::run(&settings, &Toolchain::system()).expect("Ingest failed");
//! println!("Processed {} files", result.processed());
//! ```

pub mod config;
pub mod digest;
pub mod discovery;
pub mod error;
pub mod export;
pub mod media;
pub mod pipeline;
pub mod types;

// Re-export key types at crate root
pub use error::{Result, WavprepError};
pub use pipeline::{ErrorCode, WarningCode};
pub use types::{ProbeResult, Status, StreamDescriptor};
