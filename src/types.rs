//! Core data types for wavprep
//!
//! These types describe probed media and per-file outcomes and flow through
//! the pipeline unchanged once created.

use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Probe results
// =============================================================================

/// One audio stream as reported by the media probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Container-level stream index (the value passed to `-map 0:<index>`)
    pub index: u32,
    pub codec_name: Option<String>,
    /// 0 when the probe did not report a sample rate
    pub sample_rate: u32,
    /// 0 when the probe did not report a channel count
    pub channels: u32,
    pub bit_rate: Option<u64>,
    pub channel_layout: Option<String>,
    /// Language tag from stream metadata (e.g. "eng")
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u32>,
}

/// Lightweight description of a video stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStreamDescriptor {
    pub index: u32,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<String>,
}

/// Structured description of a media container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub has_video: bool,
    pub audio_streams: Vec<StreamDescriptor>,
    pub video_streams: Vec<VideoStreamDescriptor>,
    /// Duration in seconds
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
}

impl ProbeResult {
    /// Find an audio stream by its container index
    pub fn audio_stream(&self, index: u32) -> Option<&StreamDescriptor> {
        self.audio_streams.iter().find(|s| s.index == index)
    }

    /// Classify the input by its streams
    pub fn media_kind(&self) -> MediaKind {
        match (self.audio_streams.is_empty(), self.has_video) {
            (false, true) => MediaKind::Video,
            (false, false) => MediaKind::Audio,
            (true, true) => MediaKind::Video,
            (true, false) => MediaKind::Unknown,
        }
    }
}

/// Coarse classification of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Unknown,
}

/// Audio attributes of a WAV output (expected, or read back by the probe)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub codec: Option<String>,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
}

// =============================================================================
// Per-file status
// =============================================================================

/// Terminal outcome of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failed,
    Planned,
}

impl Status {
    pub fn is_failed(self) -> bool {
        self == Status::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Planned => "planned",
        }
    }
}

// =============================================================================
// Supported inputs
// =============================================================================

/// Extensions picked up by the batch scanner when `--ext` is not given
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "wav", "flac", "ogg", "opus", "aac", "mp4", "mkv", "mov",
];

/// Lower-cased extension of a path, without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Dotted, lower-cased extension as recorded in metadata (".mp3"), or ""
pub fn dotted_extension(path: &Path) -> String {
    extension_of(path)
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}
