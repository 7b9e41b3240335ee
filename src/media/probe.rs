//! ffprobe-backed media introspection
//!
//! ffprobe reports most numeric fields as strings (`"sample_rate": "48000"`),
//! so the raw document is deserialized loosely and normalized into
//! `ProbeResult` afterwards.

use super::process::run_with_timeout;
use super::traits::{MediaProber, ToolFailure};
use crate::types::{ProbeResult, StreamDescriptor, VideoStreamDescriptor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Wall-clock limit for a single probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

const PROBE_ARGS: &[&str] = &[
    "-hide_banner",
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

/// Prober shelling out to `ffprobe`
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<ProbeResult, ToolFailure> {
        let mut args: Vec<String> = PROBE_ARGS.iter().map(|s| s.to_string()).collect();
        args.push(path.to_string_lossy().to_string());

        let output =
            run_with_timeout(&self.program, &args, self.timeout).map_err(|e| ToolFailure::Spawn {
                tool: "ffprobe".to_string(),
                reason: e.to_string(),
            })?;

        if output.timed_out {
            return Err(ToolFailure::Timeout {
                tool: "ffprobe".to_string(),
                secs: self.timeout.as_secs(),
            });
        }
        if !output.success() {
            return Err(ToolFailure::Failed {
                tool: "ffprobe".to_string(),
                exit_code: output.recorded_exit_code(),
                stderr: output.stderr,
            });
        }

        let result = parse_ffprobe_json(&output.stdout)?;
        debug!(
            "Probed {}: {} audio, {} video streams",
            path.display(),
            result.audio_streams.len(),
            result.video_streams.len()
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "ffprobe"
    }
}

// =============================================================================
// Raw ffprobe document
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct RawProbe {
    #[serde(default)]
    streams: Vec<RawStream>,
    #[serde(default)]
    format: Option<RawFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStream {
    index: Option<u32>,
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<Value>,
    channels: Option<Value>,
    channel_layout: Option<String>,
    bit_rate: Option<Value>,
    bits_per_sample: Option<Value>,
    bits_per_raw_sample: Option<Value>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    disposition: HashMap<String, i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    format_name: Option<String>,
    duration: Option<Value>,
}

/// Normalize ffprobe's `-print_format json` output
pub fn parse_ffprobe_json(text: &str) -> Result<ProbeResult, ToolFailure> {
    let raw: RawProbe = serde_json::from_str(text).map_err(|e| ToolFailure::Parse {
        tool: "ffprobe".to_string(),
        reason: e.to_string(),
    })?;

    let mut result = ProbeResult::default();

    for (position, stream) in raw.streams.into_iter().enumerate() {
        let index = stream.index.unwrap_or(position as u32);
        match stream.codec_type.as_deref() {
            Some("audio") => {
                let bits = as_u64(stream.bits_per_sample.as_ref())
                    .filter(|b| *b > 0)
                    .or_else(|| as_u64(stream.bits_per_raw_sample.as_ref()).filter(|b| *b > 0))
                    .map(|b| b as u32);
                result.audio_streams.push(StreamDescriptor {
                    index,
                    codec_name: stream.codec_name,
                    sample_rate: as_u64(stream.sample_rate.as_ref()).unwrap_or(0) as u32,
                    channels: as_u64(stream.channels.as_ref()).unwrap_or(0) as u32,
                    bit_rate: as_u64(stream.bit_rate.as_ref()),
                    channel_layout: stream.channel_layout,
                    language: language_tag(&stream.tags),
                    bits_per_sample: bits,
                });
            }
            // Embedded cover art shows up as a video stream
            Some("video") if stream.disposition.get("attached_pic").copied() != Some(1) => {
                result.video_streams.push(VideoStreamDescriptor {
                    index,
                    codec_name: stream.codec_name,
                    width: stream.width,
                    height: stream.height,
                    frame_rate: stream.r_frame_rate,
                });
            }
            _ => {}
        }
    }

    result.has_video = !result.video_streams.is_empty();
    if let Some(format) = raw.format {
        result.format_name = format.format_name;
        result.duration = as_f64(format.duration.as_ref());
    }

    Ok(result)
}

fn language_tag(tags: &HashMap<String, String>) -> Option<String> {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("language"))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MKV_PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264",
             "width": 1920, "height": 1080, "r_frame_rate": "25/1"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "sample_rate": "48000", "channels": 2, "channel_layout": "stereo",
             "bit_rate": "192000", "bits_per_sample": 0,
             "tags": {"language": "eng"}},
            {"index": 2, "codec_type": "audio", "codec_name": "ac3",
             "sample_rate": "48000", "channels": 6,
             "tags": {"LANGUAGE": "ger"}},
            {"index": 3, "codec_type": "subtitle", "codec_name": "subrip"}
        ],
        "format": {"format_name": "matroska,webm", "duration": "61.440000"}
    }"#;

    #[test]
    fn test_parse_streams_and_format() {
        let probe = parse_ffprobe_json(MKV_PROBE).unwrap();
        assert!(probe.has_video);
        assert_eq!(probe.audio_streams.len(), 2);
        assert_eq!(probe.video_streams[0].width, Some(1920));

        let eng = &probe.audio_streams[0];
        assert_eq!(eng.index, 1);
        assert_eq!(eng.sample_rate, 48000);
        assert_eq!(eng.bit_rate, Some(192000));
        assert_eq!(eng.language.as_deref(), Some("eng"));
        assert_eq!(eng.bits_per_sample, None);

        assert_eq!(probe.audio_streams[1].language.as_deref(), Some("ger"));
        assert_eq!(probe.audio_streams[1].bit_rate, None);
        assert_eq!(probe.format_name.as_deref(), Some("matroska,webm"));
        assert_eq!(probe.duration, Some(61.44));
    }

    #[test]
    fn test_cover_art_is_not_video() {
        let json = r#"{"streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "mp3",
             "sample_rate": "44100", "channels": 2},
            {"index": 1, "codec_type": "video", "codec_name": "mjpeg",
             "disposition": {"attached_pic": 1}}
        ]}"#;
        let probe = parse_ffprobe_json(json).unwrap();
        assert!(!probe.has_video);
        assert!(probe.video_streams.is_empty());
        assert_eq!(probe.duration, None);
    }

    #[test]
    fn test_wav_bit_depth() {
        let json = r#"{"streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "pcm_s16le",
             "sample_rate": "16000", "channels": 1, "bits_per_sample": 16}
        ]}"#;
        let probe = parse_ffprobe_json(json).unwrap();
        assert_eq!(probe.audio_streams[0].bits_per_sample, Some(16));
    }

    #[test]
    fn test_invalid_json_is_parse_failure() {
        let err = parse_ffprobe_json("not json").unwrap_err();
        assert!(matches!(err, ToolFailure::Parse { .. }));
    }
}
