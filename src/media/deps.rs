//! External dependency discovery and capability checks
//!
//! Run once per ingest run (and by `check-deps`). Any error here aborts a
//! batch before a single file is touched.

use super::process::run_with_timeout;
use super::traits::DependencyChecker;
use crate::pipeline::outcome::{ErrorCode, ErrorEntry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Wall-clock limit for `-version` and capability listings
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment overrides for tool locations
pub const FFMPEG_ENV: &str = "WAVPREP_FFMPEG";
pub const FFPROBE_ENV: &str = "WAVPREP_FFPROBE";

/// Encoder every run needs
pub const REQUIRED_ENCODER: &str = "pcm_s16le";

/// Decoders reported for information only
pub const REPORTED_DECODERS: &[&str] = &["mp3", "aac", "flac", "opus"];

/// `check-deps` exit codes
pub const EXIT_DEPS_MISSING: u8 = 2;
pub const EXIT_DEPS_BROKEN: u8 = 3;
pub const EXIT_DEPS_INSUFFICIENT: u8 = 4;

/// A located and runnable tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub path: String,
    pub version: Option<String>,
    /// The `configuration:` line of `-version`
    pub configuration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub pcm_s16le_encoder: bool,
    pub decoders: BTreeMap<String, bool>,
}

/// Result of a dependency check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepsReport {
    pub ok: bool,
    pub ffmpeg: Option<ToolInfo>,
    pub ffprobe: Option<ToolInfo>,
    pub capabilities: Capabilities,
    pub errors: Vec<ErrorEntry>,
    pub created_at: String,
    pub platform: String,
}

impl DepsReport {
    /// Report with no tools and no errors; callers fill it in
    pub fn empty() -> Self {
        Self {
            ok: true,
            ffmpeg: None,
            ffprobe: None,
            capabilities: Capabilities::default(),
            errors: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
            platform: platform(),
        }
    }

    pub fn push_error(&mut self, entry: ErrorEntry) {
        self.ok = false;
        self.errors.push(entry);
    }

    /// `check-deps` exit code: missing beats broken beats insufficient
    pub fn exit_code(&self) -> u8 {
        let has = |code: ErrorCode| self.errors.iter().any(|e| e.code == code);
        if self.errors.is_empty() {
            0
        } else if has(ErrorCode::DepsMissing) {
            EXIT_DEPS_MISSING
        } else if has(ErrorCode::DepsBroken) {
            EXIT_DEPS_BROKEN
        } else if has(ErrorCode::DepsInsufficient) {
            EXIT_DEPS_INSUFFICIENT
        } else {
            EXIT_DEPS_MISSING
        }
    }
}

/// Checker probing the real ffmpeg/ffprobe installation
#[derive(Debug, Clone)]
pub struct SystemDependencyChecker {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
}

impl SystemDependencyChecker {
    pub fn new(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// Locate both tools via env overrides, then `PATH`
    pub fn locate() -> Self {
        Self::new(
            locate_tool("ffmpeg", FFMPEG_ENV),
            locate_tool("ffprobe", FFPROBE_ENV),
        )
    }
}

impl DependencyChecker for SystemDependencyChecker {
    fn check(&self) -> DepsReport {
        check_deps(self.ffmpeg.as_deref(), self.ffprobe.as_deref())
    }
}

/// Check tool presence, health and the capabilities ingest relies on
pub fn check_deps(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> DepsReport {
    let mut report = DepsReport::empty();

    report.ffmpeg = check_tool("ffmpeg", ffmpeg, &mut report);
    report.ffprobe = check_tool("ffprobe", ffprobe, &mut report);

    if let (true, Some(path)) = (report.ffmpeg.is_some(), ffmpeg) {
        match list_codecs(path, "-encoders") {
            Some(listing) => {
                report.capabilities.pcm_s16le_encoder = has_codec(&listing, REQUIRED_ENCODER);
                if !report.capabilities.pcm_s16le_encoder {
                    report.push_error(
                        ErrorEntry::new(
                            ErrorCode::DepsInsufficient,
                            format!("ffmpeg lacks the {} encoder", REQUIRED_ENCODER),
                        )
                        .with_hint("Install a full ffmpeg build"),
                    );
                }
            }
            None => report.push_error(ErrorEntry::new(
                ErrorCode::DepsBroken,
                "ffmpeg -encoders failed",
            )),
        }

        if let Some(listing) = list_codecs(path, "-decoders") {
            for name in REPORTED_DECODERS {
                let present = has_codec(&listing, name);
                if !present {
                    warn!("ffmpeg has no {} decoder", name);
                }
                report
                    .capabilities
                    .decoders
                    .insert(name.to_string(), present);
            }
        }
    }

    debug!("Dependency check: ok={}, {} errors", report.ok, report.errors.len());
    report
}

fn check_tool(name: &str, path: Option<&Path>, report: &mut DepsReport) -> Option<ToolInfo> {
    let Some(path) = path else {
        report.push_error(
            ErrorEntry::new(ErrorCode::DepsMissing, format!("{} not found", name))
                .with_hint(format!("Install ffmpeg or set {}", env_var_for(name))),
        );
        return None;
    };

    let args = vec!["-version".to_string()];
    match run_with_timeout(path, &args, VERSION_TIMEOUT) {
        Ok(out) if out.success() => {
            let (version, configuration) = parse_version(&out.stdout);
            Some(ToolInfo {
                path: path.display().to_string(),
                version,
                configuration,
            })
        }
        Ok(out) => {
            report.push_error(
                ErrorEntry::new(
                    ErrorCode::DepsBroken,
                    format!("{} -version exited with {}", name, out.recorded_exit_code()),
                )
                .with_detail(out.stderr),
            );
            None
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            report.push_error(ErrorEntry::new(
                ErrorCode::DepsMissing,
                format!("{} not found at {}", name, path.display()),
            ));
            None
        }
        Err(e) => {
            report.push_error(
                ErrorEntry::new(ErrorCode::DepsBroken, format!("{} could not be run", name))
                    .with_detail(e.to_string()),
            );
            None
        }
    }
}

fn env_var_for(name: &str) -> &'static str {
    if name == "ffprobe" {
        FFPROBE_ENV
    } else {
        FFMPEG_ENV
    }
}

fn list_codecs(ffmpeg: &Path, flag: &str) -> Option<String> {
    let args = vec!["-hide_banner".to_string(), flag.to_string()];
    run_with_timeout(ffmpeg, &args, VERSION_TIMEOUT)
        .ok()
        .filter(|out| out.success())
        .map(|out| out.stdout)
}

/// Codec listings are ` <flags> <name> <description>` lines
fn has_codec(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

/// Extract the version token and configuration line from `-version` output
pub fn parse_version(stdout: &str) -> (Option<String>, Option<String>) {
    let version = stdout.lines().next().and_then(|first| {
        let mut words = first.split_whitespace();
        while let Some(word) = words.next() {
            if word == "version" {
                return words.next().map(str::to_string);
            }
        }
        None
    });
    let configuration = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("configuration:"))
        .map(|c| c.trim().to_string());
    (version, configuration)
}

/// Env override if set, otherwise a `PATH` lookup
pub fn locate_tool(name: &str, env_var: &str) -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(env_var).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(value));
    }
    find_in_path(name)
}

/// First executable file named `name` on `PATH`
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

pub fn platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
