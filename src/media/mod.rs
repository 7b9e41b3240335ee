//! External media tooling: probing, stream selection, transcoding and
//! dependency checks

pub mod deps;
pub mod probe;
pub mod process;
pub mod select;
pub mod traits;
pub mod transcode;

pub use deps::{check_deps, DepsReport, SystemDependencyChecker, ToolInfo};
pub use probe::FfprobeProber;
pub use process::ToolOutput;
pub use select::{select, SelectedStream, SelectionError, SelectionStrategy};
pub use traits::{DependencyChecker, MediaProber, ToolFailure, Transcoder};
pub use transcode::{write_convert_log, FfmpegTranscoder};

use std::path::PathBuf;
use std::sync::Arc;

/// The external collaborators of one run
#[derive(Clone)]
pub struct Toolchain {
    pub prober: Arc<dyn MediaProber>,
    pub transcoder: Arc<dyn Transcoder>,
    pub deps: Arc<dyn DependencyChecker>,
}

impl Toolchain {
    pub fn new(
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn Transcoder>,
        deps: Arc<dyn DependencyChecker>,
    ) -> Self {
        Self {
            prober,
            transcoder,
            deps,
        }
    }

    /// ffmpeg/ffprobe from env overrides or `PATH`
    ///
    /// Unresolved tools fall back to their bare names; the dependency check
    /// reports them before anything runs.
    pub fn system() -> Self {
        let ffmpeg = deps::locate_tool("ffmpeg", deps::FFMPEG_ENV);
        let ffprobe = deps::locate_tool("ffprobe", deps::FFPROBE_ENV);

        Self {
            prober: Arc::new(FfprobeProber::new(
                ffprobe.clone().unwrap_or_else(|| PathBuf::from("ffprobe")),
            )),
            transcoder: Arc::new(FfmpegTranscoder::new(
                ffmpeg.clone().unwrap_or_else(|| PathBuf::from("ffmpeg")),
            )),
            deps: Arc::new(SystemDependencyChecker::new(ffmpeg, ffprobe)),
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("prober", &self.prober.name())
            .field("transcoder", &self.transcoder.name())
            .finish()
    }
}
