//! Per-file ingest state machine
//!
//! ```text
//! pending → resolving_params → selecting_stream → planning
//!         → (dry_run_done | executing → classifying) → recorded
//! ```
//!
//! Any stage failure jumps straight to `recorded`. Dry-run and executed
//! files share every stage up to and including planning, so their digests
//! are computed identically.

use super::outcome::{
    classify_input_probe, classify_output_probe, classify_param_error,
    classify_selection_error, classify_transcode, exit_code_for, internal_error,
    output_mismatch, ErrorCode, ErrorEntry, WarningCode, WarningEntry,
};
use super::plan::{self, OutputPaths};
use crate::config::Settings;
use crate::digest::sha256_file;
use crate::discovery::{DiscoveredFile, WorkdirIdentity};
use crate::export::meta::{write_meta, MetaBuilder, MetaRecord};
use crate::media::{self, write_convert_log, DepsReport, ToolOutput, Toolchain};
use crate::types::Status;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Shared, read-only context for every file of a run
#[derive(Debug, Clone, Copy)]
pub struct IngestContext<'a> {
    pub settings: &'a Settings,
    pub toolchain: &'a Toolchain,
    pub deps: &'a DepsReport,
}

/// One unit of work
#[derive(Debug, Clone)]
pub struct FileJob {
    pub file: DiscoveredFile,
    pub outputs: OutputPaths,
    /// Present in batch mode only
    pub identity: Option<WorkdirIdentity>,
    pub batch: bool,
}

impl FileJob {
    /// Batch input under `out_root/<safe_stem>__<id>`
    pub fn batch(file: DiscoveredFile, out_root: &Path) -> Self {
        let identity = WorkdirIdentity::derive(&file.relpath, file.size_bytes);
        let workdir = out_root.join(identity.dir_name());
        Self {
            file,
            outputs: OutputPaths::in_workdir(&workdir),
            identity: Some(identity),
            batch: true,
        }
    }

    /// Single input written directly into `workdir`
    pub fn single(input: &Path, workdir: &Path) -> Self {
        let file = DiscoveredFile::single(input).unwrap_or_else(|e| {
            debug!("Cannot stat {}: {}", input.display(), e);
            DiscoveredFile::unreadable(input)
        });
        Self {
            file,
            outputs: OutputPaths::in_workdir(workdir),
            identity: None,
            batch: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    ResolvingParams,
    SelectingStream,
    Planning,
    DryRunDone,
    Executing,
    Classifying,
    Recorded,
}

impl FileState {
    pub fn as_str(self) -> &'static str {
        match self {
            FileState::Pending => "pending",
            FileState::ResolvingParams => "resolving_params",
            FileState::SelectingStream => "selecting_stream",
            FileState::Planning => "planning",
            FileState::DryRunDone => "dry_run_done",
            FileState::Executing => "executing",
            FileState::Classifying => "classifying",
            FileState::Recorded => "recorded",
        }
    }

    /// Legal transitions; every state may jump to `Recorded`
    pub fn can_advance_to(self, next: FileState) -> bool {
        use FileState::*;
        matches!(
            (self, next),
            (Pending, ResolvingParams)
                | (ResolvingParams, SelectingStream)
                | (SelectingStream, Planning)
                | (Planning, DryRunDone)
                | (Planning, Executing)
                | (Executing, Classifying)
        ) || (next == Recorded && self != Recorded)
    }
}

/// Everything known about one processed file
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: DiscoveredFile,
    pub outputs: OutputPaths,
    pub identity: Option<WorkdirIdentity>,
    pub meta: MetaRecord,
    /// Where meta.json was written, if it was
    pub meta_path: Option<PathBuf>,
    pub exit_code: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub trace: Vec<FileState>,
}

impl FileOutcome {
    pub fn status(&self) -> Status {
        self.meta.status
    }

    pub fn is_failed(&self) -> bool {
        self.meta.status.is_failed()
    }

    pub fn errors(&self) -> &[ErrorEntry] {
        &self.meta.errors
    }

    pub fn warnings(&self) -> &[WarningEntry] {
        &self.meta.warnings
    }

    pub fn planned(&self) -> bool {
        self.meta.execution.planned
    }

    /// First error message, or a status word
    pub fn message(&self) -> String {
        match self.meta.errors.first() {
            Some(e) => e.message.clone(),
            None => self.meta.status.as_str().to_string(),
        }
    }
}

/// Tracks the state of one file through the pipeline
struct FileRun<'a> {
    relpath: &'a str,
    state: FileState,
    trace: Vec<FileState>,
}

impl<'a> FileRun<'a> {
    fn new(relpath: &'a str) -> Self {
        Self {
            relpath,
            state: FileState::Pending,
            trace: vec![FileState::Pending],
        }
    }

    fn advance(&mut self, next: FileState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            "{}: {} -> {}",
            self.relpath,
            self.state.as_str(),
            next.as_str()
        );
        self.state = next;
        self.trace.push(next);
    }
}

/// Run one file through every stage and record its outcome
///
/// Never returns an error: every failure becomes an entry in the file's
/// metadata, which is written whenever the workdir exists.
pub fn ingest_one(ctx: &IngestContext<'_>, job: &FileJob) -> FileOutcome {
    let started_at = Utc::now();
    let timer = Instant::now();
    let settings = ctx.settings;
    let planned = settings.dry_run;
    // Batch dry-runs leave no trace in workdirs
    let writes_artifacts = !(planned && job.batch);

    let mut run = FileRun::new(&job.file.relpath);
    let mut meta = MetaBuilder::new(&job.file, &job.outputs.workdir, job.identity.as_ref());
    meta.tooling(ctx.deps);

    if writes_artifacts {
        if let Err(e) = std::fs::create_dir_all(&job.outputs.workdir) {
            warn!(
                "Cannot create workdir {}: {}",
                job.outputs.workdir.display(),
                e
            );
            meta.error(
                ErrorEntry::new(
                    ErrorCode::OutputNotWritable,
                    format!("cannot create workdir: {}", e),
                )
                .with_hint("Check write permissions for the output directory"),
            );
            run.advance(FileState::Recorded);
            return finish(job, meta.build(planned), None, run, started_at, timer);
        }
    }

    run_stages(ctx, job, &mut run, &mut meta, writes_artifacts);
    run.advance(FileState::Recorded);

    let mut record = meta.build(planned);
    let mut meta_path = None;
    if writes_artifacts {
        match write_meta(&record, &job.outputs.meta_json) {
            Ok(()) => meta_path = Some(job.outputs.meta_json.clone()),
            Err(e) => {
                warn!("{}: {}", job.file.relpath, e);
                record.errors.push(ErrorEntry::new(
                    ErrorCode::OutputNotWritable,
                    format!("cannot write meta.json: {}", e),
                ));
                record.status = Status::Failed;
            }
        }
    }

    finish(job, record, meta_path, run, started_at, timer)
}

/// Stages up to classification; returns early on the first error
fn run_stages(
    ctx: &IngestContext<'_>,
    job: &FileJob,
    run: &mut FileRun<'_>,
    meta: &mut MetaBuilder,
    writes_artifacts: bool,
) {
    let settings = ctx.settings;
    let input = &job.file.path;
    let outputs = &job.outputs;

    run.advance(FileState::ResolvingParams);
    let resolved = match settings.layers.resolve() {
        Ok(r) => r,
        Err(e) => {
            meta.error(classify_param_error(&e));
            return;
        }
    };
    meta.params(&resolved);
    let params = &resolved.params;
    match plan::params_digest(params) {
        Ok(digest) => {
            meta.params_digest(digest);
        }
        Err(e) => {
            meta.error(internal_error(format!("params digest failed: {}", e)));
            return;
        }
    }

    if writes_artifacts && !settings.overwrite {
        let existing = outputs.existing();
        if !existing.is_empty() {
            let names: Vec<String> = existing
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .collect();
            meta.error(
                ErrorEntry::new(
                    ErrorCode::OverwriteConflict,
                    "workdir already contains outputs; use --overwrite to replace",
                )
                .with_hint("Pass --overwrite to replace existing outputs")
                .with_detail(names.join(", ")),
            );
            return;
        }
    }

    if let Some(error) = check_input(input) {
        meta.error(error);
        return;
    }

    run.advance(FileState::SelectingStream);
    let probe = match ctx.toolchain.prober.probe(input) {
        Ok(p) => p,
        Err(e) => {
            meta.error(classify_input_probe(&e));
            return;
        }
    };
    meta.input_probe(&probe);
    debug!(
        "{}: {:?} input, {} audio stream(s)",
        job.file.relpath,
        probe.media_kind(),
        probe.audio_streams.len()
    );

    let selected = match media::select(
        &probe,
        params.audio_stream_index,
        params.audio_language.as_deref(),
    ) {
        Ok(s) => s,
        Err(e) => {
            meta.error(classify_selection_error(&e));
            return;
        }
    };
    meta.selection(&selected);
    debug!(
        "{}: selected audio stream {} ({:?})",
        job.file.relpath, selected.index, selected.strategy
    );

    run.advance(FileState::Planning);
    let program = ctx.toolchain.transcoder.program();
    let plan = match plan::plan(
        params,
        Some(&selected),
        input,
        outputs,
        &program,
        settings.dry_run,
    ) {
        Ok(p) => p,
        Err(e) => {
            meta.error(internal_error(format!("planning failed: {}", e)));
            return;
        }
    };
    meta.plan(&plan);

    if settings.dry_run {
        run.advance(FileState::DryRunDone);
        return;
    }

    run.advance(FileState::Executing);
    // A leftover audio.wav must not pass for this run's output
    if outputs.audio_wav.exists() {
        if let Err(e) = std::fs::remove_file(&outputs.audio_wav) {
            meta.error(
                ErrorEntry::new(
                    ErrorCode::OutputNotWritable,
                    format!("cannot replace existing audio.wav: {}", e),
                )
                .with_hint("Check write permissions for the workdir"),
            );
            return;
        }
    }
    info!("Converting {}", job.file.relpath);
    let result = ctx.toolchain.transcoder.run(&plan.command);

    let logged = match &result {
        Ok(out) => out.clone(),
        Err(failure) => ToolOutput {
            exit_code: None,
            stderr: failure.to_string(),
            ..Default::default()
        },
    };
    if let Err(e) = write_convert_log(
        &outputs.convert_log,
        input,
        &outputs.audio_wav,
        &plan.command_str,
        &logged,
    ) {
        warn!("Could not write {}: {}", outputs.convert_log.display(), e);
    }
    meta.execution_result(&logged);

    run.advance(FileState::Classifying);
    if let Some(error) = classify_transcode(&result) {
        meta.error(error);
        return;
    }
    if !outputs.audio_wav.is_file() {
        meta.error(
            ErrorEntry::new(
                ErrorCode::ConvertFailed,
                "ffmpeg reported success but produced no audio.wav",
            )
            .with_hint("See convert.log in the workdir"),
        );
        return;
    }

    verify_output(ctx, outputs, meta);
}

/// `input_not_found` unless `input` is a readable regular file
fn check_input(input: &Path) -> Option<ErrorEntry> {
    match std::fs::metadata(input) {
        Ok(m) if m.is_file() => None,
        Ok(_) => Some(
            ErrorEntry::new(
                ErrorCode::InputNotFound,
                format!("input is not a regular file: {}", input.display()),
            )
            .with_hint("Pass a media file, or a directory for batch mode"),
        ),
        Err(e) => Some(
            ErrorEntry::new(
                ErrorCode::InputNotFound,
                format!("input file not found: {}", input.display()),
            )
            .with_hint("Check the path and try again")
            .with_detail(e.to_string()),
        ),
    }
}

/// Output checks after a successful transcode; these only ever warn
fn verify_output(ctx: &IngestContext<'_>, outputs: &OutputPaths, meta: &mut MetaBuilder) {
    match ctx.toolchain.prober.probe(&outputs.audio_wav) {
        Ok(probe) => {
            meta.output_probe(&probe);
            if probe.audio_streams.is_empty() {
                meta.warning(WarningEntry::new(
                    WarningCode::ProbeNoAudioStream,
                    "output probe found no audio stream",
                ));
            } else if let Some(actual) = crate::export::meta::actual_audio(&probe) {
                if let Some(w) = output_mismatch(meta.expected_audio(), &actual) {
                    meta.warning(w);
                }
            }
        }
        Err(e) => {
            warn!("Output probe failed for {}: {}", outputs.audio_wav.display(), e);
            meta.warning(classify_output_probe(&e));
        }
    }

    match sha256_file(&outputs.audio_wav) {
        Ok(digest) => {
            meta.output_sha256(digest);
        }
        Err(e) => warn!("Could not hash {}: {}", outputs.audio_wav.display(), e),
    }
}

fn finish(
    job: &FileJob,
    meta: MetaRecord,
    meta_path: Option<PathBuf>,
    run: FileRun<'_>,
    started_at: DateTime<Utc>,
    timer: Instant,
) -> FileOutcome {
    let exit_code = exit_code_for(&meta.errors);
    match meta.status {
        Status::Failed => warn!(
            "{}: failed ({})",
            job.file.relpath,
            meta.errors
                .iter()
                .map(|e| e.code.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        status => debug!("{}: {}", job.file.relpath, status.as_str()),
    }

    FileOutcome {
        file: job.file.clone(),
        outputs: job.outputs.clone(),
        identity: job.identity.clone(),
        meta,
        meta_path,
        exit_code,
        started_at,
        ended_at: Utc::now(),
        duration_ms: timer.elapsed().as_millis() as u64,
        trace: run.trace,
    }
}

/// Outcome for a file whose processing panicked
///
/// meta.json is still written on a best-effort basis.
pub fn internal_failure(ctx: &IngestContext<'_>, job: &FileJob, message: &str) -> FileOutcome {
    let started_at = Utc::now();
    let timer = Instant::now();
    let planned = ctx.settings.dry_run;

    let mut run = FileRun::new(&job.file.relpath);
    let mut meta = MetaBuilder::new(&job.file, &job.outputs.workdir, job.identity.as_ref());
    meta.tooling(ctx.deps);
    meta.error(internal_error(message));
    run.advance(FileState::Recorded);

    let record = meta.build(planned);
    let writes_artifacts = !(planned && job.batch);
    let meta_path = (writes_artifacts && job.outputs.workdir.is_dir())
        .then(|| write_meta(&record, &job.outputs.meta_json).ok())
        .flatten()
        .map(|_| job.outputs.meta_json.clone());

    finish(job, record, meta_path, run, started_at, timer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use FileState::*;
        assert!(Pending.can_advance_to(ResolvingParams));
        assert!(Planning.can_advance_to(DryRunDone));
        assert!(Planning.can_advance_to(Executing));
        assert!(SelectingStream.can_advance_to(Recorded));
        assert!(!Pending.can_advance_to(Executing));
        assert!(!DryRunDone.can_advance_to(Executing));
        assert!(!Recorded.can_advance_to(Recorded));
    }

    #[test]
    fn test_batch_job_uses_identity_dir() {
        let file = DiscoveredFile {
            path: PathBuf::from("/in/a b.mp3"),
            relpath: "a b.mp3".to_string(),
            ext: ".mp3".to_string(),
            size_bytes: 7,
        };
        let job = FileJob::batch(file, Path::new("/out"));
        let ident = job.identity.clone().unwrap();
        assert_eq!(job.outputs.workdir, Path::new("/out").join(ident.dir_name()));
        assert!(ident.dir_name().starts_with("ab__"));
        assert!(job.batch);
    }

    #[test]
    fn test_single_job_has_no_identity() {
        let job = FileJob::single(Path::new("/in/x.wav"), Path::new("/out/x"));
        assert!(job.identity.is_none());
        assert_eq!(job.outputs.audio_wav, Path::new("/out/x/audio.wav"));
        assert!(!job.batch);
    }
}
