//! Batch and single-file orchestration
//!
//! The dependency check runs once per run, before any file. Batch files are
//! processed in scan order (optionally in windows of `jobs` on a local rayon
//! pool) and their manifest lines are appended in that same order.

use super::ingest::{ingest_one, internal_failure, FileJob, FileOutcome, IngestContext};
use super::outcome::{EXIT_DEPS, EXIT_FAILURE, EXIT_OK};
use crate::config::Settings;
use crate::discovery;
use crate::error::{Result, WavprepError};
use crate::export::{ManifestRecord, ManifestWriter};
use crate::media::{DepsReport, Toolchain};
use crate::types::Status;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Batch run summary
#[derive(Debug)]
pub struct PipelineResult {
    /// Files found by the scan
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub planned: usize,
    /// Files never started because of fail-fast
    pub skipped: usize,
    pub exit_code: u8,
    /// `None` when the run stopped before the manifest was created
    pub manifest_path: Option<PathBuf>,
    pub deps: DepsReport,
}

impl PipelineResult {
    fn deps_failed(deps: DepsReport) -> Self {
        Self {
            total_files: 0,
            successful: 0,
            failed: 0,
            planned: 0,
            skipped: 0,
            exit_code: EXIT_DEPS,
            manifest_path: None,
            deps,
        }
    }

    pub fn processed(&self) -> usize {
        self.successful + self.failed + self.planned
    }
}

/// Single-file run summary
#[derive(Debug)]
pub struct SingleResult {
    /// `None` when the dependency check failed
    pub outcome: Option<FileOutcome>,
    pub exit_code: u8,
    pub deps: DepsReport,
}

/// Run a batch over `settings.input` into the output root `settings.output`
pub fn run(settings: &Settings, toolchain: &Toolchain) -> Result<PipelineResult> {
    let pipeline_start = Instant::now();

    let deps = toolchain.deps.check();
    if !deps.ok {
        log_deps_failure(&deps);
        return Ok(PipelineResult::deps_failed(deps));
    }

    std::fs::create_dir_all(&settings.output)
        .map_err(|e| WavprepError::output_error(&settings.output, e))?;

    info!("Scanning {}...", settings.input.display());
    let files = discovery::scan(&settings.input, settings.recursive, &settings.extensions)?;

    let manifest_path = settings.manifest_path();
    let mut manifest = ManifestWriter::create(&manifest_path)?;

    let jobs: Vec<FileJob> = files
        .into_iter()
        .map(|f| FileJob::batch(f, &settings.output))
        .collect();
    let total_files = jobs.len();

    let ctx = IngestContext {
        settings,
        toolchain,
        deps: &deps,
    };

    let progress_bar = settings.show_progress.then(|| {
        let pb = ProgressBar::new(total_files as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb
    });

    let pool = build_pool(settings.jobs)?;
    let window = settings.jobs.max(1);

    let mut successful = 0;
    let mut failed = 0;
    let mut planned = 0;
    let mut started = 0;

    for chunk in jobs.chunks(window) {
        started += chunk.len();
        let outcomes: Vec<FileOutcome> = match &pool {
            Some(pool) => pool.install(|| chunk.par_iter().map(|job| process(&ctx, job)).collect()),
            None => chunk.iter().map(|job| process(&ctx, job)).collect(),
        };

        // Outcomes come back in chunk order, which is scan order
        let mut window_failed = false;
        for outcome in &outcomes {
            manifest.append(&ManifestRecord::from_outcome(outcome))?;
            match outcome.status() {
                Status::Success => successful += 1,
                Status::Planned => planned += 1,
                Status::Failed => {
                    failed += 1;
                    window_failed = true;
                }
            }
            if let Some(pb) = &progress_bar {
                pb.inc(1);
                pb.set_message(outcome.file.relpath.clone());
            }
        }

        if window_failed && !settings.continue_on_error {
            warn!("Stopping after first failure (--fail-fast)");
            break;
        }
    }

    if let Some(pb) = progress_bar {
        pb.finish_with_message("done");
    }

    let skipped = total_files - started;
    let exit_code = if failed > 0 { EXIT_FAILURE } else { EXIT_OK };

    info!(
        "Processed {}/{} files in {:.2}s: {} succeeded, {} failed, {} planned",
        started,
        total_files,
        pipeline_start.elapsed().as_secs_f64(),
        successful,
        failed,
        planned
    );
    info!(
        "Wrote {} manifest lines to {}",
        manifest.lines_written(),
        manifest.path().display()
    );

    Ok(PipelineResult {
        total_files,
        successful,
        failed,
        planned,
        skipped,
        exit_code,
        manifest_path: Some(manifest_path),
        deps,
    })
}

/// Run one input file into the workdir `settings.output`
pub fn run_single(settings: &Settings, toolchain: &Toolchain) -> Result<SingleResult> {
    let deps = toolchain.deps.check();
    if !deps.ok {
        log_deps_failure(&deps);
        return Ok(SingleResult {
            outcome: None,
            exit_code: EXIT_DEPS,
            deps,
        });
    }

    let job = FileJob::single(&settings.input, &settings.output);
    let ctx = IngestContext {
        settings,
        toolchain,
        deps: &deps,
    };
    let outcome = process(&ctx, &job);
    let exit_code = outcome.exit_code;

    Ok(SingleResult {
        outcome: Some(outcome),
        exit_code,
        deps,
    })
}

/// Ingest one file, converting a panic into an internal error outcome
fn process(ctx: &IngestContext<'_>, job: &FileJob) -> FileOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| ingest_one(ctx, job))) {
        Ok(outcome) => outcome,
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!("Processing {} panicked: {}", job.file.relpath, panic_msg);
            internal_failure(ctx, job, &format!("unexpected fault: {}", panic_msg))
        }
    }
}

/// Local pool for `jobs > 1`; sequential runs need none
fn build_pool(jobs: usize) -> Result<Option<rayon::ThreadPool>> {
    if jobs <= 1 {
        return Ok(None);
    }
    let threads = jobs.min(num_cpus::get().max(1) * 4);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map(|pool| {
            debug!("Configured thread pool with {} threads", threads);
            Some(pool)
        })
        .map_err(|e| WavprepError::Internal(format!("Failed to configure thread pool: {}", e)))
}

fn log_deps_failure(deps: &DepsReport) {
    for e in &deps.errors {
        error!("{}: {}", e.code, e.message);
        if let Some(hint) = &e.hint {
            error!("  Tip: {}", hint);
        }
    }
}

