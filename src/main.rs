//! wavprep CLI entry point

use clap::error::ErrorKind;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use wavprep::config::cli::{CheckDepsArgs, Command, IngestArgs};
use wavprep::config::{Cli, Settings};
use wavprep::media::{DependencyChecker, DepsReport, SystemDependencyChecker, Toolchain};
use wavprep::pipeline::{self, outcome};
use wavprep::WavprepError;

fn main() -> ExitCode {
    // Parse CLI arguments; usage errors count as invalid params
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(outcome::EXIT_INVALID_PARAMS),
            };
        }
    };

    let batch_log = match &cli.command {
        Command::Ingest(args) if args.is_batch() => Some(args.batch_log_file()),
        _ => None,
    };
    if let Err(e) = init_logging(&cli, batch_log.as_deref()) {
        eprintln!("Error: {}", e);
        return ExitCode::from(fatal_exit_code(&e));
    }

    let code = match &cli.command {
        Command::CheckDeps(args) => check_deps(args),
        Command::Ingest(args) => ingest(args, cli.quiet),
    };
    ExitCode::from(code)
}

fn init_logging(cli: &Cli, batch_log: Option<&Path>) -> Result<(), WavprepError> {
    let level = cli.log_level().to_string().to_lowercase();

    let file_layer = match batch_log {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WavprepError::output_error(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| WavprepError::output_error(path, e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

fn check_deps(args: &CheckDepsArgs) -> u8 {
    let report = SystemDependencyChecker::locate().check();

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return outcome::EXIT_INTERNAL;
            }
        }
    } else {
        print_deps_summary(&report);
    }

    report.exit_code()
}

fn print_deps_summary(report: &DepsReport) {
    for (name, info) in [("ffmpeg", &report.ffmpeg), ("ffprobe", &report.ffprobe)] {
        match info {
            Some(tool) => println!(
                "✓ {} {} ({})",
                name,
                tool.version.as_deref().unwrap_or("unknown version"),
                tool.path
            ),
            None => println!("✗ {} unavailable", name),
        }
    }
    if report.ffmpeg.is_some() {
        let mark = if report.capabilities.pcm_s16le_encoder { "✓" } else { "✗" };
        println!("{} pcm_s16le encoder", mark);
        for (decoder, present) in &report.capabilities.decoders {
            println!("{} {} decoder", if *present { "✓" } else { "-" }, decoder);
        }
    }
    for e in &report.errors {
        println!();
        println!("{}: {}", e.code, e.message);
        if let Some(hint) = &e.hint {
            println!("  Tip: {}", hint);
        }
    }
    println!();
    println!(
        "{} ({})",
        if report.ok { "All dependencies OK" } else { "Dependency check failed" },
        report.platform
    );
}

fn ingest(args: &IngestArgs, quiet: bool) -> u8 {
    let settings = match Settings::from_cli(args, quiet) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return fatal_exit_code(&e);
        }
    };
    let toolchain = Toolchain::system();

    if args.is_batch() {
        match pipeline::run(&settings, &toolchain) {
            Ok(result) => {
                if !quiet {
                    println!();
                    println!(
                        "Summary: {} succeeded, {} failed, {} planned, {} skipped (of {} total)",
                        result.successful,
                        result.failed,
                        result.planned,
                        result.skipped,
                        result.total_files
                    );
                    if let Some(path) = &result.manifest_path {
                        println!("Manifest: {}", path.display());
                    }
                }
                result.exit_code
            }
            Err(e) => {
                eprintln!("Fatal error: {}", e);
                fatal_exit_code(&e)
            }
        }
    } else {
        match pipeline::run_single(&settings, &toolchain) {
            Ok(result) => {
                if let Some(outcome) = &result.outcome {
                    if args.json {
                        match serde_json::to_string_pretty(&outcome.meta) {
                            Ok(text) => println!("{}", text),
                            Err(e) => eprintln!("Error: {}", e),
                        }
                    } else if !quiet {
                        println!(
                            "{}: {} ({})",
                            outcome.file.relpath,
                            outcome.status().as_str(),
                            outcome.message()
                        );
                        println!("Workdir: {}", outcome.outputs.workdir.display());
                    }
                }
                result.exit_code
            }
            Err(e) => {
                eprintln!("Fatal error: {}", e);
                fatal_exit_code(&e)
            }
        }
    }
}

/// Exit code for a run-level error
fn fatal_exit_code(err: &WavprepError) -> u8 {
    match err {
        WavprepError::ConfigError { .. } => outcome::EXIT_INVALID_PARAMS,
        WavprepError::OutputError { .. } => outcome::EXIT_OUTPUT_NOT_WRITABLE,
        WavprepError::InputNotFound(_) => outcome::EXIT_INPUT_NOT_FOUND,
        _ => outcome::EXIT_INTERNAL,
    }
}
