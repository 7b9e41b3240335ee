//! Ingest pipeline: planning, per-file state machine, outcome classification
//! and batch orchestration

pub mod ingest;
pub mod orchestrator;
pub mod outcome;
pub mod plan;

pub use ingest::{ingest_one, FileJob, FileOutcome, FileState, IngestContext};
pub use orchestrator::{run, run_single, PipelineResult, SingleResult};
pub use outcome::{ErrorCode, ErrorEntry, IssueEntry, WarningCode, WarningEntry};
pub use plan::{ExecutionPlan, OutputPaths};
