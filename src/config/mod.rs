//! Configuration, parameter resolution and CLI handling

pub mod cli;
pub mod loader;
pub mod params;
pub mod settings;

pub use cli::Cli;
pub use params::{IngestParams, ParamError, ParamLayer, ParamProvenance, ParamSource, ResolvedParams};
pub use settings::{ParamLayers, Settings};
