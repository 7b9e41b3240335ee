//! Run artifacts: per-file meta.json and the batch manifest

pub mod manifest;
pub mod meta;

pub use manifest::{ManifestRecord, ManifestWriter};
pub use meta::{write_meta, MetaBuilder, MetaRecord};
