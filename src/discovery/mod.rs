//! Input discovery and workdir identity

pub mod scanner;
pub mod workdir;

pub use scanner::{posix_relpath, scan, DiscoveredFile};
pub use workdir::WorkdirIdentity;
