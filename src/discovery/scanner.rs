//! Batch input scanning
//!
//! Scan order is the ordering key for manifests: files are sorted by their
//! POSIX relative path so two scans of the same tree agree.

use crate::error::{Result, WavprepError};
use crate::types::{dotted_extension, extension_of};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Names skipped regardless of extension
const IGNORED_NAMES: &[&str] = &["__MACOSX", ".DS_Store"];

/// Discovered input with the attributes that feed its workdir identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// POSIX-style path relative to the scan root
    pub relpath: String,
    /// Dotted lower-case extension (".mp3")
    pub ext: String,
    pub size_bytes: u64,
}

impl DiscoveredFile {
    /// Describe a single file outside any batch root
    pub fn single(path: &Path) -> std::io::Result<Self> {
        let size_bytes = std::fs::metadata(path)?.len();
        Ok(Self::describe(path, size_bytes))
    }

    /// A single input that could not be stat'ed; its run records
    /// `input_not_found`
    pub fn unreadable(path: &Path) -> Self {
        Self::describe(path, 0)
    }

    fn describe(path: &Path, size_bytes: u64) -> Self {
        let relpath = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            relpath,
            ext: dotted_extension(path),
            size_bytes,
        }
    }
}

/// Scan a directory for inputs with one of `extensions` (lower-case, no dot)
pub fn scan(root: &Path, recursive: bool, extensions: &[String]) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(WavprepError::InputNotFound(root.to_path_buf()));
    }

    let walker = if recursive {
        WalkDir::new(root)
    } else {
        WalkDir::new(root).max_depth(1)
    };

    let mut files = Vec::new();

    for entry in walker
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = extension_of(path) else {
            continue;
        };
        if !extensions.iter().any(|e| *e == ext) {
            continue;
        }

        let size_bytes = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                warn!("Could not stat {}: {}", path.display(), e);
                0
            }
        };

        let relpath = posix_relpath(root, path);
        debug!("Discovered: {}", relpath);
        files.push(DiscoveredFile {
            path: path.to_path_buf(),
            relpath,
            ext: format!(".{}", ext),
            size_bytes,
        });
    }

    files.sort_by(|a, b| a.relpath.cmp(&b.relpath));

    info!("Discovered {} input files", files.len());

    if files.is_empty() {
        warn!("No supported input files found in {}", root.display());
    }

    Ok(files)
}

/// Hidden entries and OS clutter are skipped, including their subtrees
fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_NAMES.contains(&name.as_ref())
}

/// Relative path joined with forward slashes on every platform
pub fn posix_relpath(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
