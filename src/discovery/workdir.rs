//! Deterministic workdir identity for batch inputs
//!
//! `id` is the first 12 hex chars of `sha256(relpath + "\n" + size_bytes)`.
//! Only the POSIX relpath and the size enter the hash, so the identity is
//! stable across runs, machines and output roots, and changes when a file is
//! moved or resized. Two distinct inputs sharing an id is an accepted risk;
//! no collision detection is performed.

use crate::digest::sha256_hex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum length of the sanitized stem
pub const MAX_STEM_LEN: usize = 60;

/// Length of the hex id
pub const ID_LEN: usize = 12;

/// Stable directory identity of one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdirIdentity {
    pub safe_stem: String,
    pub id: String,
    /// The hashed key, `relpath + "\n" + size_bytes`
    pub work_key: String,
}

impl WorkdirIdentity {
    /// Derive the identity from the input's relpath and size
    pub fn derive(relpath: &str, size_bytes: u64) -> Self {
        let relpath = relpath.replace('\\', "/");
        let work_key = format!("{}\n{}", relpath, size_bytes);
        let id = sha256_hex(work_key.as_bytes())[..ID_LEN].to_string();

        let file_name = relpath.rsplit('/').next().unwrap_or(&relpath);
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            safe_stem: safe_stem(&stem),
            id,
            work_key,
        }
    }

    /// `<safe_stem>__<id>`
    pub fn dir_name(&self) -> String {
        format!("{}__{}", self.safe_stem, self.id)
    }
}

/// Keep only `[A-Za-z0-9._-]`, then cut to `MAX_STEM_LEN`
pub fn safe_stem(stem: &str) -> String {
    stem.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_STEM_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_deterministic() {
        let a = WorkdirIdentity::derive("music/track.mp3", 1234);
        let b = WorkdirIdentity::derive("music/track.mp3", 1234);
        assert_eq!(a, b);
        assert_eq!(a.dir_name(), b.dir_name());
    }

    #[test]
    fn test_identity_changes_with_size_or_path() {
        let base = WorkdirIdentity::derive("a.mp3", 10);
        assert_ne!(base.id, WorkdirIdentity::derive("a.mp3", 11).id);
        assert_ne!(base.id, WorkdirIdentity::derive("sub/a.mp3", 10).id);
    }

    #[test]
    fn test_id_is_prefix_of_key_hash() {
        let ident = WorkdirIdentity::derive("a.mp3", 42);
        assert_eq!(ident.work_key, "a.mp3\n42");
        assert_eq!(ident.id, &sha256_hex(b"a.mp3\n42")[..12]);
        assert_eq!(ident.id.len(), ID_LEN);
        assert!(ident.id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_backslashes_normalized() {
        assert_eq!(
            WorkdirIdentity::derive("dir\\a.mp3", 1),
            WorkdirIdentity::derive("dir/a.mp3", 1)
        );
    }

    #[test]
    fn test_safe_stem_strips_and_truncates() {
        assert_eq!(safe_stem("my song (live)!"), "mysonglive");
        assert_eq!(safe_stem("v1.2_final-mix"), "v1.2_final-mix");
        assert_eq!(safe_stem("日本語track"), "track");
        let long = "x".repeat(100);
        assert_eq!(safe_stem(&long).len(), MAX_STEM_LEN);
    }

    #[test]
    fn test_dir_name_uses_file_stem() {
        let ident = WorkdirIdentity::derive("talks/Keynote 2024.final.mkv", 99);
        assert_eq!(ident.safe_stem, "Keynote2024.final");
        assert!(ident.dir_name().starts_with("Keynote2024.final__"));
    }
}
