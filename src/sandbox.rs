//! C13 — Path Sandbox (spec §4.13).
//!
//! `resolve` canonicalizes a caller-supplied path and rejects anything that
//! doesn't land under the configured base directory — symlinks included,
//! since canonicalization follows them before the prefix check runs.

use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

pub struct PathSandbox {
    base_dir: PathBuf,
}

impl PathSandbox {
    /// `base_dir` is canonicalized eagerly so every `resolve` call compares
    /// against a stable, symlink-free prefix.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        let canonical = std::fs::canonicalize(&base_dir)
            .map_err(|e| CacheError::security(format!("base dir not resolvable: {e}"), base_dir.clone()))?;
        Ok(Self { base_dir: canonical })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `user_path` to its canonical absolute form, rejecting it as a
    /// `SecurityError` if that form does not live under `base_dir`, if the
    /// path does not exist, or if canonicalization otherwise fails.
    pub fn resolve(&self, user_path: impl AsRef<Path>) -> Result<PathBuf> {
        let user_path = user_path.as_ref();
        let canonical = std::fs::canonicalize(user_path)
            .map_err(|_| CacheError::security("path traversal: unresolvable path", user_path.to_path_buf()))?;
        if canonical.starts_with(&self.base_dir) {
            Ok(canonical)
        } else {
            Err(CacheError::security("path traversal: escapes sandbox base", canonical))
        }
    }
}
