//! Per-definition advisory lock.
//!
//! Every cycle of a snapshot definition holds an exclusive `flock` on
//! `<snapshots_dir>/.<name>.lock`. A second cycle of the same definition,
//! scheduled or manual, fails fast with [`SnapsyncError::Locked`] instead of
//! racing the first one over the generation numbering.

use crate::utils::{Result, SnapsyncError};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held lock; released when dropped
#[derive(Debug)]
pub struct DefinitionLock {
    file: File,
    path: PathBuf,
}

impl DefinitionLock {
    /// Try to take the lock for `name` without blocking
    pub fn try_acquire(root: &Path, name: &str) -> Result<Self> {
        let path = lock_path(root, name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SnapsyncError::fs("open lock file", &path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!(snapshot = %name, path = %path.display(), "Lock acquired");
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(SnapsyncError::Locked(name.to_string()))
            }
            Err(e) => Err(SnapsyncError::fs("lock", &path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DefinitionLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

/// `<root>/.<name>.lock`
pub fn lock_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!(".{}.lock", name))
}
