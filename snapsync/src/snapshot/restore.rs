//! Restore a generation back onto its source directories.

use super::info::generation_path;
use crate::config::{Config, SnapshotConfig};
use crate::process::{run_checked, sync_argv, CommandRunner};
use crate::utils::{Result, SnapsyncError};
use std::path::PathBuf;

/// What a restore did
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Source directories written back
    pub restored: Vec<PathBuf>,
    /// Source directories left alone because the generation lacks their subpath
    pub skipped: Vec<PathBuf>,
}

/// Mirror generation `number` of `snapshot` back onto every source directory.
///
/// Excludes are not applied. Mappings are independent: a failing one is
/// logged and the others are still restored, then the failures are returned
/// together as [`SnapsyncError::PartialRestore`].
pub fn restore(
    config: &Config,
    runner: &dyn CommandRunner,
    number: u32,
    snapshot: &SnapshotConfig,
) -> Result<RestoreReport> {
    let name = snapshot.name.as_str();
    let generation = generation_path(&snapshot.snapshots_dir, name, number);
    if !generation.is_dir() {
        return Err(SnapsyncError::fs(
            "find snapshot",
            &generation,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let mut report = RestoreReport::default();
    let mut failures = Vec::new();
    for dir in &snapshot.dirs {
        let captured = generation.join(&dir.dest);
        if !captured.is_dir() {
            tracing::warn!(
                snapshot = %name,
                path = %captured.display(),
                "Snapshot has no copy of {}, skipping",
                dir.src.display()
            );
            report.skipped.push(dir.src.clone());
            continue;
        }

        let restored = std::fs::create_dir_all(&dir.src)
            .map_err(|e| SnapsyncError::fs("create directory", &dir.src, e))
            .and_then(|()| run_checked(runner, &sync_argv(config, &captured, &dir.src, &[])));
        match restored {
            Ok(_) => {
                tracing::info!(
                    snapshot = %name,
                    from = %captured.display(),
                    to = %dir.src.display(),
                    "Restored directory"
                );
                report.restored.push(dir.src.clone());
            }
            Err(e) => {
                tracing::error!(
                    snapshot = %name,
                    from = %captured.display(),
                    to = %dir.src.display(),
                    error = %e,
                    "Can't restore directory"
                );
                failures.push(format!("{}: {}", dir.src.display(), e));
            }
        }
    }

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(SnapsyncError::PartialRestore {
            name: name.to_string(),
            failures,
        })
    }
}
