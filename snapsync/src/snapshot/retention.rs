//! Retention: delete generations numbered at or beyond the retention bound.

use super::info::find_generations;
use crate::utils::Result;
use std::path::Path;

/// Outcome of one retention pass
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    /// Generation numbers deleted
    pub removed: Vec<u32>,
    /// Generations that could not be deleted, with the reason
    pub failed: Vec<(u32, String)>,
}

/// Delete every generation of `name` whose number is `>= retention`.
///
/// Deletions are independent: a failure is recorded and logged, and the
/// remaining generations are still removed. Only a failure to enumerate the
/// snapshots directory is returned as an error.
pub fn enforce_retention(root: &Path, name: &str, retention: u32) -> Result<RetentionReport> {
    let mut report = RetentionReport::default();

    for generation in find_generations(root, name)? {
        if generation.number < retention {
            continue;
        }
        match std::fs::remove_dir_all(&generation.path) {
            Ok(()) => {
                tracing::debug!(snapshot = %name, path = %generation.path.display(), "Removed snapshot");
                report.removed.push(generation.number);
            }
            Err(e) => {
                tracing::error!(
                    snapshot = %name,
                    path = %generation.path.display(),
                    error = %e,
                    "Can't remove snapshot"
                );
                report.failed.push((generation.number, e.to_string()));
            }
        }
    }

    report.removed.sort_unstable();
    Ok(report)
}
