//! Listing existing generations and their disk usage.

use super::info::SnapshotInfo;
use crate::config::{get_snapshot_config_by_name, SnapshotConfig};
use crate::fs::walker::disk_usage;
use crate::utils::size::human_readable_size;
use crate::utils::{Result, SnapsyncError};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;

/// Generations of the definition called `name`, in directory order.
///
/// An unknown definition or a missing snapshots directory yields an empty
/// list. Callers that need the generations by age must sort them.
pub fn list_snapshots(
    snapshots_configs_dir: &Path,
    expand_vars: bool,
    name: &str,
) -> Result<Vec<SnapshotInfo>> {
    let Some(snapshot) = get_snapshot_config_by_name(snapshots_configs_dir, expand_vars, name)?
    else {
        tracing::warn!(snapshot = %name, "Snapshot definition does not exist");
        return Ok(Vec::new());
    };

    list_generations(&snapshot)
}

/// Generations found in the snapshots directory of `snapshot`.
///
/// Hidden entries are ignored; any other entry that isn't a well-formed
/// `<name>.<number>` aborts with [`SnapsyncError::Parse`]. Well-formed
/// generations of other definitions sharing the directory are left out.
pub fn list_generations(snapshot: &SnapshotConfig) -> Result<Vec<SnapshotInfo>> {
    let root = &snapshot.snapshots_dir;
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(snapshot = %snapshot.name, "No snapshots found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(SnapsyncError::fs("list snapshots in", root, e)),
    };

    let mut generations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SnapsyncError::fs("list snapshots in", root, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let info = SnapshotInfo::from_path(&entry.path())?;
        if info.snapshot_name == snapshot.name {
            generations.push(info);
        }
    }

    Ok(generations)
}

/// One line of `snapsync list` output
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub name: String,
    pub number: u32,
    pub path: String,
    /// Bytes, `None` when the size could not be computed
    pub size: Option<u64>,
    pub human_size: String,
    pub modified: Option<DateTime<Local>>,
}

impl SnapshotInfo {
    /// Disk usage of this generation in bytes
    pub fn size(&self) -> std::io::Result<u64> {
        disk_usage(&self.path)
    }

    /// Size and timestamp for display; a size error is reported inline
    pub fn summary(&self) -> GenerationSummary {
        let (size, human_size) = match self.size() {
            Ok(bytes) => (Some(bytes), human_readable_size(bytes)),
            Err(e) => (None, format!("can't evaluate snapshot size: {}", e)),
        };
        let modified = std::fs::metadata(&self.path)
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(DateTime::<Local>::from);

        GenerationSummary {
            name: self.compact_name(),
            number: self.number,
            path: self.path.display().to_string(),
            size,
            human_size,
            modified,
        }
    }
}
