//! Generation directory names.
//!
//! A generation lives in `<snapshots_dir>/<name>.<number>`, where `.0` is the
//! newest one and higher numbers are strictly older.

use crate::utils::{Result, SnapsyncError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A generation directory parsed back into its parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub snapshot_name: String,
    pub number: u32,
    pub path: PathBuf,
}

impl SnapshotInfo {
    /// Parse a bare directory name such as `home.3`.
    ///
    /// The returned `path` is the bare name; use [`SnapshotInfo::from_path`]
    /// to keep the full location.
    pub fn parse(dir_name: &str) -> Result<Self> {
        let mut parts = dir_name.split('.');
        let (Some(name), Some(number), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(SnapsyncError::Parse(dir_name.to_string()));
        };
        if name.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SnapsyncError::Parse(dir_name.to_string()));
        }
        let number = number
            .parse::<u32>()
            .map_err(|_| SnapsyncError::Parse(dir_name.to_string()))?;

        Ok(Self {
            snapshot_name: name.to_string(),
            number,
            path: PathBuf::from(dir_name),
        })
    }

    /// Parse the last component of a generation path
    pub fn from_path(path: &Path) -> Result<Self> {
        let dir_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SnapsyncError::Parse(path.display().to_string()))?;
        let mut info = Self::parse(dir_name)?;
        info.path = path.to_path_buf();
        Ok(info)
    }

    /// `<name>.<number>`
    pub fn compact_name(&self) -> String {
        generation_dir_name(&self.snapshot_name, self.number)
    }
}

impl fmt::Display for SnapshotInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.snapshot_name, self.number)
    }
}

/// Inverse of [`SnapshotInfo::parse`]
pub fn generation_dir_name(name: &str, number: u32) -> String {
    format!("{}.{}", name, number)
}

/// Full path of generation `number` of `name` under `root`
pub fn generation_path(root: &Path, name: &str, number: u32) -> PathBuf {
    root.join(generation_dir_name(name, number))
}

/// Generations of `name` found directly under `root`, in enumeration order.
///
/// Hidden entries (scratch directories, lock files), names that don't parse
/// and generations of other definitions are skipped. A missing root yields an
/// empty list.
pub fn find_generations(root: &Path, name: &str) -> Result<Vec<SnapshotInfo>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(SnapsyncError::fs("read directory", root, e)),
    };

    let mut generations = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SnapsyncError::fs("read directory", root, e))?;
        let file_name = entry.file_name();
        let Some(dir_name) = file_name.to_str() else {
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }
        if let Ok(info) = SnapshotInfo::from_path(&entry.path()) {
            if info.snapshot_name == name {
                generations.push(info);
            }
        }
    }

    Ok(generations)
}
