//! Snapshot lifecycle: rotation, retention, hooks, listing and restore.
//!
//! All durable state lives on disk as `<name>.<number>` directories, so every
//! operation starts by inspecting the snapshots directory and nothing is kept
//! in memory between runs.

pub mod hooks;
pub mod info;
pub mod listing;
pub mod lock;
pub mod restore;
pub mod retention;
pub mod rotation;

use crate::config::{Config, SnapshotConfig};
use crate::process::{CommandRunner, SystemRunner};
use crate::utils::Result;
use retention::{enforce_retention, RetentionReport};
use rotation::{rotate, RotationReport};
use std::sync::Arc;

pub use info::SnapshotInfo;
pub use restore::RestoreReport;

/// Outcome of rotation followed by retention
#[derive(Debug, Clone)]
pub struct SnapshotReport {
    pub rotation: RotationReport,
    pub retention: RetentionReport,
}

/// Take a new generation and drop the ones beyond the retention bound
pub fn take_snapshot(
    config: &Config,
    runner: &dyn CommandRunner,
    snapshot: &SnapshotConfig,
) -> Result<SnapshotReport> {
    let rotation = rotate(config, runner, snapshot)?;
    let retention = enforce_retention(&snapshot.snapshots_dir, &snapshot.name, snapshot.retention)?;
    Ok(SnapshotReport {
        rotation,
        retention,
    })
}

/// Binds the global config to the runner used for external tools
#[derive(Clone)]
pub struct Snapshotter {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
}

impl Snapshotter {
    pub fn new(config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    /// Snapshotter running the real `rsync`/`cp`/`sh`
    pub fn system(config: Config) -> Self {
        Self::new(config, Arc::new(SystemRunner))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Full cycle with lock and hooks; what schedules and one-off runs call
    pub fn execute(&self, snapshot: &SnapshotConfig) -> Result<SnapshotReport> {
        hooks::run_cycle(&self.config, self.runner.as_ref(), snapshot)
    }

    /// Rotation and retention only, without lock or hooks
    pub fn take_snapshot(&self, snapshot: &SnapshotConfig) -> Result<SnapshotReport> {
        take_snapshot(&self.config, self.runner.as_ref(), snapshot)
    }

    pub fn restore(&self, number: u32, snapshot: &SnapshotConfig) -> Result<RestoreReport> {
        let _lock = lock::DefinitionLock::try_acquire(&snapshot.snapshots_dir, &snapshot.name)?;
        restore::restore(&self.config, self.runner.as_ref(), number, snapshot)
    }
}
