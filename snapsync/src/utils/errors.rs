//! Custom error types for snapsync.

use crate::snapshot::rotation::RotationStage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapsyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid snapshot directory name '{0}': expected <name>.<number>")]
    Parse(String),

    #[error("Can't {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed: {detail}")]
    Subprocess { command: String, detail: String },

    #[error("Snapshot {0} is already running")]
    Locked(String),

    #[error("[{name}] snapshot failed during {stage}: {source}")]
    Rotation {
        name: String,
        stage: RotationStage,
        #[source]
        source: Box<SnapsyncError>,
    },

    #[error("[{name}] restore failed: {}", .failures.join("; "))]
    PartialRestore { name: String, failures: Vec<String> },

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapsyncError {
    /// Wrap an I/O failure with the action and path it happened on
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapsyncError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for SnapsyncError {
    fn from(e: tokio_cron_scheduler::JobSchedulerError) -> Self {
        SnapsyncError::Scheduler(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SnapsyncError>;
