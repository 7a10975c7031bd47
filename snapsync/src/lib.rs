//! Snapsync library
//!
//! Periodic point-in-time snapshots of directory trees. Each run hard-link
//! clones the newest generation, mirror-syncs the sources into the clone with
//! rsync and commits it as `<name>.0`, shifting older generations up and
//! dropping the ones beyond the retention bound.

pub mod config;
pub mod daemon;
pub mod fs;
pub mod process;
pub mod scheduler;
pub mod snapshot;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Config, DirMapping, SnapshotConfig};
pub use snapshot::{SnapshotInfo, Snapshotter};
pub use utils::errors::SnapsyncError;
pub type Result<T> = std::result::Result<T, SnapsyncError>;
