//! Utility modules for snapsync.

pub mod errors;
pub mod logger;
pub mod size;

pub use errors::{Result, SnapsyncError};
