//! Process-level run plan.
//!
//! Named one-off runs execute and return. Otherwise definitions without a
//! cron expression run once at startup, the others are handed to the
//! scheduler, and the process waits for a shutdown signal.

pub mod shutdown;

use crate::config::SnapshotConfig;
use crate::scheduler::{SnapshotScheduler, Task};
use crate::snapshot::Snapshotter;
use crate::utils::{Result, SnapsyncError};
use shutdown::ShutdownCoordinator;
use std::sync::Arc;

/// Run the definitions named in `run_once`, in order, then return.
///
/// Every known name is run even when an earlier one failed or was unknown;
/// the first problem is returned afterwards.
pub async fn run_once(
    snapshotter: &Snapshotter,
    snapshots: &[SnapshotConfig],
    names: &[String],
) -> Result<()> {
    let mut first_error = None;

    for name in names {
        let Some(snapshot) = snapshots.iter().find(|s| &s.name == name) else {
            tracing::error!(snapshot = %name, "There is no snapshot with this name");
            first_error.get_or_insert(SnapsyncError::Config(format!(
                "there is no snapshot named {}",
                name
            )));
            continue;
        };

        if let Err(e) = execute_blocking(snapshotter, snapshot).await {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Register every schedule, run unscheduled definitions once, then start the
/// scheduler and wait for shutdown.
///
/// A definition whose schedule can't be registered aborts startup before any
/// snapshot is taken. With nothing to schedule this returns right after the
/// one-off runs.
pub async fn run(
    snapshotter: &Snapshotter,
    snapshots: &[SnapshotConfig],
    shutdown: &ShutdownCoordinator,
) -> Result<()> {
    let (scheduled, unscheduled): (Vec<_>, Vec<_>) = snapshots
        .iter()
        .partition(|snapshot| cron_of(snapshot).is_some());

    let scheduler = if scheduled.is_empty() {
        None
    } else {
        let scheduler = SnapshotScheduler::new().await?;
        for snapshot in scheduled {
            let cron = cron_of(snapshot).unwrap_or_default();
            scheduler
                .schedule(&snapshot.name, cron, snapshot_task(snapshotter, snapshot))
                .await?;
        }
        Some(scheduler)
    };

    for snapshot in unscheduled {
        tracing::info!(snapshot = %snapshot.name, "No cron expression, running once");
        // failures are logged; the other definitions still get their turn
        let _ = execute_blocking(snapshotter, snapshot).await;
    }

    let Some(scheduler) = scheduler else {
        tracing::info!("No scheduled snapshots, exiting");
        return Ok(());
    };

    scheduler.start().await?;
    let count = scheduler.scheduled().await.len();
    tracing::info!(count, "Scheduler started");

    shutdown.wait_for_signal().await;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Scheduler shutdown error");
    }
    tracing::info!("Scheduler stopped");
    Ok(())
}

fn cron_of(snapshot: &SnapshotConfig) -> Option<&str> {
    snapshot
        .cron
        .as_deref()
        .map(str::trim)
        .filter(|cron| !cron.is_empty())
}

fn snapshot_task(snapshotter: &Snapshotter, snapshot: &SnapshotConfig) -> Task {
    let snapshotter = snapshotter.clone();
    let snapshot = snapshot.clone();
    Arc::new(move || {
        let _ = execute_logged(&snapshotter, &snapshot);
    })
}

async fn execute_blocking(snapshotter: &Snapshotter, snapshot: &SnapshotConfig) -> Result<()> {
    let snapshotter = snapshotter.clone();
    let snapshot = snapshot.clone();
    let name = snapshot.name.clone();
    tokio::task::spawn_blocking(move || execute_logged(&snapshotter, &snapshot))
        .await
        .map_err(|e| {
            tracing::error!(snapshot = %name, error = %e, "Snapshot task panicked");
            SnapsyncError::Scheduler(format!("snapshot task failed: {}", e))
        })?
}

fn execute_logged(snapshotter: &Snapshotter, snapshot: &SnapshotConfig) -> Result<()> {
    match snapshotter.execute(snapshot) {
        Ok(_) => Ok(()),
        Err(SnapsyncError::Locked(name)) => {
            tracing::warn!(snapshot = %name, "Skipping run: snapshot already running");
            Err(SnapsyncError::Locked(name))
        }
        Err(e) => {
            tracing::error!(snapshot = %snapshot.name, error = %e, "Can't execute snapshot");
            Err(e)
        }
    }
}
