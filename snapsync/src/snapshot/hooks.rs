//! Command hooks around one snapshot cycle.

use super::lock::DefinitionLock;
use super::rotation::ensure_root;
use super::{take_snapshot, SnapshotReport};
use crate::config::{Config, SnapshotConfig};
use crate::process::{run_checked, shell_argv, CommandRunner};
use crate::utils::Result;
use std::time::Instant;

/// Run one full cycle: pre commands, rotation and retention, post commands.
///
/// The definition's lock is held for the whole cycle. The first failing pre
/// command aborts before anything on disk changes. Post commands only run
/// after a successful snapshot, unless `always_run_post_commands` is set; a
/// snapshot failure is still returned in that case.
pub fn run_cycle(
    config: &Config,
    runner: &dyn CommandRunner,
    snapshot: &SnapshotConfig,
) -> Result<SnapshotReport> {
    let name = snapshot.name.as_str();
    let start = Instant::now();

    ensure_root(&snapshot.snapshots_dir)?;
    let _lock = DefinitionLock::try_acquire(&snapshot.snapshots_dir, name)?;

    run_commands(runner, name, "pre", &snapshot.pre_commands)?;

    let result = take_snapshot(config, runner, snapshot);
    match &result {
        Ok(report) => tracing::info!(
            snapshot = %name,
            removed = report.retention.removed.len(),
            "Snapshot done in {:.2} s",
            start.elapsed().as_secs_f64()
        ),
        Err(e) if snapshot.always_run_post_commands => {
            tracing::error!(snapshot = %name, error = %e, "Snapshot failed, running post commands anyway");
        }
        Err(_) => {}
    }
    if result.is_err() && !snapshot.always_run_post_commands {
        return result;
    }

    if let Err(e) = run_commands(runner, name, "post", &snapshot.post_commands) {
        if result.is_ok() {
            return Err(e);
        }
        tracing::error!(snapshot = %name, error = %e, "Post command failed after a failed snapshot");
    }

    result
}

/// Run `commands` in order through the shell, stopping at the first failure
fn run_commands(
    runner: &dyn CommandRunner,
    name: &str,
    phase: &str,
    commands: &[String],
) -> Result<()> {
    if commands.is_empty() {
        tracing::info!(snapshot = %name, "No {} snapshot commands to run", phase);
        return Ok(());
    }

    let start = Instant::now();
    tracing::info!(snapshot = %name, "Executing {} snapshot commands", phase);
    for command in commands {
        tracing::info!(snapshot = %name, command = %command, "Running {} command", phase);
        let output = run_checked(runner, &shell_argv(command))?;
        let stdout = output.stdout.trim();
        if !stdout.is_empty() {
            tracing::info!(snapshot = %name, command = %command, "{}", stdout);
        }
    }
    tracing::info!(
        snapshot = %name,
        "{} snapshot commands done in {:.2} s",
        phase,
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
