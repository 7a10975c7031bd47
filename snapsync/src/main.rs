//! Snapsync - Main entry point
//!
//! Without a subcommand the process runs the snapshot scheduler.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use snapsync::config::{self, Config};
use snapsync::daemon::{self, shutdown::ShutdownCoordinator};
use snapsync::snapshot::listing::list_snapshots;
use snapsync::{utils, SnapshotInfo, Snapshotter};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Snapsync performs snapshots of directories using rsync and hard links to use less space.",
    long_about = None
)]
struct Args {
    /// Directory where config.toml is stored
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Expand environment variables in the config files
    #[arg(long, default_value_t = true, action = ArgAction::Set, global = true)]
    expand_vars: bool,

    /// Log level (trace, debug, info, warn, error), overrides config.toml
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Run these snapshots once and exit
    #[arg(long, value_name = "NAME")]
    run_once: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the snapshots of a definition
    List {
        /// Snapshot definition name
        name: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Restore a snapshot, given as <name>.<number>
    Restore {
        /// Snapshot directory name, e.g. home.2
        snapshot: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_dir = args.config_dir.clone().unwrap_or_else(config::default_config_dir);

    // Load configuration
    let config = config::load_config(&config_dir, args.expand_vars)
        .with_context(|| format!("can't load configuration from {}", config_dir.display()))?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    utils::logger::init(log_level)?;

    let snapshots_configs_dir = config.snapshots_configs_dir(&config_dir);
    match args.command {
        Some(Command::List { name, json }) => {
            list(&snapshots_configs_dir, args.expand_vars, &name, json)
        }
        Some(Command::Restore { snapshot }) => {
            restore(config, &snapshots_configs_dir, args.expand_vars, &snapshot)
        }
        None => run(config, &snapshots_configs_dir, args.expand_vars, &args.run_once).await,
    }
}

async fn run(
    config: Config,
    snapshots_configs_dir: &Path,
    expand_vars: bool,
    run_once: &[String],
) -> Result<()> {
    let snapshots = config::load_snapshot_configs(snapshots_configs_dir, expand_vars)
        .with_context(|| {
            format!(
                "can't get snapshots configs in {}",
                snapshots_configs_dir.display()
            )
        })?;

    tracing::info!(
        "Starting snapsync v{} ({} snapshot definitions)",
        env!("CARGO_PKG_VERSION"),
        snapshots.len()
    );

    let snapshotter = Snapshotter::system(config);
    if !run_once.is_empty() {
        daemon::run_once(&snapshotter, &snapshots, run_once).await?;
        return Ok(());
    }

    let shutdown = ShutdownCoordinator::new();
    daemon::run(&snapshotter, &snapshots, &shutdown).await?;
    Ok(())
}

fn list(snapshots_configs_dir: &Path, expand_vars: bool, name: &str, json: bool) -> Result<()> {
    let mut generations = list_snapshots(snapshots_configs_dir, expand_vars, name)
        .with_context(|| format!("can't get snapshots of snapshot {}", name))?;
    generations.sort_by_key(|info| info.number);

    let summaries: Vec<_> = generations.iter().map(SnapshotInfo::summary).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    for summary in summaries {
        println!("{}, size: {}", summary.name, summary.human_size);
    }
    Ok(())
}

fn restore(
    config: Config,
    snapshots_configs_dir: &Path,
    expand_vars: bool,
    snapshot: &str,
) -> Result<()> {
    let info = SnapshotInfo::parse(snapshot).context("can't get snapshot info")?;
    let snapshot_config =
        config::get_snapshot_config_by_name(snapshots_configs_dir, expand_vars, &info.snapshot_name)?
            .with_context(|| format!("there is no snapshot named {}", info.snapshot_name))?;

    let report = Snapshotter::system(config)
        .restore(info.number, &snapshot_config)
        .context("an error occurred while restoring the snapshot")?;

    tracing::info!(
        snapshot = %info,
        restored = report.restored.len(),
        skipped = report.skipped.len(),
        "Restore complete"
    );
    Ok(())
}
