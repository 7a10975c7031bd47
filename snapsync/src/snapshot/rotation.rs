//! Rotation engine: produce a new generation `.0` and shift the others up.
//!
//! One rotation walks through these stages:
//!
//! | Stage              | Effect                                                         |
//! |--------------------|----------------------------------------------------------------|
//! | `Start`            | make sure the snapshots directory exists                       |
//! | `CloneOrInit`      | hard-link clone `.0` into a hidden scratch directory           |
//! | `Sync`             | mirror every source directory into the scratch directory       |
//! | `RenumberExisting` | rename `.N` to `.N+1`, highest number first                    |
//! | `Commit`           | rename the scratch directory to `.0` (the only atomic step)    |
//! | `Done`             | touch `.0` so its mtime records when the snapshot completed    |
//!
//! Until `RenumberExisting` nothing outside the scratch directory is touched,
//! so a failure leaves the history as it was. Renames done during
//! `RenumberExisting` are undone, in reverse order, if renumbering or the
//! commit fails. That rollback is best effort: a crash or a failing rename in
//! between can still leave generations shifted by one with no `.0`.
//!
//! The scratch directory is removed on every exit path.

use super::info::{find_generations, generation_path};
use crate::config::{Config, SnapshotConfig};
use crate::process::{clone_argv, run_checked, sync_argv, CommandRunner};
use crate::utils::{Result, SnapsyncError};
use filetime::FileTime;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    Start,
    CloneOrInit,
    Sync,
    RenumberExisting,
    Commit,
    Done,
}

impl fmt::Display for RotationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            RotationStage::Start => "start",
            RotationStage::CloneOrInit => "clone",
            RotationStage::Sync => "sync",
            RotationStage::RenumberExisting => "renumber",
            RotationStage::Commit => "commit",
            RotationStage::Done => "done",
        };
        f.write_str(stage)
    }
}

/// What a successful rotation did
#[derive(Debug, Clone)]
pub struct RotationReport {
    /// Path of the new generation `.0`
    pub newest: PathBuf,
    /// Whether `.0` existed and was cloned
    pub cloned: bool,
    /// Source directories synced into the new generation
    pub synced: Vec<PathBuf>,
    /// Source directories skipped because they don't exist
    pub skipped: Vec<PathBuf>,
    /// Generation numbers that were shifted, before the shift
    pub renumbered: Vec<u32>,
}

/// Run one rotation for `snapshot`
pub fn rotate(
    config: &Config,
    runner: &dyn CommandRunner,
    snapshot: &SnapshotConfig,
) -> Result<RotationReport> {
    let mut rotation = Rotation {
        config,
        runner,
        snapshot,
        stage: RotationStage::Start,
    };

    match rotation.run() {
        Ok(report) => Ok(report),
        Err(source) => Err(SnapsyncError::Rotation {
            name: snapshot.name.clone(),
            stage: rotation.stage,
            source: Box::new(source),
        }),
    }
}

/// Create the snapshots directory (mode 0700) if it doesn't exist
pub fn ensure_root(root: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder
        .create(root)
        .map_err(|e| SnapsyncError::fs("create snapshots directory", root, e))
}

struct Rotation<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    snapshot: &'a SnapshotConfig,
    stage: RotationStage,
}

impl Rotation<'_> {
    fn run(&mut self) -> Result<RotationReport> {
        let name = self.snapshot.name.as_str();
        let root = self.snapshot.snapshots_dir.as_path();
        let newest = generation_path(root, name, 0);

        ensure_root(root)?;

        self.stage = RotationStage::CloneOrInit;
        let scratch = tempfile::Builder::new()
            .prefix(&format!(".tmp-{}-", name))
            .tempdir_in(root)
            .map_err(|e| SnapsyncError::fs("create scratch directory in", root, e))?;

        let cloned = match fs::symlink_metadata(&newest) {
            Ok(_) => {
                tracing::debug!(snapshot = %name, "Copying latest snapshot...");
                run_checked(self.runner, &clone_argv(self.config, &newest, scratch.path()))?;
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(snapshot = %name, path = %newest.display(), "Creating first snapshot");
                false
            }
            Err(e) => return Err(SnapsyncError::fs("stat", &newest, e)),
        };

        self.stage = RotationStage::Sync;
        let mut synced = Vec::new();
        let mut skipped = Vec::new();
        for dir in &self.snapshot.dirs {
            if !dir.src.exists() {
                tracing::warn!(
                    snapshot = %name,
                    src = %dir.src.display(),
                    "Source directory does not exist, skipping"
                );
                skipped.push(dir.src.clone());
                continue;
            }

            let dst = scratch.path().join(&dir.dest);
            fs::create_dir_all(&dst)
                .map_err(|e| SnapsyncError::fs("create destination directory", &dst, e))?;
            run_checked(
                self.runner,
                &sync_argv(self.config, &dir.src, &dst, &dir.excludes),
            )?;
            synced.push(dir.src.clone());
        }

        self.stage = RotationStage::RenumberExisting;
        let renames = renumber(root, name)?;

        self.stage = RotationStage::Commit;
        tracing::debug!(
            snapshot = %name,
            from = %scratch.path().display(),
            to = %newest.display(),
            "Committing scratch directory"
        );
        if let Err(e) = fs::rename(scratch.path(), &newest) {
            rollback(&renames);
            return Err(SnapsyncError::fs("commit scratch directory to", &newest, e));
        }
        // the scratch path no longer exists, dropping the guard is a no-op
        drop(scratch);

        self.stage = RotationStage::Done;
        if let Err(e) = filetime::set_file_mtime(&newest, FileTime::now()) {
            tracing::warn!(snapshot = %name, error = %e, "Failed to update snapshot timestamp");
        }

        Ok(RotationReport {
            newest,
            cloned,
            synced,
            skipped,
            renumbered: renames.iter().map(|rename| rename.number).collect(),
        })
    }
}

/// A rename done by [`renumber`], kept so it can be undone
#[derive(Debug)]
struct Rename {
    number: u32,
    from: PathBuf,
    to: PathBuf,
}

/// Shift every generation of `name` up by one, highest number first.
///
/// On failure the renames done so far are rolled back before returning.
fn renumber(root: &Path, name: &str) -> Result<Vec<Rename>> {
    let mut generations = find_generations(root, name)?;
    generations.sort_unstable_by(|a, b| b.number.cmp(&a.number));

    let mut renames = Vec::with_capacity(generations.len());
    for generation in generations {
        let Some(next) = generation.number.checked_add(1) else {
            rollback(&renames);
            return Err(SnapsyncError::fs(
                "renumber snapshot",
                &generation.path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "generation number out of range",
                ),
            ));
        };
        let rename = Rename {
            number: generation.number,
            to: generation_path(root, name, next),
            from: generation.path,
        };
        tracing::debug!(
            snapshot = %name,
            from = %rename.from.display(),
            to = %rename.to.display(),
            "Renaming snapshot"
        );
        if let Err(e) = fs::rename(&rename.from, &rename.to) {
            rollback(&renames);
            return Err(SnapsyncError::fs("rename snapshot", &rename.from, e));
        }
        renames.push(rename);
    }

    Ok(renames)
}

/// Undo `renames`, most recent first
fn rollback(renames: &[Rename]) {
    for rename in renames.iter().rev() {
        match fs::rename(&rename.to, &rename.from) {
            Ok(()) => tracing::debug!(
                from = %rename.to.display(),
                to = %rename.from.display(),
                "Rolled back rename"
            ),
            Err(e) => tracing::error!(
                from = %rename.to.display(),
                to = %rename.from.display(),
                error = %e,
                "Failed to roll back rename"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{generation_numbers, snapshot_config, test_config, FakeRunner};
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    #[test]
    fn test_first_rotation_creates_generation_zero() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        fs::write(src.join("a.txt"), b"first")?;
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 3, &[(&src, "data")]);

        let report = rotate(&test_config(), &FakeRunner::new(), &snapshot)?;

        assert!(!report.cloned);
        assert_eq!(report.newest, root.join("home.0"));
        assert_eq!(fs::read(root.join("home.0/data/a.txt"))?, b"first");
        assert_eq!(generation_numbers(&root, "home"), vec![0]);
        Ok(())
    }

    #[test]
    fn test_rotation_shifts_generations() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 10, &[(&src, "data")]);
        let runner = FakeRunner::new();

        for run in 0..3 {
            fs::write(src.join("run.txt"), format!("run {run}"))?;
            rotate(&test_config(), &runner, &snapshot)?;
        }

        assert_eq!(generation_numbers(&root, "home"), vec![0, 1, 2]);
        assert_eq!(fs::read_to_string(root.join("home.0/data/run.txt"))?, "run 2");
        assert_eq!(fs::read_to_string(root.join("home.2/data/run.txt"))?, "run 0");
        Ok(())
    }

    #[test]
    fn test_unchanged_files_are_hard_linked() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        fs::write(src.join("big.bin"), vec![7u8; 4096])?;
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 5, &[(&src, "data")]);
        let runner = FakeRunner::new();

        rotate(&test_config(), &runner, &snapshot)?;
        let report = rotate(&test_config(), &runner, &snapshot)?;
        assert!(report.cloned);

        let newest = fs::metadata(root.join("home.0/data/big.bin"))?;
        let previous = fs::metadata(root.join("home.1/data/big.bin"))?;
        assert_eq!(newest.ino(), previous.ino());
        assert_eq!(newest.nlink(), 2);
        assert_eq!(
            fs::read(root.join("home.0/data/big.bin"))?,
            fs::read(root.join("home.1/data/big.bin"))?
        );
        Ok(())
    }

    #[test]
    fn test_changed_file_breaks_link_only_for_new_generation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        fs::write(src.join("notes.txt"), b"old")?;
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 5, &[(&src, "data")]);
        let runner = FakeRunner::new();

        rotate(&test_config(), &runner, &snapshot)?;
        fs::write(src.join("notes.txt"), b"new")?;
        rotate(&test_config(), &runner, &snapshot)?;

        assert_eq!(fs::read(root.join("home.0/data/notes.txt"))?, b"new");
        assert_eq!(fs::read(root.join("home.1/data/notes.txt"))?, b"old");
        Ok(())
    }

    #[test]
    fn test_missing_source_is_skipped() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let present = temp_dir.path().join("present");
        fs::create_dir(&present)?;
        fs::write(present.join("kept.txt"), b"here")?;
        let missing = temp_dir.path().join("missing");
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 3, &[(&present, "present"), (&missing, "missing")]);

        let report = rotate(&test_config(), &FakeRunner::new(), &snapshot)?;

        assert_eq!(report.synced, vec![present]);
        assert_eq!(report.skipped, vec![missing]);
        assert!(root.join("home.0/present/kept.txt").exists());
        assert!(!root.join("home.0/missing").exists());
        Ok(())
    }

    #[test]
    fn test_sync_failure_leaves_history_untouched() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first");
        let second = temp_dir.path().join("second");
        fs::create_dir(&first)?;
        fs::create_dir(&second)?;
        let root = temp_dir.path().join("snapshots");
        let snapshot = snapshot_config(&root, 3, &[(&first, "first"), (&second, "second")]);
        let runner = FakeRunner::new();

        rotate(&test_config(), &runner, &snapshot)?;
        runner.fail_sync_from(&second);
        let err = rotate(&test_config(), &runner, &snapshot).unwrap_err();

        assert!(matches!(
            err,
            SnapsyncError::Rotation { stage: RotationStage::Sync, .. }
        ));
        assert_eq!(generation_numbers(&root, "home"), vec![0]);
        assert_eq!(scratch_leftovers(&root)?, 0);
        Ok(())
    }

    #[test]
    fn test_renumber_tolerates_gaps() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("home.0"))?;
        fs::create_dir(root.join("home.2"))?;
        fs::create_dir(root.join("photos.0"))?;

        let renames = renumber(root, "home")?;

        let numbers: Vec<_> = renames.iter().map(|rename| rename.number).collect();
        assert_eq!(numbers, vec![2, 0]);
        assert_eq!(generation_numbers(root, "home"), vec![1, 3]);
        assert!(root.join("photos.0").exists());
        Ok(())
    }

    #[test]
    fn test_rollback_restores_numbering() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        for number in 0..3 {
            fs::create_dir(root.join(format!("home.{number}")))?;
            fs::write(root.join(format!("home.{number}/id")), number.to_string())?;
        }

        let renames = renumber(root, "home")?;
        assert_eq!(generation_numbers(root, "home"), vec![1, 2, 3]);

        rollback(&renames);
        assert_eq!(generation_numbers(root, "home"), vec![0, 1, 2]);
        assert_eq!(fs::read_to_string(root.join("home.1/id"))?, "1");
        Ok(())
    }

    fn scratch_leftovers(root: &Path) -> std::io::Result<usize> {
        Ok(fs::read_dir(root)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".tmp-"))
            .count())
    }

    #[test]
    fn test_highest_generation_number_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        let root = temp_dir.path().join("snapshots");
        fs::create_dir_all(root.join("home.0"))?;
        fs::create_dir_all(root.join(format!("home.{}", u32::MAX)))?;
        let snapshot = snapshot_config(&root, 3, &[(&src, "data")]);

        let err = rotate(&test_config(), &FakeRunner::new(), &snapshot).unwrap_err();

        assert!(matches!(
            err,
            SnapsyncError::Rotation { stage: RotationStage::RenumberExisting, .. }
        ));
        assert_eq!(generation_numbers(&root, "home"), vec![0, u32::MAX]);
        assert_eq!(scratch_leftovers(&root)?, 0);
        Ok(())
    }

    #[test]
    fn test_failed_rename_rolls_back_rotation() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let src = temp_dir.path().join("src");
        fs::create_dir(&src)?;
        let root = temp_dir.path().join("snapshots");
        // `home.01` also parses as generation 1, so both renames target `home.2`
        for dir_name in ["home.0", "home.1", "home.01"] {
            fs::create_dir_all(root.join(dir_name))?;
            fs::write(root.join(dir_name).join("id"), dir_name)?;
        }
        let snapshot = snapshot_config(&root, 10, &[(&src, "data")]);

        let err = rotate(&test_config(), &FakeRunner::new(), &snapshot).unwrap_err();

        assert!(matches!(
            err,
            SnapsyncError::Rotation { stage: RotationStage::RenumberExisting, .. }
        ));
        for dir_name in ["home.0", "home.1", "home.01"] {
            assert_eq!(fs::read_to_string(root.join(dir_name).join("id"))?, dir_name);
        }
        assert!(!root.join("home.2").exists());
        assert_eq!(scratch_leftovers(&root)?, 0);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_root_created_with_restrictive_mode() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("nested/snapshots");
        ensure_root(&root)?;
        assert_eq!(fs::metadata(&root)?.permissions().mode() & 0o777, 0o700);
        Ok(())
    }
}
