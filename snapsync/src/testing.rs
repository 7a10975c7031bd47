//! Test doubles shared by the unit tests.

use crate::config::{Config, DirMapping, SnapshotConfig};
use crate::process::{CommandOutput, CommandRunner};
use crate::utils::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use walkdir::WalkDir;

/// Performs clone and mirror-sync natively and scripts hook commands.
///
/// `cp -lra src/. dst` becomes a hard-link clone, `rsync ... src/ dst` a
/// mirror copy that leaves unchanged files (and so their links) alone, and
/// `sh -c cmd` is recorded and exits 0 unless `cmd` was marked failing.
#[derive(Default)]
pub struct FakeRunner {
    commands: Mutex<Vec<String>>,
    failing_commands: Mutex<HashSet<String>>,
    failing_sync_sources: Mutex<HashSet<PathBuf>>,
    stdout: Mutex<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook commands run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn fail_command(&self, command: &str) {
        self.failing_commands.lock().unwrap().insert(command.to_string());
    }

    pub fn fail_sync_from(&self, src: &Path) {
        self.failing_sync_sources.lock().unwrap().insert(src.to_path_buf());
    }

    pub fn set_stdout(&self, stdout: &str) {
        *self.stdout.lock().unwrap() = stdout.to_string();
    }

    fn exit(code: i32) -> CommandOutput {
        CommandOutput {
            exit_code: Some(code),
            ..CommandOutput::default()
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        match argv {
            [sh, flag, command] if sh == "sh" && flag == "-c" => {
                self.commands.lock().unwrap().push(command.clone());
                if self.failing_commands.lock().unwrap().contains(command) {
                    return Ok(CommandOutput {
                        exit_code: Some(1),
                        stdout: String::new(),
                        stderr: format!("{command}: failed"),
                    });
                }
                Ok(CommandOutput {
                    exit_code: Some(0),
                    stdout: self.stdout.lock().unwrap().clone(),
                    stderr: String::new(),
                })
            }
            [cp, flag, src, dst] if cp.ends_with("cp") && flag == "-lra" => {
                let src = src.strip_suffix("/.").unwrap_or(src);
                hard_link_clone(Path::new(src), Path::new(dst))?;
                Ok(Self::exit(0))
            }
            [rsync, rest @ ..] if rsync.ends_with("rsync") && rest.len() >= 2 => {
                let src = rest[rest.len() - 2].trim_end_matches('/');
                let dst = &rest[rest.len() - 1];
                if self.failing_sync_sources.lock().unwrap().contains(Path::new(src)) {
                    return Ok(Self::exit(23));
                }
                let excludes: Vec<&str> = rest
                    .iter()
                    .filter_map(|arg| arg.strip_prefix("--exclude="))
                    .collect();
                mirror(Path::new(src), Path::new(dst), &excludes)?;
                Ok(Self::exit(0))
            }
            _ => Ok(Self::exit(127)),
        }
    }
}

fn hard_link_clone(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let target = dst.join(entry.path().strip_prefix(src).unwrap());
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            fs::hard_link(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn is_excluded(relative: &Path, excludes: &[&str]) -> bool {
    relative.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        excludes.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => name.ends_with(suffix),
            None => name == *pattern,
        })
    })
}

fn mirror(src: &Path, dst: &Path, excludes: &[&str]) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;

    // drop destination-only entries, deepest first
    for entry in WalkDir::new(dst).min_depth(1).contents_first(true) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dst).unwrap();
        if is_excluded(relative, excludes) || src.join(relative).symlink_metadata().is_ok() {
            continue;
        }
        if entry.file_type().is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap();
        if is_excluded(relative, excludes) {
            continue;
        }
        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if file_type.is_symlink() {
            if target.symlink_metadata().is_ok() {
                fs::remove_file(&target)?;
            }
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
            continue;
        }
        if target.is_file() && fs::read(&target)? == fs::read(entry.path())? {
            continue;
        }
        if target.symlink_metadata().is_ok() {
            fs::remove_file(&target)?;
        }
        fs::copy(entry.path(), &target)?;
    }
    Ok(())
}

/// Global config pointing at the default tool names
pub fn test_config() -> Config {
    Config::default()
}

/// A definition with one mapping per `(src, dest)` pair
pub fn snapshot_config<P: AsRef<Path>>(
    root: &Path,
    retention: u32,
    dirs: &[(P, &str)],
) -> SnapshotConfig {
    SnapshotConfig {
        name: "home".to_string(),
        dirs: dirs
            .iter()
            .map(|(src, dest)| DirMapping {
                src: src.as_ref().to_path_buf(),
                dest: PathBuf::from(dest),
                excludes: vec![],
            })
            .collect(),
        snapshots_dir: root.to_path_buf(),
        retention,
        cron: None,
        pre_commands: vec![],
        post_commands: vec![],
        always_run_post_commands: false,
    }
}

/// Sorted generation numbers of `name` under `root`
pub fn generation_numbers(root: &Path, name: &str) -> Vec<u32> {
    let mut numbers: Vec<u32> = crate::snapshot::info::find_generations(root, name)
        .unwrap()
        .into_iter()
        .map(|info| info.number)
        .collect();
    numbers.sort_unstable();
    numbers
}
