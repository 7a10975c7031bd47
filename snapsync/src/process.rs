//! External process execution.
//!
//! The engine never spawns processes directly. Mirror syncing, hard-link
//! cloning and hook commands all go through a [`CommandRunner`], so tests can
//! swap in a runner that does the work natively.

use crate::config::Config;
use crate::utils::{Result, SnapsyncError};
use std::path::Path;
use std::process::Command;

/// Outcome of one finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an argv to completion, blocking the caller
pub trait CommandRunner: Send + Sync {
    /// Spawn failures are errors; a non-zero exit is reported in the output
    fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Runs commands with `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv.split_first().ok_or_else(|| SnapsyncError::Subprocess {
            command: String::new(),
            detail: "empty command line".to_string(),
        })?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| SnapsyncError::Subprocess {
                command: display_argv(argv),
                detail: format!("can't spawn: {}", e),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run `argv` and turn a non-zero exit into a [`SnapsyncError::Subprocess`]
pub fn run_checked(runner: &dyn CommandRunner, argv: &[String]) -> Result<CommandOutput> {
    tracing::debug!(command = %display_argv(argv), "Running command");
    let output = runner.run(argv)?;
    if output.success() {
        return Ok(output);
    }

    let status = match output.exit_code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };
    let diagnostics = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    let detail = if diagnostics.is_empty() {
        status
    } else {
        format!("{}, {}", status, diagnostics)
    };

    Err(SnapsyncError::Subprocess {
        command: display_argv(argv),
        detail,
    })
}

/// Mirror-sync `src/` into `dst`, deleting destination-only entries
pub fn sync_argv(config: &Config, src: &Path, dst: &Path, excludes: &[String]) -> Vec<String> {
    let mut argv = vec![
        config.rsync_path.clone(),
        "-aHK".to_string(),
        "--delete".to_string(),
    ];
    argv.extend(excludes.iter().map(|pattern| format!("--exclude={}", pattern)));
    argv.push(format!("{}/", src.display()));
    argv.push(dst.display().to_string());
    argv
}

/// Clone the contents of `src` into `dst` as hard links
pub fn clone_argv(config: &Config, src: &Path, dst: &Path) -> Vec<String> {
    vec![
        config.cp_path.clone(),
        "-lra".to_string(),
        format!("{}/.", src.display()),
        dst.display().to_string(),
    ]
}

/// Run a hook command through the shell
pub fn shell_argv(command: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), command.to_string()]
}

/// The command line a hook was given, or the joined argv otherwise
pub fn display_argv(argv: &[String]) -> String {
    match argv {
        [sh, flag, command] if sh == "sh" && flag == "-c" => command.clone(),
        _ => argv.join(" "),
    }
}
