//! Configuration management for snapsync.
//!
//! A config directory holds `config.toml` with the global tool settings. Every
//! other `*.toml` file in the snapshot definitions directory (the config
//! directory itself unless `snapshots_configs_dir` says otherwise) describes
//! one snapshot definition.

use crate::utils::{Result, SnapsyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// File name of the global configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Global settings shared by every snapshot definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// rsync executable used for mirror syncing
    #[serde(default = "default_rsync_path")]
    pub rsync_path: String,

    /// cp executable used for hard-link cloning
    #[serde(default = "default_cp_path")]
    pub cp_path: String,

    /// Directory holding the snapshot definition files
    #[serde(default)]
    pub snapshots_configs_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// One snapshot definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Unique name, used as the generation directory prefix
    pub name: String,

    /// Directories captured in every generation
    #[serde(default)]
    pub dirs: Vec<DirMapping>,

    /// Root directory holding `<name>.<number>` generations
    pub snapshots_dir: PathBuf,

    /// Number of generations kept
    pub retention: u32,

    /// Cron expression; runs once at startup when absent
    #[serde(default)]
    pub cron: Option<String>,

    #[serde(default)]
    pub pre_commands: Vec<String>,

    #[serde(default)]
    pub post_commands: Vec<String>,

    /// Run post commands even when the snapshot itself failed
    #[serde(default)]
    pub always_run_post_commands: bool,
}

/// Maps a source directory to a subpath inside each generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirMapping {
    /// Absolute source directory
    pub src: PathBuf,

    /// Destination relative to the generation root
    #[serde(default)]
    pub dest: PathBuf,

    /// rsync exclude patterns
    #[serde(default)]
    pub excludes: Vec<String>,
}

// Default values
fn default_rsync_path() -> String {
    "rsync".to_string()
}

fn default_cp_path() -> String {
    "cp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rsync_path: default_rsync_path(),
            cp_path: default_cp_path(),
            snapshots_configs_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Resolve the snapshot definitions directory against the config directory
    pub fn snapshots_configs_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.snapshots_configs_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        }
    }
}

impl SnapshotConfig {
    /// Check the rules every definition must follow on its own
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SnapsyncError::Config("snapshot name must not be empty".into()));
        }
        if self.name.contains('.') || self.name.chars().any(char::is_whitespace) {
            return Err(SnapsyncError::Config(format!(
                "snapshot name '{}' must not include dots or whitespaces",
                self.name
            )));
        }
        if self.retention < 1 {
            return Err(SnapsyncError::Config(format!(
                "{}: retention must be at least 1",
                self.name
            )));
        }
        for dir in &self.dirs {
            if !dir.src.is_absolute() {
                return Err(SnapsyncError::Config(format!(
                    "{}: src {} must be an absolute path",
                    self.name,
                    dir.src.display()
                )));
            }
            if dir.dest.is_absolute() {
                return Err(SnapsyncError::Config(format!(
                    "{}: dest {} must be relative to the snapshot",
                    self.name,
                    dir.dest.display()
                )));
            }
        }
        Ok(())
    }
}

/// Load `config.toml` from `config_dir`.
///
/// A missing file yields the default configuration; a file that can't be read
/// or parsed is an error.
pub fn load_config(config_dir: &Path, expand_vars: bool) -> Result<Config> {
    let path = config_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file found, using defaults");
        return Ok(Config::default());
    }

    if expand_vars {
        load_dotenv(config_dir);
    }
    let content = read_config_file(&path, expand_vars)?;
    toml::from_str(&content)
        .map_err(|e| SnapsyncError::Config(format!("can't parse {}: {}", path.display(), e)))
}

/// Load every snapshot definition in `dir`.
///
/// Files are read in name order; `config.toml` and non-TOML files are skipped.
/// Duplicate names and invalid definitions reject the whole set.
pub fn load_snapshot_configs(dir: &Path, expand_vars: bool) -> Result<Vec<SnapshotConfig>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        SnapsyncError::Config(format!("can't read directory {}: {}", dir.display(), e))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_definition = path.extension().is_some_and(|ext| ext == "toml")
            && path.file_name().is_some_and(|name| name != CONFIG_FILE_NAME)
            && path.is_file();
        if is_definition {
            paths.push(path);
        }
    }
    paths.sort();

    if expand_vars {
        load_dotenv(dir);
    }

    let mut configs: Vec<SnapshotConfig> = Vec::with_capacity(paths.len());
    let mut names = HashSet::new();
    for path in paths {
        let content = read_config_file(&path, expand_vars)?;
        let snapshot_config: SnapshotConfig = toml::from_str(&content).map_err(|e| {
            SnapsyncError::Config(format!(
                "can't parse snapshot config file {}: {}",
                path.display(),
                e
            ))
        })?;
        snapshot_config.validate()?;

        if !names.insert(snapshot_config.name.clone()) {
            return Err(SnapsyncError::Config(format!(
                "there are two snapshot configs with the same snapshot name: {}",
                snapshot_config.name
            )));
        }
        configs.push(snapshot_config);
    }

    Ok(configs)
}

/// Find one snapshot definition by name; `Ok(None)` when nothing matches
pub fn get_snapshot_config_by_name(
    dir: &Path,
    expand_vars: bool,
    name: &str,
) -> Result<Option<SnapshotConfig>> {
    Ok(load_snapshot_configs(dir, expand_vars)?
        .into_iter()
        .find(|snapshot_config| snapshot_config.name == name))
}

/// Default config directory: the current working directory
pub fn default_config_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn read_config_file(path: &Path, expand_vars: bool) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SnapsyncError::Config(format!("can't read {}: {}", path.display(), e)))?;
    Ok(if expand_vars {
        expand_env(&content, |key| std::env::var(key).ok())
    } else {
        content
    })
}

/// Load `<dir>/.env` without overriding variables already set
fn load_dotenv(dir: &Path) {
    let env_file = dir.join(".env");
    if env_file.is_file() {
        if let Err(e) = dotenvy::from_path(&env_file) {
            tracing::warn!(path = %env_file.display(), error = %e, "Failed to load .env file");
        }
    }
}

/// Expand `$VAR` and `${VAR}` references.
///
/// Unknown variables expand to the empty string and `$$` yields a literal `$`.
/// A `$` not followed by a name is kept as is.
pub fn expand_env<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((start, '{')) => {
                let rest = &input[start + 1..];
                match rest.find('}') {
                    Some(end) => {
                        let key = &rest[..end];
                        out.push_str(&lookup(key).unwrap_or_default());
                        // skip the braces and the name
                        while let Some((i, _)) = chars.next() {
                            if i == start + 1 + end {
                                break;
                            }
                        }
                    }
                    None => out.push('$'),
                }
            }
            Some((start, next)) if next == '_' || next.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch == '_' || ch.is_ascii_alphanumeric() {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&input[start..end]).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }

    out
}
