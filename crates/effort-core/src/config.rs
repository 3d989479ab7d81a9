//! Project configuration (`effort.toml`).
//!
//! Every field has a default, so a project without a config file works out
//! of the box. Paths are relative to the project root.

use crate::error::EffortError;
use crate::safe_io::LockPolicy;
use crate::work_item::Priority;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file at the project root.
pub const CONFIG_FILE_NAME: &str = "effort.toml";

fn default_counter_file() -> PathBuf {
    PathBuf::from(".effort/counter.json")
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from(".effort/journal")
}

fn default_number_width() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Counter record path.
    pub counter_file: PathBuf,
    /// Directory of in-flight transition intents.
    pub journal_dir: PathBuf,
    /// Zero-padding width for formatted numbers.
    pub number_width: usize,
    /// Prefix formatted numbers with the current date (`YYYYMMDD-`).
    pub date_prefix: bool,
    pub directories: DirectoryNames,
    pub lock: LockConfig,
    pub defaults: ItemDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            counter_file: default_counter_file(),
            journal_dir: default_journal_dir(),
            number_width: default_number_width(),
            date_prefix: false,
            directories: DirectoryNames::default(),
            lock: LockConfig::default(),
            defaults: ItemDefaults::default(),
        }
    }
}

impl Config {
    /// Load `effort.toml` from `root`, falling back to defaults if absent.
    pub fn load(root: &Path) -> Result<Self, EffortError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)?;
        Self::from_toml(&content).map_err(|message| EffortError::Config { path, message })
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: Config = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let names = [
            &self.directories.active,
            &self.directories.completed,
            &self.directories.archived,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("directory names must not be empty".to_string());
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err("each lifecycle state needs its own directory".to_string());
        }
        if self.lock.attempts == 0 {
            return Err("lock.attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Counter record path resolved against `root`.
    pub fn counter_path(&self, root: &Path) -> PathBuf {
        root.join(&self.counter_file)
    }

    /// Journal directory resolved against `root`.
    pub fn journal_path(&self, root: &Path) -> PathBuf {
        root.join(&self.journal_dir)
    }
}

/// Directory name for each lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryNames {
    pub active: String,
    pub completed: String,
    pub archived: String,
}

impl Default for DirectoryNames {
    fn default() -> Self {
        Self {
            active: "active".to_string(),
            completed: "completed".to_string(),
            archived: "archived".to_string(),
        }
    }
}

/// Lock acquisition limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        let policy = LockPolicy::default();
        Self {
            attempts: policy.attempts,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
        }
    }
}

impl LockConfig {
    pub fn policy(&self) -> LockPolicy {
        LockPolicy {
            attempts: self.attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Header defaults for newly created work items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDefaults {
    pub assignee: String,
    pub priority: Priority,
    /// Days from creation until the default due date.
    pub due_days: u32,
}

impl Default for ItemDefaults {
    fn default() -> Self {
        Self {
            assignee: "unassigned".to_string(),
            priority: Priority::Medium,
            due_days: 7,
        }
    }
}
