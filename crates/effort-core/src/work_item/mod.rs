//! Work items: lifecycle states, priorities and the per-state directory layout.
//!
//! A work item is one markdown file with a front matter header. The directory
//! it lives in and the `status` field in its header must always agree.

mod header;

pub use header::{
    WorkItemHeader, WorkItemMeta, front_matter_span, now_timestamp, rewrite_status,
    DATE_FORMAT, TIMESTAMP_FORMAT,
};

use crate::config::DirectoryNames;
use crate::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Lifecycle state of a work item; each state maps to one directory.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LifecycleState {
    Active,
    Completed,
    Archived,
}

impl LifecycleState {
    /// Parse a user-supplied state name, rejecting anything unknown.
    pub fn parse(s: &str) -> Result<Self, TransitionError> {
        s.trim()
            .parse()
            .map_err(|_| TransitionError::InvalidState(s.to_string()))
    }

    pub fn all() -> impl Iterator<Item = LifecycleState> {
        Self::iter()
    }
}

/// Work item priority as written in the header.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Resolved lifecycle directories for one project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDirs {
    active: PathBuf,
    completed: PathBuf,
    archived: PathBuf,
}

impl StateDirs {
    pub fn new(root: &Path, names: &DirectoryNames) -> Self {
        Self {
            active: root.join(&names.active),
            completed: root.join(&names.completed),
            archived: root.join(&names.archived),
        }
    }

    pub fn dir(&self, state: LifecycleState) -> &Path {
        match state {
            LifecycleState::Active => &self.active,
            LifecycleState::Completed => &self.completed,
            LifecycleState::Archived => &self.archived,
        }
    }

    /// Path of `filename` inside the directory for `state`.
    pub fn path_of(&self, state: LifecycleState, filename: &str) -> PathBuf {
        self.dir(state).join(filename)
    }

    /// All `(state, directory)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (LifecycleState, &Path)> {
        LifecycleState::all().map(move |s| (s, self.dir(s)))
    }

    /// Create every lifecycle directory that does not exist yet.
    pub fn ensure_all(&self) -> io::Result<()> {
        for (_, dir) in self.iter() {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Work item filenames currently in the directory for `state`, sorted.
    ///
    /// A missing directory yields an empty list.
    pub fn list(&self, state: LifecycleState) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.dir(state)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_work_item_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Markdown files that are not hidden; lock, temp and backup siblings are excluded.
pub fn is_work_item_name(name: &str) -> bool {
    !name.starts_with('.') && name.ends_with(".md") && name.len() > ".md".len()
}

/// Reject filenames that would escape the lifecycle directory.
pub fn validate_filename(filename: &str) -> Result<(), TransitionError> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if bad {
        Err(TransitionError::InvalidFilename(filename.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_state() {
        assert_eq!(
            LifecycleState::parse("completed").unwrap(),
            LifecycleState::Completed
        );
        assert_eq!(
            LifecycleState::parse(" Archived ").unwrap(),
            LifecycleState::Archived
        );
        assert!(matches!(
            LifecycleState::parse("done"),
            Err(TransitionError::InvalidState(s)) if s == "done"
        ));
        assert_eq!(LifecycleState::Active.as_ref(), "active");
        assert_eq!(LifecycleState::Archived.to_string(), "archived");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("0001_fix.md").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("../active/x.md").is_err());
        assert!(validate_filename("a\\b.md").is_err());
    }

    #[test]
    fn test_is_work_item_name() {
        assert!(is_work_item_name("0001_fix.md"));
        assert!(!is_work_item_name("0001_fix.md.lock"));
        assert!(!is_work_item_name("0001_fix.md.tmp"));
        assert!(!is_work_item_name(".hidden.md"));
        assert!(!is_work_item_name("notes.txt"));
    }

    #[test]
    fn test_state_dirs_list_and_paths() {
        let temp = TempDir::new().unwrap();
        let dirs = StateDirs::new(temp.path(), &DirectoryNames::default());
        assert!(dirs.list(LifecycleState::Active).unwrap().is_empty());

        dirs.ensure_all().unwrap();
        fs::write(dirs.path_of(LifecycleState::Active, "0002_b.md"), "").unwrap();
        fs::write(dirs.path_of(LifecycleState::Active, "0001_a.md"), "").unwrap();
        fs::write(dirs.path_of(LifecycleState::Active, "0001_a.md.lock"), "").unwrap();

        assert_eq!(
            dirs.list(LifecycleState::Active).unwrap(),
            vec!["0001_a.md".to_string(), "0002_b.md".to_string()]
        );
        assert!(
            dirs.path_of(LifecycleState::Completed, "x.md")
                .ends_with("completed/x.md")
        );
    }
}
