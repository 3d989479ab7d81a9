//! Intent records for in-flight transitions.
//!
//! The transition engine writes an intent before it writes the destination
//! copy and clears it after deleting the source. An intent that outlives its
//! locks marks an interrupted move, and tells reconciliation which copy is the
//! destination.

use crate::safe_io::{atomic_write_json, sibling_with_suffix};
use crate::work_item::LifecycleState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionIntent {
    pub filename: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// Epoch seconds when the move started.
    pub started: i64,
}

impl TransitionIntent {
    pub fn new(filename: &str, from: LifecycleState, to: LifecycleState) -> Self {
        Self {
            filename: filename.to_string(),
            from,
            to,
            started: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, filename: &str) -> PathBuf {
        sibling_with_suffix(&self.dir.join(filename), "json")
    }

    pub fn record(&self, intent: &TransitionIntent) -> io::Result<()> {
        atomic_write_json(&self.entry_path(&intent.filename), intent)
    }

    /// Remove the intent for `filename`; absent intents are fine.
    pub fn clear(&self, filename: &str) -> io::Result<()> {
        match fs::remove_file(self.entry_path(filename)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Every intent still on disk. Unreadable entries are logged and removed.
    pub fn pending(&self) -> io::Result<Vec<TransitionIntent>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut intents: Vec<TransitionIntent> = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let parsed =
                fs::read(&path).map(|bytes| serde_json::from_slice::<TransitionIntent>(&bytes));
            match parsed {
                Ok(Ok(intent)) => intents.push(intent),
                Ok(Err(e)) => {
                    log::warn!("dropping unreadable journal entry {}: {}", path.display(), e);
                    let _ = fs::remove_file(&path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        intents.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(intents)
    }
}
