//! Durable counter store: load, verify, save and repair the record file.
//!
//! The record is only ever replaced through [`atomic_write_json`], and every
//! successful save refreshes the `.bak` sibling, so the backup always holds
//! the last known-good record.

use super::record::CounterRecord;
use crate::output::RepairSource;
use crate::safe_io::{atomic_write_json, lock_path_for, sibling_with_suffix};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Best-effort counts salvaged from a corrupt record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountHint {
    pub current_count: u64,
    pub previous_count: u64,
}

impl CountHint {
    /// Forward-only default: never below anything the damaged record claimed.
    pub fn safe_current(&self) -> u64 {
        1.max(self.current_count)
            .max(self.previous_count.saturating_add(1))
    }
}

/// Result of reading the record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No record yet: first use.
    Missing,
    Valid(CounterRecord),
    /// Unparseable, tag mismatch, or counts out of order.
    Corrupt(CountHint),
}

#[derive(Debug, Clone)]
pub struct CounterStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl CounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let backup_path = sibling_with_suffix(&path, "bak");
        Self { path, backup_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn lock_path(&self) -> PathBuf {
        lock_path_for(&self.path)
    }

    pub fn load(&self) -> io::Result<LoadOutcome> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
            Err(e) => return Err(e),
        };
        Ok(classify(&bytes))
    }

    /// Whether `record` carries a valid integrity tag.
    pub fn verify(record: &CounterRecord) -> bool {
        record.verify()
    }

    /// Seal and persist a record with the given counts, then refresh the backup.
    pub fn save(&self, current_count: u64, previous_count: u64) -> io::Result<CounterRecord> {
        let record = CounterRecord::sealed(current_count, previous_count);
        atomic_write_json(&self.path, &record)?;
        atomic_write_json(&self.backup_path, &record)?;
        Ok(record)
    }

    /// Replace a corrupt record with its verified backup, or with a
    /// forward-only default computed from `hint` if no backup is usable.
    pub fn repair(&self, hint: CountHint) -> io::Result<(CounterRecord, RepairSource)> {
        let (current, previous, source) = match self.load_backup()? {
            Some(backup) => (backup.current_count, backup.previous_count, RepairSource::Backup),
            None => {
                let current = hint.safe_current();
                (current, current - 1, RepairSource::Default)
            }
        };
        let record = self.save(current, previous)?;
        Ok((record, source))
    }

    /// The backup record, if present and sound.
    fn load_backup(&self) -> io::Result<Option<CounterRecord>> {
        let bytes = match fs::read(&self.backup_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match classify(&bytes) {
            LoadOutcome::Valid(record) => Ok(Some(record)),
            _ => {
                log::warn!("counter backup {} is not usable", self.backup_path.display());
                Ok(None)
            }
        }
    }
}

fn classify(bytes: &[u8]) -> LoadOutcome {
    match serde_json::from_slice::<CounterRecord>(bytes) {
        Ok(record) if record.is_sound() => LoadOutcome::Valid(record),
        Ok(record) => LoadOutcome::Corrupt(CountHint {
            current_count: record.current_count,
            previous_count: record.previous_count,
        }),
        Err(_) => LoadOutcome::Corrupt(salvage(bytes)),
    }
}

/// Pull whatever counts survive from a record that no longer parses.
fn salvage(bytes: &[u8]) -> CountHint {
    let Ok(value) = serde_json::from_slice::<Value>(bytes) else {
        return CountHint::default();
    };
    let field = |name: &str| value.get(name).and_then(Value::as_u64).unwrap_or(0);
    CountHint {
        current_count: field("current_count"),
        previous_count: field("previous_count"),
    }
}
