//! Persistent sequential numbering for work items.
//!
//! [`CounterService`] hands out strictly increasing numbers from a record file
//! shared by every process working on the same project root. Each mutation
//! runs under two locks: an in-process mutex (threads wait their turn) and the
//! cross-process advisory lock on `<record>.lock` (other processes get
//! [`CounterError::LockBusy`] instead of waiting).
//!
//! A corrupt record never reaches the caller: it is repaired from the `.bak`
//! copy or rolled forward to a safe default, with a warning logged and a
//! [`EffortEvent::CounterRepaired`] emitted.

mod format;
mod record;
mod seed;
mod store;

pub use format::{format_count, format_dated};
pub use record::{CounterRecord, RECORD_VERSION, integrity_tag};
pub use seed::{max_existing_number, sequence_prefix};
pub use store::{CountHint, CounterStore, LoadOutcome};

use crate::error::CounterError;
use crate::output::{EffortEvent, EventSink};
use crate::safe_io::{FileLock, LockPolicy};
use crate::work_item::{LifecycleState, StateDirs};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default zero-padding width for formatted numbers.
pub const DEFAULT_WIDTH: usize = 4;

pub struct CounterService {
    store: CounterStore,
    /// Where to look for existing items when the record is missing.
    seed_dirs: Option<StateDirs>,
    width: usize,
    date_prefix: bool,
    policy: LockPolicy,
    serial: Mutex<()>,
    sink: Arc<dyn EventSink>,
}

/// Both locks held for one counter mutation; released on drop.
struct CounterGuard<'a> {
    _file: FileLock,
    _serial: MutexGuard<'a, ()>,
}

impl CounterService {
    pub fn new(path: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            store: CounterStore::new(path),
            seed_dirs: None,
            width: DEFAULT_WIDTH,
            date_prefix: false,
            policy: LockPolicy::default(),
            serial: Mutex::new(()),
            sink,
        }
    }

    /// Seed a missing record from the items already in `dirs`.
    pub fn with_seed_dirs(mut self, dirs: StateDirs) -> Self {
        self.seed_dirs = Some(dirs);
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_date_prefix(mut self, date_prefix: bool) -> Self {
        self.date_prefix = date_prefix;
        self
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Hand out the next number and persist the increment.
    pub fn get_next(&self) -> Result<u64, CounterError> {
        let _guard = self.lock()?;
        let count = self.load_current()?;
        let next = count.checked_add(1).ok_or_else(|| CounterError::Io {
            path: self.store.path().to_path_buf(),
            source: io::Error::other("counter overflow"),
        })?;
        self.store
            .save(next, count)
            .map_err(|source| self.io_error(source))?;
        log::debug!("counter handed out {}", count);
        Ok(count)
    }

    /// [`get_next`](Self::get_next), formatted for use in a filename.
    pub fn get_next_formatted(&self) -> Result<String, CounterError> {
        self.get_next().map(|n| self.format(n))
    }

    /// The number the next [`get_next`](Self::get_next) would return.
    ///
    /// Takes the lock only when the record needs repair.
    pub fn peek(&self) -> Result<u64, CounterError> {
        match self.store.load().map_err(|e| self.io_error(e))? {
            LoadOutcome::Valid(record) => Ok(record.current_count),
            LoadOutcome::Missing => self.seed_value().map(|(current, _)| current),
            LoadOutcome::Corrupt(_) => {
                let _guard = self.lock()?;
                self.load_current()
            }
        }
    }

    /// Force the next number to `n`. Administrative override.
    pub fn initialize(&self, n: u64) -> Result<(), CounterError> {
        if n < 1 {
            return Err(CounterError::InvalidInitialValue(n));
        }
        let _guard = self.lock()?;
        self.store
            .save(n, n - 1)
            .map_err(|source| self.io_error(source))?;
        log::info!("counter initialized to {}", n);
        Ok(())
    }

    pub fn reset(&self) -> Result<(), CounterError> {
        self.initialize(1)
    }

    /// Move the counter past the highest numbered item in `dirs`.
    ///
    /// A record already ahead of every item keeps its value, so numbers
    /// handed out since the last item was created are never reissued.
    /// Returns the new next value.
    pub fn initialize_from_existing_items(&self, dirs: &StateDirs) -> Result<u64, CounterError> {
        let max_found = max_existing_number(dirs).map_err(|source| CounterError::Io {
            path: dirs.dir(LifecycleState::Active).to_path_buf(),
            source,
        })?;
        let seeded = max_found.map_or(1, |m| m.saturating_add(1));
        let _guard = self.lock()?;
        let recorded = match self.store.load().map_err(|e| self.io_error(e))? {
            LoadOutcome::Valid(record) => Some(record.current_count),
            LoadOutcome::Missing => None,
            LoadOutcome::Corrupt(_) => Some(self.load_current()?),
        };
        let current = recorded.map_or(seeded, |r| r.max(seeded));
        if current > seeded {
            log::info!(
                "counter already at {}, ahead of existing items; keeping it",
                current
            );
        }
        self.store
            .save(current, current - 1)
            .map_err(|source| self.io_error(source))?;
        self.sink.emit(EffortEvent::CounterSeeded { current, max_found });
        Ok(current)
    }

    /// Format `count` with this service's width and date settings.
    pub fn format(&self, count: u64) -> String {
        if self.date_prefix {
            format_dated(count, self.width, chrono::Local::now().date_naive())
        } else {
            format_count(count, self.width)
        }
    }

    fn lock(&self) -> Result<CounterGuard<'_>, CounterError> {
        let serial = self.serial.lock().unwrap_or_else(PoisonError::into_inner);
        let lock_path = self.store.lock_path();
        match FileLock::try_acquire_with(&lock_path, self.policy) {
            Ok(Some(file)) => Ok(CounterGuard {
                _file: file,
                _serial: serial,
            }),
            Ok(None) => Err(CounterError::LockBusy { path: lock_path }),
            Err(source) => Err(CounterError::Io {
                path: lock_path,
                source,
            }),
        }
    }

    /// Current value from disk, seeding or repairing as needed. Caller holds the lock.
    fn load_current(&self) -> Result<u64, CounterError> {
        match self.store.load().map_err(|e| self.io_error(e))? {
            LoadOutcome::Valid(record) => Ok(record.current_count),
            LoadOutcome::Missing => {
                let (current, max_found) = self.seed_value()?;
                self.sink.emit(EffortEvent::CounterSeeded { current, max_found });
                Ok(current)
            }
            LoadOutcome::Corrupt(hint) => {
                log::warn!(
                    "counter record {} failed its integrity check; repairing",
                    self.store.path().display()
                );
                let (record, source) =
                    self.store
                        .repair(hint)
                        .map_err(|source| CounterError::RepairFailed {
                            path: self.store.path().to_path_buf(),
                            source,
                        })?;
                log::warn!(
                    "counter repaired from {:?}; next value is {}",
                    source,
                    record.current_count
                );
                self.sink.emit(EffortEvent::CounterRepaired {
                    source,
                    current: record.current_count,
                });
                Ok(record.current_count)
            }
        }
    }

    /// First value for a missing record, and the highest existing number seen.
    fn seed_value(&self) -> Result<(u64, Option<u64>), CounterError> {
        let Some(dirs) = &self.seed_dirs else {
            return Ok((1, None));
        };
        let max_found = max_existing_number(dirs).map_err(|e| self.io_error(e))?;
        Ok((max_found.map_or(1, |m| m.saturating_add(1)), max_found))
    }

    fn io_error(&self, source: io::Error) -> CounterError {
        CounterError::Io {
            path: self.store.path().to_path_buf(),
            source,
        }
    }
}
