//! Status transition engine: move a work item between lifecycle directories.
//!
//! A move holds advisory locks on both the source and destination paths,
//! rewrites the header `status` and `last_updated` fields, writes the
//! destination, and only then deletes the source. A crash between the write
//! and the delete leaves the item duplicated (never lost), with a journal
//! intent naming the destination for [`crate::reconcile`] to finish the job.
//!
//! The engine does not enforce an ordering between states; any state may
//! move to any other.

use crate::error::TransitionError;
use crate::index::{IndexEntry, RefreshStats, WorkIndex};
use crate::journal::{Journal, TransitionIntent};
use crate::output::{EffortEvent, EventSink};
use crate::safe_io::{FileLock, LockPolicy, atomic_write, lock_path_for};
use crate::work_item::{LifecycleState, StateDirs, now_timestamp, rewrite_status, validate_filename};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub struct TransitionEngine {
    dirs: StateDirs,
    journal: Journal,
    index: Mutex<WorkIndex>,
    policy: LockPolicy,
    sink: Arc<dyn EventSink>,
}

impl TransitionEngine {
    pub fn new(dirs: StateDirs, journal: Journal, index: WorkIndex, sink: Arc<dyn EventSink>) -> Self {
        Self {
            dirs,
            journal,
            index: Mutex::new(index),
            policy: LockPolicy::default(),
            sink,
        }
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn dirs(&self) -> &StateDirs {
        &self.dirs
    }

    /// [`transition`](Self::transition) with user-supplied state names.
    ///
    /// Unknown state names are rejected before anything on disk is touched.
    pub fn move_item(&self, filename: &str, from: &str, to: &str) -> Result<(), TransitionError> {
        let to = LifecycleState::parse(to)?;
        let from = LifecycleState::parse(from)?;
        self.transition(filename, from, to).map(|_| ())
    }

    /// Move `filename` from the `from` directory to the `to` directory.
    ///
    /// Returns the destination path. Fails with [`TransitionError::LockBusy`]
    /// instead of waiting if either path is locked elsewhere.
    pub fn transition(
        &self,
        filename: &str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<PathBuf, TransitionError> {
        validate_filename(filename)?;
        if from == to {
            return Err(TransitionError::Unchanged(to));
        }

        let source = self.dirs.path_of(from, filename);
        let destination = self.dirs.path_of(to, filename);
        let dest_dir = self.dirs.dir(to);
        fs::create_dir_all(dest_dir).map_err(|e| TransitionError::io(dest_dir, e))?;

        let source_lock = self.acquire(&source)?;
        let destination_lock = self.acquire(&destination)?;

        let content = fs::read(&source).map_err(|e| TransitionError::io(&source, e))?;
        let rewritten = rewrite_status(&content, to, &now_timestamp());

        let intent = TransitionIntent::new(filename, from, to);
        self.journal
            .record(&intent)
            .map_err(|e| TransitionError::io(self.journal.dir(), e))?;

        if let Err(e) = atomic_write(&destination, &rewritten) {
            // Nothing was moved; the source is still the only copy.
            let _ = self.journal.clear(filename);
            return Err(TransitionError::io(&destination, e));
        }

        // On failure the intent stays behind so reconciliation removes the
        // stale source in favour of the destination.
        fs::remove_file(&source).map_err(|e| TransitionError::io(&source, e))?;

        if let Err(e) = self.journal.clear(filename) {
            log::warn!("could not clear journal entry for {}: {}", filename, e);
        }

        let modified = fs::metadata(&destination)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let entry = IndexEntry::from_content(to, &destination, &rewritten, modified);
        self.index().record_move(filename, from, entry);

        drop(destination_lock);
        drop(source_lock);

        log::info!("moved {} from {} to {}", filename, from, to);
        self.sink.emit(EffortEvent::StatusChanged {
            filename: filename.to_string(),
            from,
            to,
        });

        Ok(destination)
    }

    /// Index entries for `state`, or for every state.
    pub fn query(&self, state: Option<LifecycleState>) -> Vec<IndexEntry> {
        self.index().query(state)
    }

    /// Add or replace the index entry for a file already on disk.
    pub fn track(&self, state: LifecycleState, filename: &str) -> io::Result<IndexEntry> {
        let entry = IndexEntry::load(state, &self.dirs.path_of(state, filename))?;
        self.index().insert(entry.clone());
        Ok(entry)
    }

    /// Re-sync the index with the filesystem.
    pub fn refresh_index(&self) -> io::Result<RefreshStats> {
        let stats = self.index().refresh(&self.dirs)?;
        if !stats.is_empty() {
            self.sink.emit(EffortEvent::IndexRefreshed {
                added: stats.added,
                updated: stats.updated,
                removed: stats.removed,
            });
        }
        Ok(stats)
    }

    fn index(&self) -> MutexGuard<'_, WorkIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, path: &Path) -> Result<FileLock, TransitionError> {
        let lock_path = lock_path_for(path);
        match FileLock::try_acquire_with(&lock_path, self.policy) {
            Ok(Some(lock)) => Ok(lock),
            Ok(None) => Err(TransitionError::LockBusy { path: lock_path }),
            Err(e) => Err(TransitionError::Io {
                path: lock_path,
                source: e,
            }),
        }
    }
}
