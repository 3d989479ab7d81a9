//! Startup reconciliation: repair what interrupted operations left behind.
//!
//! Passes run in order:
//! 1. replay journal intents of transitions that wrote their destination
//!    but never deleted their source
//! 2. resolve work items present in more than one lifecycle directory
//! 3. remove `.tmp` leftovers of interrupted atomic writes, including
//!    journal intents
//! 4. remove orphaned `.lock` files
//! 5. rewrite header `status` fields that disagree with their directory
//!
//! Anything currently locked by a live process is skipped, never waited on.
//! A work item that cannot be read is logged and skipped. The filesystem
//! location of a work item is authoritative.

use crate::journal::{Journal, TransitionIntent};
use crate::output::{EffortEvent, EventSink};
use crate::safe_io::{FileLock, LockPolicy, atomic_write, lock_path_for, remove_if_orphaned};
use crate::work_item::{LifecycleState, StateDirs, WorkItemMeta, now_timestamp, rewrite_status};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a reconciliation pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub journal_replayed: usize,
    pub duplicates_resolved: usize,
    pub temp_files_removed: usize,
    pub orphan_locks_removed: usize,
    pub statuses_repaired: usize,
    /// Files left alone because another process held their lock.
    pub skipped_busy: usize,
}

impl ReconcileReport {
    /// True when nothing needed repair.
    pub fn is_clean(&self) -> bool {
        self.journal_replayed == 0
            && self.duplicates_resolved == 0
            && self.temp_files_removed == 0
            && self.orphan_locks_removed == 0
            && self.statuses_repaired == 0
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replayed: {}, duplicates: {}, temp files: {}, orphan locks: {}, statuses: {}, busy: {}",
            self.journal_replayed,
            self.duplicates_resolved,
            self.temp_files_removed,
            self.orphan_locks_removed,
            self.statuses_repaired,
            self.skipped_busy
        )
    }
}

/// Run every reconciliation pass over one project.
///
/// `counter_path` is the counter record; its leftovers are cleaned under the
/// counter lock.
pub fn reconcile(
    dirs: &StateDirs,
    journal: &Journal,
    counter_path: &Path,
    policy: LockPolicy,
    sink: &dyn EventSink,
) -> io::Result<ReconcileReport> {
    let pass = Pass {
        dirs,
        journal,
        counter_path,
        policy,
        sink,
        report: ReconcileReport::default(),
    };
    pass.run()
}

struct Pass<'a> {
    dirs: &'a StateDirs,
    journal: &'a Journal,
    counter_path: &'a Path,
    policy: LockPolicy,
    sink: &'a dyn EventSink,
    report: ReconcileReport,
}

impl Pass<'_> {
    fn run(mut self) -> io::Result<ReconcileReport> {
        for intent in self.journal.pending()? {
            self.replay(&intent)?;
        }
        self.resolve_duplicates()?;
        self.remove_temp_files()?;
        self.remove_orphan_locks()?;
        self.repair_statuses()?;

        if self.report.is_clean() {
            log::debug!("reconcile: nothing to repair");
        } else {
            log::info!("reconcile: {}", self.report);
        }
        Ok(self.report)
    }

    fn lock(&mut self, path: &Path) -> io::Result<Option<FileLock>> {
        let lock = FileLock::try_acquire_with(&lock_path_for(path), self.policy)?;
        if lock.is_none() {
            log::debug!("reconcile: {} is busy, skipping", path.display());
            self.report.skipped_busy += 1;
        }
        Ok(lock)
    }

    fn replay(&mut self, intent: &TransitionIntent) -> io::Result<()> {
        let source = self.dirs.path_of(intent.from, &intent.filename);
        let destination = self.dirs.path_of(intent.to, &intent.filename);

        let Some(_source_lock) = self.lock(&source)? else {
            return Ok(());
        };
        let Some(_dest_lock) = self.lock(&destination)? else {
            return Ok(());
        };

        // Without a destination the write never landed and the source is
        // still the only copy.
        if destination.exists() && source.exists() {
            remove_existing(&source)?;
            log::warn!(
                "completed interrupted move of {} to {}",
                intent.filename,
                intent.to
            );
            self.report.journal_replayed += 1;
            self.sink.emit(EffortEvent::JournalReplayed {
                filename: intent.filename.clone(),
                to: intent.to,
            });
        }
        self.journal.clear(&intent.filename)
    }

    fn resolve_duplicates(&mut self) -> io::Result<()> {
        let dirs = self.dirs;
        let mut seen: BTreeMap<String, Vec<LifecycleState>> = BTreeMap::new();
        for (state, _) in dirs.iter() {
            for name in dirs.list(state)? {
                seen.entry(name).or_default().push(state);
            }
        }

        for (filename, states) in seen.into_iter().filter(|(_, s)| s.len() > 1) {
            let mut locks = Vec::with_capacity(states.len());
            for state in &states {
                let path = dirs.path_of(*state, &filename);
                match self.lock(&path)? {
                    Some(lock) => locks.push(lock),
                    None => break,
                }
            }
            if locks.len() < states.len() {
                continue;
            }

            let mut copies = Vec::with_capacity(states.len());
            for state in states {
                let path = dirs.path_of(state, &filename);
                match fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(modified) => copies.push((modified, state)),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
            let Some(&(_, kept)) = copies.iter().max() else {
                continue;
            };
            let removed: Vec<LifecycleState> = copies
                .iter()
                .map(|(_, state)| *state)
                .filter(|state| *state != kept)
                .collect();
            if removed.is_empty() {
                continue;
            }
            for state in &removed {
                remove_existing(&dirs.path_of(*state, &filename))?;
            }

            log::warn!(
                "{} existed in several directories; kept the {} copy",
                filename,
                kept
            );
            self.report.duplicates_resolved += 1;
            self.sink.emit(EffortEvent::DuplicateResolved {
                filename,
                kept,
                removed,
            });
        }
        Ok(())
    }

    fn remove_temp_files(&mut self) -> io::Result<()> {
        let counter_path = self.counter_path;
        let mut candidates: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (_, dir) in self.dirs.iter() {
            candidates.extend(temp_files_in(dir)?);
        }
        // Record and backup writes both happen under the record's lock.
        if let Some(counter_dir) = counter_path.parent() {
            let record_name = counter_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            for (tmp, _) in temp_files_in(counter_dir)? {
                let belongs = tmp
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(&record_name));
                if belongs {
                    candidates.push((tmp, counter_path.to_path_buf()));
                }
            }
        }

        for (tmp, target) in candidates {
            let Some(_lock) = self.lock(&target)? else {
                continue;
            };
            self.remove_temp_file(tmp)?;
        }

        // An intent is written under the item's locks in its source and
        // destination directories, so locking the item everywhere is enough.
        let dirs = self.dirs;
        for (tmp, intent_path) in temp_files_in(self.journal.dir())? {
            let Some(filename) = intent_path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            let mut locks = Vec::new();
            for (state, _) in dirs.iter() {
                match self.lock(&dirs.path_of(state, filename))? {
                    Some(lock) => locks.push(lock),
                    None => break,
                }
            }
            if locks.len() == dirs.iter().count() {
                self.remove_temp_file(tmp)?;
            }
        }
        Ok(())
    }

    fn remove_temp_file(&mut self, tmp: PathBuf) -> io::Result<()> {
        if remove_existing(&tmp)? {
            log::debug!("removed leftover {}", tmp.display());
            self.report.temp_files_removed += 1;
            self.sink.emit(EffortEvent::TempFileRemoved { path: tmp });
        }
        Ok(())
    }

    fn remove_orphan_locks(&mut self) -> io::Result<()> {
        let state_dirs = self.dirs;
        let mut dirs: Vec<&Path> = state_dirs.iter().map(|(_, dir)| dir).collect();
        if let Some(counter_dir) = self.counter_path.parent() {
            dirs.push(counter_dir);
        }

        for dir in dirs {
            for path in files_with_extension(dir, "lock")? {
                if remove_if_orphaned(&path)? {
                    log::warn!("removed orphaned lock {}", path.display());
                    self.report.orphan_locks_removed += 1;
                    self.sink.emit(EffortEvent::OrphanLockRemoved { path });
                }
            }
        }
        Ok(())
    }

    fn repair_statuses(&mut self) -> io::Result<()> {
        let dirs = self.dirs;
        for (state, _) in dirs.iter() {
            for filename in dirs.list(state)? {
                let path = dirs.path_of(state, &filename);
                if !status_disagrees(&path, state) {
                    continue;
                }
                let Some(_lock) = self.lock(&path)? else {
                    continue;
                };
                // Re-read under the lock; a concurrent move may have fixed it.
                let content = match fs::read(&path) {
                    Ok(content) => content,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        log::warn!("reconcile: skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                let header = WorkItemMeta::from_bytes(&content).status;
                if header
                    .as_deref()
                    .is_none_or(|s| s.parse::<LifecycleState>().ok() == Some(state))
                {
                    continue;
                }
                let rewritten = rewrite_status(&content, state, &now_timestamp());
                if let Err(e) = atomic_write(&path, &rewritten) {
                    log::warn!("reconcile: could not repair {}: {}", path.display(), e);
                    continue;
                }

                log::warn!(
                    "{} is in {} but its header said {:?}; header rewritten",
                    filename,
                    state,
                    header
                );
                self.report.statuses_repaired += 1;
                self.sink.emit(EffortEvent::StatusRepaired {
                    filename,
                    header,
                    directory: state,
                });
            }
        }
        Ok(())
    }
}

/// Whether the file's header names a status other than `state`.
///
/// A header with no `status` field, or a file that cannot be read, is left
/// alone.
fn status_disagrees(path: &Path, state: LifecycleState) -> bool {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return false,
        Err(e) => {
            log::warn!("reconcile: skipping {}: {}", path.display(), e);
            return false;
        }
    };
    let meta = WorkItemMeta::from_bytes(&content);
    meta.status.is_some() && meta.lifecycle_state() != Some(state)
}

/// Remove `path`, reporting whether it existed.
fn remove_existing(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn files_with_extension(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// `(leftover, target)` pairs for every `<target>.tmp` in `dir`.
fn temp_files_in(dir: &Path) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    Ok(files_with_extension(dir, "tmp")?
        .into_iter()
        .map(|tmp| {
            let target = tmp.with_extension("");
            (tmp, target)
        })
        .collect())
}
