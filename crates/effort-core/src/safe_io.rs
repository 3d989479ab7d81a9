//! Safe file I/O utilities: atomic writes and scoped advisory locks.
//!
//! This module provides building blocks for safe concurrent file access:
//! - [`atomic_write_json()`] - Write JSON atomically (temp file + rename)
//! - [`atomic_write()`] - Write bytes atomically
//! - [`FileLock`] - RAII advisory lock on a `<path>.lock` sibling using fs2
//!
//! **Atomic Writes**: the target file is either fully updated or unchanged,
//! never partially written. Readers therefore never need a lock.
//!
//! **File Locking**: exclusion between processes comes from fs2's advisory
//! locks; exclusion between threads of one process comes from a process-wide
//! registry of held lock paths consulted before the OS lock is attempted.
//! Acquisition never blocks: a bounded number of attempts is made and the
//! caller is told the lock is busy.
//!
//! # Example
//!
//! ```ignore
//! use effort_core::safe_io::{FileLock, LockPolicy, lock_path_for};
//!
//! if let Some(_lock) = FileLock::try_acquire_with(&lock_path_for(&path), LockPolicy::default())? {
//!     // ... operations protected by lock ...
//! } // lock released and lock file removed here
//! ```

use fs2::FileExt;
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use std::thread;
use std::time::Duration;

/// Lock paths currently held by this process.
static HELD_LOCKS: LazyLock<Mutex<HashSet<PathBuf>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

/// Append `suffix` to the file name of `path` (`a/x.md` + `lock` -> `a/x.md.lock`).
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// The advisory lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    sibling_with_suffix(path, "lock")
}

/// The temporary file used while atomically replacing `path`.
pub fn temp_path_for(path: &Path) -> PathBuf {
    sibling_with_suffix(path, "tmp")
}

/// Atomically write JSON to a file.
///
/// Serializes `value` as pretty-printed JSON and hands it to [`atomic_write`].
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(path, &json)
}

/// Atomically write bytes to a file.
///
/// Writes to a `<name>.tmp` sibling with fsync, then renames over the target.
/// The target is either fully written or unchanged.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written, synced,
/// or renamed. A failed rename leaves the target untouched.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    {
        let mut writer = BufWriter::new(&mut file);
        writer.write_all(contents)?;
        writer.flush()?;
    }

    file.sync_all()?;

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    Ok(())
}

/// How hard [`FileLock::try_acquire_with`] tries before reporting the lock busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Total number of try-lock attempts (at least one is always made).
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl LockPolicy {
    /// A single attempt with no retries.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }
}

/// Entry in [`HELD_LOCKS`], removed when dropped.
struct Registration(PathBuf);

impl Registration {
    fn claim(path: &Path) -> Option<Self> {
        let mut held = HELD_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
        if held.insert(path.to_path_buf()) {
            Some(Self(path.to_path_buf()))
        } else {
            None
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut held = HELD_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.0);
    }
}

/// RAII advisory lock using fs2 exclusive locking.
///
/// The lock file is created on acquire and removed on drop (while the lock is
/// still held), so it only exists while someone holds it. A leftover lock file
/// that nobody holds is an orphan from a crashed process; see
/// [`remove_if_orphaned`].
pub struct FileLock {
    file: File,
    lock_path: PathBuf,
    _registration: Registration,
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl FileLock {
    /// Make one non-blocking attempt to lock `lock_path`.
    ///
    /// Returns `Ok(Some(FileLock))` if the lock was acquired, `Ok(None)` if it
    /// is held elsewhere (another process or another thread of this one), or
    /// `Err` on I/O error.
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let Some(registration) = Registration::claim(lock_path) else {
            return Ok(None);
        };

        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => return Err(e),
        }

        // The previous holder may have unlinked the file between our open and
        // our lock; in that case we hold a lock nobody else can see.
        if !still_linked(&file, lock_path)? {
            let _ = FileExt::unlock(&file);
            return Ok(None);
        }

        Ok(Some(Self {
            file,
            lock_path: lock_path.to_path_buf(),
            _registration: registration,
        }))
    }

    /// Try to acquire `lock_path` up to `policy.attempts` times.
    ///
    /// Never blocks beyond `attempts * retry_delay`.
    pub fn try_acquire_with(lock_path: &Path, policy: LockPolicy) -> io::Result<Option<Self>> {
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(lock) = Self::try_acquire(lock_path)? {
                log::debug!("acquired {} (attempt {})", lock_path.display(), attempt);
                return Ok(Some(lock));
            }
            if attempt < attempts && !policy.retry_delay.is_zero() {
                thread::sleep(policy.retry_delay);
            }
        }
        log::debug!("{} busy after {} attempt(s)", lock_path.display(), attempts);
        Ok(None)
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlink first so that nobody can lock this inode after we release it.
        let _ = fs::remove_file(&self.lock_path);
        let _ = FileExt::unlock(&self.file);
    }
}

/// Remove `lock_path` if it exists but nobody holds it.
///
/// Returns `Ok(true)` if an orphaned lock file was removed, `Ok(false)` if the
/// file is absent or currently held.
pub fn remove_if_orphaned(lock_path: &Path) -> io::Result<bool> {
    if !lock_path.exists() {
        return Ok(false);
    }
    match FileLock::try_acquire(lock_path)? {
        // Dropping the guard removes the file.
        Some(lock) => {
            drop(lock);
            Ok(true)
        }
        None => Ok(false),
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}
