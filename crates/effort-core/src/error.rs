//! Error types for effort-core.
//!
//! Each component has its own error enum; [`EffortError`] unifies them for
//! the [`Tracker`](crate::Tracker) facade and the CLI.

use crate::work_item::LifecycleState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the counter store and counter service.
///
/// A missing or corrupt counter record is not an error: both are handled
/// inside the service (seeding and repair respectively).
#[derive(Error, Debug)]
pub enum CounterError {
    /// Another process or thread holds the counter lock.
    #[error("counter is locked by another process ({}); try again", path.display())]
    LockBusy { path: PathBuf },

    /// `initialize` was called with a value below 1.
    #[error("invalid initial counter value {0}: must be at least 1")]
    InvalidInitialValue(u64),

    /// The record was corrupt and the repaired record could not be persisted.
    #[error("failed to repair corrupt counter record at {}: {source}", path.display())]
    RepairFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("counter I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from the status transition engine.
#[derive(Error, Debug)]
pub enum TransitionError {
    /// The requested lifecycle state is not one of the known states.
    #[error("unknown lifecycle state '{0}' (expected active, completed or archived)")]
    InvalidState(String),

    /// The filename is empty or contains path components.
    #[error("invalid work item filename '{0}'")]
    InvalidFilename(String),

    /// Source and destination state are the same.
    #[error("work item is already {0}")]
    Unchanged(LifecycleState),

    #[error("work item not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Another process or thread holds the lock on the source or destination.
    #[error("work item is locked by another process ({}); try again", path.display())]
    LockBusy { path: PathBuf },

    #[error("transition I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TransitionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            TransitionError::NotFound { path }
        } else {
            TransitionError::Io { path, source }
        }
    }
}

/// Crate-level error returned by the facade.
#[derive(Error, Debug)]
pub enum EffortError {
    #[error(transparent)]
    Counter(#[from] CounterError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A new item's filename is already taken, usually because the counter
    /// was set back by hand.
    #[error(
        "work item {filename} already exists in {state}; the counter is behind existing items and needs reseeding"
    )]
    ItemExists {
        filename: String,
        state: LifecycleState,
    },

    /// The configuration file exists but could not be parsed.
    #[error("invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EffortError {
    /// Whether the operation failed only because a lock was held elsewhere.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            EffortError::Counter(CounterError::LockBusy { .. })
                | EffortError::Transition(TransitionError::LockBusy { .. })
        )
    }
}

pub type Result<T, E = EffortError> = std::result::Result<T, E>;
