//! Events reported by the core and the sink that receives them.
//!
//! Components never print; they hand [`EffortEvent`]s to an injected
//! [`EventSink`] and the client decides what to show.

use crate::work_item::LifecycleState;
use std::path::PathBuf;

/// Where a repaired counter record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairSource {
    /// A verified `.bak` copy was adopted.
    Backup,
    /// No valid backup existed; a forward-only default was computed.
    Default,
}

/// Semantic events emitted by the counter, transition engine and reconciler.
///
/// Core emits all variants unconditionally; clients decide which to display
/// and how to format them. Verbose-tier events are shown only when the client
/// has verbose mode enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffortEvent {
    /// Counter record set by scanning existing work items (verbose-tier).
    CounterSeeded { current: u64, max_found: Option<u64> },
    /// Counter record failed its integrity check and was repaired.
    CounterRepaired { source: RepairSource, current: u64 },
    /// A work item moved between lifecycle directories.
    StatusChanged {
        filename: String,
        from: LifecycleState,
        to: LifecycleState,
    },
    /// A half-finished transition was completed from its journal entry.
    JournalReplayed {
        filename: String,
        to: LifecycleState,
    },
    /// The same work item existed in several directories; stale copies removed.
    DuplicateResolved {
        filename: String,
        kept: LifecycleState,
        removed: Vec<LifecycleState>,
    },
    /// A lock file nobody held was removed.
    OrphanLockRemoved { path: PathBuf },
    /// A leftover temporary file from an interrupted write was removed (verbose-tier).
    TempFileRemoved { path: PathBuf },
    /// A header `status` disagreeing with its directory was rewritten.
    StatusRepaired {
        filename: String,
        header: Option<String>,
        directory: LifecycleState,
    },
    /// Index refreshed against the filesystem (verbose-tier).
    IndexRefreshed {
        added: usize,
        updated: usize,
        removed: usize,
    },
}

/// Observer injected into every component.
///
/// The CLI implements this by printing to stderr; library callers can forward
/// events to a UI for refreshes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EffortEvent);
}

/// A no-op sink for call sites that don't need notifications.
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _: EffortEvent) {}
}

/// A capturing sink for tests; collects events for assertions.
#[cfg(test)]
pub(crate) struct CaptureSink {
    pub events: std::sync::Mutex<Vec<EffortEvent>>,
}

#[cfg(test)]
impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: std::sync::Mutex::new(vec![]),
        }
    }

    pub fn events(&self) -> Vec<EffortEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl EventSink for CaptureSink {
    fn emit(&self, event: EffortEvent) {
        self.events.lock().unwrap().push(event);
    }
}
