//! effort-core: crash-safe numbering and lifecycle moves for file-based work items
//!
//! Each work item is a markdown file with a front matter header, living in the
//! directory of its lifecycle state (`active/`, `completed/`, `archived/`).
//! This crate provides the persistent counter that numbers new items, the
//! transition engine that moves them between directories, and the startup
//! reconciliation that repairs whatever an interrupted process left behind.
//!
//! # Quick Start
//!
//! For most uses, go through the [`Tracker`] facade:
//!
//! ```no_run
//! use std::sync::Arc;
//! use effort_core::{LifecycleState, NewItem, NoopSink, Tracker};
//!
//! fn main() -> effort_core::Result<()> {
//!     let tracker = Tracker::open("/path/to/project", Arc::new(NoopSink))?;
//!     let item = tracker.create_item(NewItem::new("Write the release notes"))?;
//!     tracker.set_state(&item.filename, LifecycleState::Completed)?;
//!     println!("next number: {}", tracker.counter().peek()?);
//!     Ok(())
//! }
//! ```
//!
//! For lower-level access, use the individual modules directly.

pub mod config;
pub mod counter;
pub mod error;
pub mod index;
pub mod journal;
pub mod output;
pub mod reconcile;
pub mod safe_io;
pub mod tracker;
pub mod transition;
pub mod work_item;

// Re-export the facade
pub use tracker::{NewItem, Tracker, slugify};

// Re-export commonly used types
pub use config::{CONFIG_FILE_NAME, Config};
pub use counter::{CounterService, format_count, format_dated};
pub use error::{CounterError, EffortError, Result, TransitionError};
pub use index::{IndexEntry, RefreshStats, WorkIndex};
pub use output::{EffortEvent, EventSink, NoopSink, RepairSource};
pub use reconcile::ReconcileReport;
pub use transition::TransitionEngine;
pub use work_item::{LifecycleState, Priority, StateDirs, WorkItemMeta};
