//! Output handling for the CLI.
//!
//! Results go to stdout; events and errors go to stderr as `[effort] ...`
//! lines. `OutputHandler` is also the `EventSink` handed to the core.

use effort_core::{EffortError, EffortEvent, EventSink, IndexEntry, RepairSource};

/// CLI output handler: results to stdout, diagnostics to stderr.
#[derive(Default)]
pub struct OutputHandler {
    verbose: bool,
}

impl OutputHandler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn emit_result(&self, content: &str) {
        println!("{}", content);
    }

    pub fn emit_entries(&self, entries: &[IndexEntry]) {
        for entry in entries {
            let title = entry.metadata.title.as_deref().unwrap_or("");
            self.emit_result(&format!("{:<10} {}  {}", entry.state.as_ref(), entry.filename, title));
        }
    }

    pub fn error(&self, err: &EffortError) {
        eprintln!("[effort] error: {}", err);
    }
}

/// Events shown only with `--verbose`.
fn is_verbose_only(event: &EffortEvent) -> bool {
    matches!(
        event,
        EffortEvent::CounterSeeded { .. }
            | EffortEvent::TempFileRemoved { .. }
            | EffortEvent::IndexRefreshed { .. }
            | EffortEvent::StatusChanged { .. }
    )
}

fn describe(event: &EffortEvent) -> String {
    match event {
        EffortEvent::CounterSeeded { current, max_found } => match max_found {
            Some(max) => format!("counter seeded at {} (highest existing item {})", current, max),
            None => format!("counter started at {}", current),
        },
        EffortEvent::CounterRepaired { source, current } => {
            let from = match source {
                RepairSource::Backup => "backup",
                RepairSource::Default => "safe default",
            };
            format!("counter record was corrupt; restored from {} (next {})", from, current)
        }
        EffortEvent::StatusChanged { filename, from, to } => {
            format!("{}: {} -> {}", filename, from, to)
        }
        EffortEvent::JournalReplayed { filename, to } => {
            format!("finished interrupted move of {} to {}", filename, to)
        }
        EffortEvent::DuplicateResolved {
            filename,
            kept,
            removed,
        } => {
            let removed: Vec<&str> = removed.iter().map(|s| s.as_ref()).collect();
            format!(
                "{} was duplicated; kept {} copy, removed {}",
                filename,
                kept,
                removed.join(", ")
            )
        }
        EffortEvent::OrphanLockRemoved { path } => {
            format!("removed stale lock {}", path.display())
        }
        EffortEvent::TempFileRemoved { path } => {
            format!("removed leftover {}", path.display())
        }
        EffortEvent::StatusRepaired {
            filename,
            header,
            directory,
        } => format!(
            "{}: header status {} corrected to {}",
            filename,
            header.as_deref().unwrap_or("(none)"),
            directory
        ),
        EffortEvent::IndexRefreshed {
            added,
            updated,
            removed,
        } => format!(
            "index refreshed: {} added, {} updated, {} removed",
            added, updated, removed
        ),
    }
}

impl EventSink for OutputHandler {
    fn emit(&self, event: EffortEvent) {
        if is_verbose_only(&event) && !self.verbose {
            return;
        }
        eprintln!("[effort] {}", describe(&event));
    }
}
