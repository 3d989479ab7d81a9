// effort: CLI frontend for effort-core
// Argument parsing, root resolution, exit codes

mod cli;
mod output;

use clap::Parser;
use cli::{Cli, Command, CounterAction};
use effort_core::{LifecycleState, NewItem, Tracker};
use output::OutputHandler;
use std::process::ExitCode;
use std::sync::Arc;

/// `EX_TEMPFAIL`: a lock was busy and the command can be retried.
const EXIT_BUSY: u8 = 75;

fn run(cli: Cli, output: Arc<OutputHandler>) -> effort_core::Result<()> {
    let root = cli.resolve_root()?;
    log::debug!("project root: {}", root.display());
    let tracker = Tracker::open(root, output.clone())?;

    match cli.command {
        Command::New {
            title,
            priority,
            assignee,
            due,
            tags,
        } => {
            let entry = tracker.create_item(NewItem {
                title,
                priority,
                assignee,
                due_date: due,
                tags,
            })?;
            output.emit_result(&entry.filename);
        }
        Command::List { state } => {
            output.emit_entries(&tracker.query(state));
        }
        Command::Move { file, from, to } => {
            tracker.transitions().move_item(&file, &from, &to)?;
            output.emit_result(&format!("{}: {} -> {}", file, from.trim(), to.trim()));
        }
        Command::Complete { file } => {
            let dest = tracker.set_state(&file, LifecycleState::Completed)?;
            output.emit_result(&dest.display().to_string());
        }
        Command::Archive { file } => {
            let dest = tracker.set_state(&file, LifecycleState::Archived)?;
            output.emit_result(&dest.display().to_string());
        }
        Command::Counter { action } => {
            let counter = tracker.counter();
            match action {
                CounterAction::Peek => output.emit_result(&counter.peek()?.to_string()),
                CounterAction::Next => output.emit_result(&counter.get_next()?.to_string()),
                CounterAction::Init { value } => {
                    counter.initialize(value)?;
                    output.emit_result(&format!("counter set to {}", value));
                }
                CounterAction::Reset => {
                    counter.reset()?;
                    output.emit_result("counter reset to 1");
                }
                CounterAction::Seed => {
                    let next = counter.initialize_from_existing_items(tracker.dirs())?;
                    output.emit_result(&format!("counter set to {}", next));
                }
            }
        }
        // Opening the tracker already ran the pass.
        Command::Reconcile => {
            output.emit_result(&tracker.startup_report().to_string());
        }
        Command::Format { value } => {
            output.emit_result(&tracker.counter().format(value));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("EFFORT_LOG", "warn")).init();

    let cli = Cli::parse();
    let output = Arc::new(OutputHandler::new(cli.verbose));

    match run(cli, output.clone()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output.error(&e);
            if e.is_busy() {
                ExitCode::from(EXIT_BUSY)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
