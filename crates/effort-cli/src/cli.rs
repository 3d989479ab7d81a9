//! CLI argument parsing with clap.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use effort_core::{LifecycleState, Priority};
use std::path::PathBuf;

/// Environment variable naming the project root when `--root` is absent.
pub const ROOT_ENV: &str = "EFFORT_ROOT";

/// effort - numbered work items that move between lifecycle directories
#[derive(Parser, Debug)]
#[command(
    name = "effort",
    version,
    about = "Track numbered work items across active, completed and archived directories"
)]
pub struct Cli {
    /// Project root (default: $EFFORT_ROOT, then the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Show verbose events (seeding, temp file cleanup, index refreshes)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create a new numbered work item in the active directory
    New {
        title: String,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        assignee: Option<String>,
        /// Due date as YYYY-MM-DD
        #[arg(short, long, value_name = "DATE")]
        due: Option<NaiveDate>,
        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// List work items, optionally for one state
    List {
        #[arg(short, long)]
        state: Option<LifecycleState>,
    },

    /// Move a work item from one state to another
    Move { file: String, from: String, to: String },

    /// Move a work item to completed
    Complete { file: String },

    /// Move a work item to archived
    Archive { file: String },

    /// Inspect or administer the counter
    Counter {
        #[command(subcommand)]
        action: CounterAction,
    },

    /// Repair leftovers from interrupted runs
    Reconcile,

    /// Format a number the way new work items are numbered
    Format { value: u64 },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CounterAction {
    /// Show the next number without using it
    Peek,
    /// Take the next number
    Next,
    /// Force the next number
    Init { value: u64 },
    /// Start again from 1
    Reset,
    /// Set the next number past the highest existing item
    Seed,
}

impl Cli {
    /// The project root: `--root`, then `$EFFORT_ROOT`, then the current directory.
    pub fn resolve_root(&self) -> std::io::Result<PathBuf> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        match std::env::var_os(ROOT_ENV) {
            Some(root) if !root.is_empty() => Ok(PathBuf::from(root)),
            _ => std::env::current_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("effort").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_new_with_options() {
        let cli = parse(&[
            "new",
            "Fix login",
            "--priority",
            "high",
            "--due",
            "2026-12-01",
            "--tags",
            "auth,web",
        ]);
        assert_eq!(
            cli.command,
            Command::New {
                title: "Fix login".to_string(),
                priority: Some(Priority::High),
                assignee: None,
                due: NaiveDate::from_ymd_opt(2026, 12, 1),
                tags: vec!["auth".to_string(), "web".to_string()],
            }
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad = ["new", "x", "--priority", "urgent"];
        assert!(Cli::try_parse_from(std::iter::once("effort").chain(bad)).is_err());
        let bad = ["list", "--state", "done"];
        assert!(Cli::try_parse_from(std::iter::once("effort").chain(bad)).is_err());
    }

    #[test]
    fn test_move_keeps_state_names_raw() {
        let cli = parse(&["move", "0001_a.md", "active", "done"]);
        assert_eq!(
            cli.command,
            Command::Move {
                file: "0001_a.md".to_string(),
                from: "active".to_string(),
                to: "done".to_string(),
            }
        );
    }

    #[test]
    fn test_counter_actions_and_globals() {
        let cli = parse(&["counter", "init", "42", "--root", "/tmp/p", "-v"]);
        assert_eq!(
            cli.command,
            Command::Counter {
                action: CounterAction::Init { value: 42 }
            }
        );
        assert!(cli.verbose);
        assert_eq!(cli.resolve_root().unwrap(), PathBuf::from("/tmp/p"));
        assert_eq!(
            parse(&["list", "-s", "archived"]).command,
            Command::List {
                state: Some(LifecycleState::Archived)
            }
        );
    }
}
