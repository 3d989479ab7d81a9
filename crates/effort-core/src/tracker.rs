//! Project facade tying the counter, transition engine and index together.

use crate::config::Config;
use crate::counter::CounterService;
use crate::error::{EffortError, Result, TransitionError};
use crate::index::{IndexEntry, RefreshStats, WorkIndex};
use crate::journal::Journal;
use crate::output::EventSink;
use crate::reconcile::{ReconcileReport, reconcile};
use crate::safe_io::{FileLock, LockPolicy, atomic_write, lock_path_for};
use crate::transition::TransitionEngine;
use crate::work_item::{
    DATE_FORMAT, LifecycleState, Priority, StateDirs, WorkItemHeader, now_timestamp,
    validate_filename,
};
use chrono::{Days, Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest slug taken from a title.
const MAX_SLUG_LEN: usize = 48;

/// Request for [`Tracker::create_item`]. Unset fields use the config defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

pub struct Tracker {
    root: PathBuf,
    config: Config,
    dirs: StateDirs,
    journal: Journal,
    policy: LockPolicy,
    counter: CounterService,
    transitions: TransitionEngine,
    sink: Arc<dyn EventSink>,
    startup_report: ReconcileReport,
}

impl Tracker {
    /// Open the project at `root`, reading `effort.toml` if present.
    pub fn open(root: impl Into<PathBuf>, sink: Arc<dyn EventSink>) -> Result<Self> {
        let root = root.into();
        let config = Config::load(&root)?;
        Self::with_config(root, config, sink)
    }

    /// Open with an explicit configuration.
    ///
    /// Creates the lifecycle directories, reconciles leftovers from
    /// interrupted runs, then builds the index.
    pub fn with_config(root: PathBuf, config: Config, sink: Arc<dyn EventSink>) -> Result<Self> {
        let dirs = StateDirs::new(&root, &config.directories);
        dirs.ensure_all()?;
        let journal = Journal::new(config.journal_path(&root));
        let counter_path = config.counter_path(&root);
        let policy = config.lock.policy();

        let startup_report = reconcile(&dirs, &journal, &counter_path, policy, sink.as_ref())?;
        let index = WorkIndex::rebuild(&dirs)?;

        let counter = CounterService::new(counter_path, Arc::clone(&sink))
            .with_seed_dirs(dirs.clone())
            .with_width(config.number_width)
            .with_date_prefix(config.date_prefix)
            .with_lock_policy(policy);
        let transitions =
            TransitionEngine::new(dirs.clone(), journal.clone(), index, Arc::clone(&sink))
                .with_lock_policy(policy);

        log::debug!("opened project at {}", root.display());
        Ok(Self {
            root,
            config,
            dirs,
            journal,
            policy,
            counter,
            transitions,
            sink,
            startup_report,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dirs(&self) -> &StateDirs {
        &self.dirs
    }

    pub fn counter(&self) -> &CounterService {
        &self.counter
    }

    pub fn transitions(&self) -> &TransitionEngine {
        &self.transitions
    }

    /// What reconciliation repaired when the project was opened.
    pub fn startup_report(&self) -> ReconcileReport {
        self.startup_report
    }

    pub fn query(&self, state: Option<LifecycleState>) -> Vec<IndexEntry> {
        self.transitions.query(state)
    }

    pub fn refresh_index(&self) -> Result<RefreshStats> {
        Ok(self.transitions.refresh_index()?)
    }

    /// Run reconciliation again and re-sync the index with its results.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let report = reconcile(
            &self.dirs,
            &self.journal,
            &self.config.counter_path(&self.root),
            self.policy,
            self.sink.as_ref(),
        )?;
        self.transitions.refresh_index()?;
        Ok(report)
    }

    /// The lifecycle state whose directory currently holds `filename`.
    pub fn locate(&self, filename: &str) -> Option<LifecycleState> {
        LifecycleState::all().find(|state| self.dirs.path_of(*state, filename).is_file())
    }

    /// Move `filename` to `to` from wherever it currently is.
    pub fn set_state(&self, filename: &str, to: LifecycleState) -> Result<PathBuf> {
        validate_filename(filename)?;
        let from = self
            .locate(filename)
            .ok_or_else(|| TransitionError::NotFound {
                path: self.dirs.path_of(LifecycleState::Active, filename),
            })?;
        Ok(self.transitions.transition(filename, from, to)?)
    }

    /// Number, write and index a new work item in the active directory.
    pub fn create_item(&self, item: NewItem) -> Result<IndexEntry> {
        let number = self.counter.get_next_formatted()?;
        let filename = format!("{}_{}.md", number, slugify(&item.title));
        let path = self.dirs.path_of(LifecycleState::Active, &filename);

        let defaults = &self.config.defaults;
        let due = item.due_date.unwrap_or_else(|| {
            let today = Local::now().date_naive();
            today
                .checked_add_days(Days::new(u64::from(defaults.due_days)))
                .unwrap_or(today)
        });
        let now = now_timestamp();
        let header = WorkItemHeader {
            title: item.title.trim().to_string(),
            status: LifecycleState::Active,
            priority: item.priority.unwrap_or(defaults.priority),
            assignee: item.assignee.unwrap_or_else(|| defaults.assignee.clone()),
            created: now.clone(),
            last_updated: now,
            due_date: due.format(DATE_FORMAT).to_string(),
            tags: item.tags,
        };
        let content = format!("{}\n# {}\n", header.render(), header.title);

        // Holding the name in every directory keeps moves from racing the check.
        let _locks = LifecycleState::all()
            .map(|state| self.lock_item(&self.dirs.path_of(state, &filename)))
            .collect::<Result<Vec<_>>>()?;
        if let Some(state) = self.locate(&filename) {
            return Err(EffortError::ItemExists { filename, state });
        }
        atomic_write(&path, content.as_bytes()).map_err(|e| TransitionError::io(&path, e))?;

        log::info!("created {}", filename);
        Ok(self.transitions.track(LifecycleState::Active, &filename)?)
    }

    fn lock_item(&self, path: &Path) -> Result<FileLock> {
        let lock_path = lock_path_for(path);
        let lock = FileLock::try_acquire_with(&lock_path, self.policy)
            .map_err(|source| TransitionError::Io {
                path: lock_path.clone(),
                source,
            })?
            .ok_or(TransitionError::LockBusy { path: lock_path })?;
        Ok(lock)
    }
}

/// Filename-safe form of a title: lowercase ASCII alphanumerics joined by `_`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let mut slug = slug.trim_end_matches('_').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('_').to_string();
    }
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}
