//! In-memory index of work items per lifecycle state.
//!
//! The index is a cache: it is rebuilt from a directory scan at startup,
//! updated by the transition engine, and refreshed against the filesystem on
//! demand. The filesystem always wins on divergence.

use crate::work_item::{LifecycleState, StateDirs, WorkItemMeta};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub filename: String,
    pub state: LifecycleState,
    pub path: PathBuf,
    pub metadata: WorkItemMeta,
    pub last_modified: DateTime<Utc>,
}

impl IndexEntry {
    /// Read `path` and build its entry. The body may be in any encoding.
    pub fn load(state: LifecycleState, path: &Path) -> io::Result<Self> {
        let content = fs::read(path)?;
        let modified = fs::metadata(path)?.modified()?;
        Ok(Self::from_content(state, path, &content, modified.into()))
    }

    pub fn from_content(
        state: LifecycleState,
        path: &Path,
        content: &[u8],
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            state,
            path: path.to_path_buf(),
            metadata: WorkItemMeta::from_bytes(content),
            last_modified,
        }
    }
}

/// Counts from [`WorkIndex::refresh`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl RefreshStats {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

impl fmt::Display for RefreshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added: {}, updated: {}, removed: {}",
            self.added, self.updated, self.removed
        )
    }
}

#[derive(Debug, Default, Clone)]
pub struct WorkIndex {
    states: BTreeMap<LifecycleState, BTreeMap<String, IndexEntry>>,
}

impl WorkIndex {
    /// Scan every lifecycle directory.
    pub fn rebuild(dirs: &StateDirs) -> io::Result<Self> {
        let mut index = WorkIndex::default();
        index.refresh(dirs)?;
        Ok(index)
    }

    /// Entries for one state, or for all states, ordered by state then filename.
    pub fn query(&self, state: Option<LifecycleState>) -> Vec<IndexEntry> {
        self.states
            .iter()
            .filter(|(s, _)| state.is_none_or(|wanted| wanted == **s))
            .flat_map(|(_, entries)| entries.values().cloned())
            .collect()
    }

    pub fn get(&self, state: LifecycleState, filename: &str) -> Option<&IndexEntry> {
        self.states.get(&state).and_then(|m| m.get(filename))
    }

    pub fn len(&self) -> usize {
        self.states.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&mut self, entry: IndexEntry) {
        self.states
            .entry(entry.state)
            .or_default()
            .insert(entry.filename.clone(), entry);
    }

    pub fn remove(&mut self, state: LifecycleState, filename: &str) -> Option<IndexEntry> {
        self.states.get_mut(&state).and_then(|m| m.remove(filename))
    }

    /// Drop `filename` from `from` and file `entry` under its new state.
    pub fn record_move(&mut self, filename: &str, from: LifecycleState, entry: IndexEntry) {
        self.remove(from, filename);
        self.insert(entry);
    }

    /// Bring the index in line with the filesystem.
    ///
    /// New files are added, vanished files dropped, and files whose
    /// modification time changed are re-read. A file that cannot be read is
    /// logged and left out; it does not stop the rest of the scan.
    pub fn refresh(&mut self, dirs: &StateDirs) -> io::Result<RefreshStats> {
        let mut stats = RefreshStats::default();

        for (state, _) in dirs.iter() {
            let on_disk = dirs.list(state)?;
            let entries = self.states.entry(state).or_default();

            let before = entries.len();
            entries.retain(|name, _| on_disk.binary_search(name).is_ok());
            stats.removed += before - entries.len();

            for name in on_disk {
                let path = dirs.path_of(state, &name);
                let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                    Ok(m) => DateTime::<Utc>::from(m),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        log::warn!("index: skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                let known = entries.get(&name).map(|e| e.last_modified);
                if known == Some(modified) {
                    continue;
                }
                let entry = match IndexEntry::load(state, &path) {
                    Ok(entry) => entry,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        log::warn!("index: skipping {}: {}", path.display(), e);
                        continue;
                    }
                };
                if known.is_some() {
                    stats.updated += 1;
                } else {
                    stats.added += 1;
                }
                entries.insert(name, entry);
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DirectoryNames;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn setup() -> (TempDir, StateDirs) {
        let temp = TempDir::new().unwrap();
        let dirs = StateDirs::new(temp.path(), &DirectoryNames::default());
        dirs.ensure_all().unwrap();
        (temp, dirs)
    }

    fn write_item(dirs: &StateDirs, state: LifecycleState, name: &str, title: &str) {
        let content = format!("---\ntitle: \"{title}\"\nstatus: \"{state}\"\n---\nbody\n");
        fs::write(dirs.path_of(state, name), content).unwrap();
    }

    #[test]
    fn test_rebuild_and_query() {
        let (_temp, dirs) = setup();
        write_item(&dirs, LifecycleState::Active, "0002_b.md", "B");
        write_item(&dirs, LifecycleState::Active, "0001_a.md", "A");
        write_item(&dirs, LifecycleState::Archived, "0003_c.md", "C");

        let index = WorkIndex::rebuild(&dirs).unwrap();
        assert_eq!(index.len(), 3);

        let active = index.query(Some(LifecycleState::Active));
        let names: Vec<_> = active.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["0001_a.md", "0002_b.md"]);
        assert_eq!(active[0].metadata.title.as_deref(), Some("A"));
        assert!(index.query(Some(LifecycleState::Completed)).is_empty());

        let all = index.query(None);
        assert_eq!(all.last().unwrap().state, LifecycleState::Archived);
    }

    #[test]
    fn test_record_move() {
        let (_temp, dirs) = setup();
        write_item(&dirs, LifecycleState::Active, "0001_a.md", "A");
        let mut index = WorkIndex::rebuild(&dirs).unwrap();

        let moved = IndexEntry::from_content(
            LifecycleState::Completed,
            &dirs.path_of(LifecycleState::Completed, "0001_a.md"),
            b"---\nstatus: completed\n---\n",
            Utc::now(),
        );
        index.record_move("0001_a.md", LifecycleState::Active, moved);

        assert!(index.get(LifecycleState::Active, "0001_a.md").is_none());
        assert_eq!(
            index
                .get(LifecycleState::Completed, "0001_a.md")
                .unwrap()
                .metadata
                .status
                .as_deref(),
            Some("completed")
        );
    }

    #[test]
    fn test_refresh_tracks_filesystem() {
        let (_temp, dirs) = setup();
        write_item(&dirs, LifecycleState::Active, "0001_a.md", "A");
        write_item(&dirs, LifecycleState::Active, "0002_b.md", "B");
        let mut index = WorkIndex::rebuild(&dirs).unwrap();

        fs::remove_file(dirs.path_of(LifecycleState::Active, "0002_b.md")).unwrap();
        write_item(&dirs, LifecycleState::Completed, "0003_c.md", "C");
        write_item(&dirs, LifecycleState::Active, "0001_a.md", "A2");
        // Force a visible mtime change regardless of filesystem granularity.
        let file = fs::File::options()
            .write(true)
            .open(dirs.path_of(LifecycleState::Active, "0001_a.md"))
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let stats = index.refresh(&dirs).unwrap();
        assert_eq!(
            stats,
            RefreshStats {
                added: 1,
                updated: 1,
                removed: 1,
            }
        );
        assert_eq!(
            index
                .get(LifecycleState::Active, "0001_a.md")
                .unwrap()
                .metadata
                .title
                .as_deref(),
            Some("A2")
        );

        assert!(index.refresh(&dirs).unwrap().is_empty());
    }
}
