//! Seeding a fresh counter from work items that already exist on disk.

use crate::work_item::StateDirs;
use regex::Regex;
use std::fs;
use std::io;
use std::sync::LazyLock;

/// A run of digits at the very start of the name, immediately followed by `_`.
/// An optional `YYYYMMDD-` date prefix (see [`super::format_dated`]) is skipped.
static SEQUENCE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{8}-)?(\d+)_").expect("valid regex"));

/// The sequence number a name starts with, if any.
///
/// Digits elsewhere in the name (`task_1678912345_c.md`) are not a prefix
/// and are ignored.
pub fn sequence_prefix(name: &str) -> Option<u64> {
    SEQUENCE_PREFIX
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Highest sequence prefix across every lifecycle directory.
pub fn max_existing_number(dirs: &StateDirs) -> io::Result<Option<u64>> {
    let mut max = None;
    for (_, dir) in dirs.iter() {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(n) = sequence_prefix(&name) {
                max = max.max(Some(n));
            }
        }
    }
    Ok(max)
}
