//! Integration tests for CLI behavior
//!
//! These drive the built `effort` binary against a temporary project root
//! passed through `EFFORT_ROOT`, so they exercise root resolution, exit codes
//! and cross-process locking exactly as a shell user would.

use fs2::FileExt;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const EXIT_BUSY: i32 = 75;

fn effort(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_effort"))
        .args(args)
        .env("EFFORT_ROOT", root)
        .env_remove("EFFORT_LOG")
        .output()
        .expect("failed to run effort")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Run and require success, returning trimmed stdout.
fn effort_ok(root: &Path, args: &[&str]) -> String {
    let output = effort(root, args);
    assert!(
        output.status.success(),
        "effort {:?} failed: {}",
        args,
        stderr(&output)
    );
    stdout(&output)
}

#[test]
fn integration_help_flag() {
    let output = Command::new(env!("CARGO_BIN_EXE_effort"))
        .arg("--help")
        .output()
        .expect("failed to run effort");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("effort"));
    assert!(text.contains("Usage"));
    assert!(text.contains("counter"));
}

#[test]
fn integration_new_list_and_lifecycle() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    let first = effort_ok(root, &["new", "Write docs", "--tags", "docs,release"]);
    let second = effort_ok(root, &["new", "Fix login", "--priority", "critical"]);
    assert_eq!(first, "0001_write_docs.md");
    assert_eq!(second, "0002_fix_login.md");

    let content = fs::read_to_string(root.join("active").join(&second)).unwrap();
    assert!(content.contains("status: \"active\""));
    assert!(content.contains("priority: \"critical\""));

    effort_ok(root, &["complete", &first]);
    effort_ok(root, &["archive", &second]);

    let completed = effort_ok(root, &["list", "--state", "completed"]);
    assert!(completed.contains(&first));
    assert!(!completed.contains(&second));

    let all = effort_ok(root, &["list"]);
    assert!(all.contains("Write docs"));
    assert!(all.contains("Fix login"));

    let archived = fs::read_to_string(root.join("archived").join(&second)).unwrap();
    assert!(archived.contains("status: \"archived\""));
    assert!(!root.join("active").join(&second).exists());
}

#[test]
fn integration_move_round_trip_preserves_body() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let name = effort_ok(root, &["new", "Round trip"]);

    let path = root.join("active").join(&name);
    let mut original = fs::read_to_string(&path).unwrap();
    original.push_str("\nNotes with \"quotes\" and status: words in the body.\n");
    fs::write(&path, &original).unwrap();

    effort_ok(root, &["move", &name, "active", "completed"]);
    effort_ok(root, &["move", &name, "completed", "active"]);

    let restored = fs::read_to_string(&path).unwrap();
    assert!(restored.contains("status: \"active\""));
    let body = |s: &str| s.split_once("\n---\n").unwrap().1.to_string();
    assert_eq!(body(&restored), body(&original));
}

#[test]
fn integration_unknown_state_is_rejected_without_mutation() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let name = effort_ok(root, &["new", "Stay put"]);

    let output = effort(root, &["move", &name, "active", "done"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("unknown lifecycle state 'done'"));
    assert!(root.join("active").join(&name).exists());
}

#[test]
fn integration_counter_commands() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    assert_eq!(effort_ok(root, &["counter", "peek"]), "1");
    assert_eq!(effort_ok(root, &["counter", "next"]), "1");
    assert_eq!(effort_ok(root, &["counter", "peek"]), "2");

    effort_ok(root, &["counter", "init", "9999"]);
    assert_eq!(effort_ok(root, &["counter", "next"]), "9999");
    assert_eq!(effort_ok(root, &["new", "Big number"]), "10000_big_number.md");

    effort_ok(root, &["counter", "reset"]);
    assert_eq!(effort_ok(root, &["counter", "peek"]), "1");
    assert_eq!(effort_ok(root, &["counter", "seed"]), "counter set to 10001");

    let output = effort(root, &["counter", "init", "0"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn integration_format_follows_config() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();

    assert_eq!(effort_ok(root, &["format", "42"]), "0042");
    assert_eq!(effort_ok(root, &["format", "10000"]), "10000");

    fs::write(root.join("effort.toml"), "number_width = 6\n").unwrap();
    assert_eq!(effort_ok(root, &["format", "42"]), "000042");
}

#[test]
fn integration_root_flag_overrides_env() {
    let env_root = TempDir::new().unwrap();
    let flag_root = TempDir::new().unwrap();
    let flag = flag_root.path().to_string_lossy().to_string();

    effort_ok(env_root.path(), &["new", "Here", "--root", &flag]);
    assert!(flag_root.path().join("active").join("0001_here.md").exists());
    assert!(!env_root.path().join("active").join("0001_here.md").exists());
}

#[test]
fn integration_held_counter_lock_exits_busy() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    effort_ok(root, &["counter", "init", "5"]);

    let lock_path = root.join(".effort").join("counter.json.lock");
    let lock = fs::File::create(&lock_path).unwrap();
    lock.try_lock_exclusive().unwrap();

    let output = effort(root, &["counter", "next"]);
    assert_eq!(output.status.code(), Some(EXIT_BUSY));
    assert!(stderr(&output).contains("try again"));

    FileExt::unlock(&lock).unwrap();
    drop(lock);
    assert_eq!(effort_ok(root, &["counter", "next"]), "5");
}

#[test]
fn integration_concurrent_processes_get_distinct_numbers() {
    const PROCESSES: usize = 4;
    const PER_PROCESS: usize = 5;

    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    effort_ok(&root, &["counter", "reset"]);

    let handles: Vec<_> = (0..PROCESSES)
        .map(|_| {
            let root = root.clone();
            thread::spawn(move || {
                let mut values = Vec::new();
                while values.len() < PER_PROCESS {
                    let output = effort(&root, &["counter", "next"]);
                    match output.status.code() {
                        Some(0) => values.push(stdout(&output).parse::<u64>().unwrap()),
                        Some(EXIT_BUSY) => thread::sleep(Duration::from_millis(5)),
                        other => panic!("unexpected exit {:?}: {}", other, stderr(&output)),
                    }
                }
                values
            })
        })
        .collect();

    let values: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let unique: HashSet<u64> = values.iter().copied().collect();
    assert_eq!(unique.len(), PROCESSES * PER_PROCESS);
    assert_eq!(
        unique,
        (1..=(PROCESSES * PER_PROCESS) as u64).collect::<HashSet<_>>()
    );
    assert_eq!(
        effort_ok(&root, &["counter", "peek"]),
        (PROCESSES * PER_PROCESS + 1).to_string()
    );
}

#[test]
fn integration_reconcile_reports_repairs() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let name = effort_ok(root, &["new", "Crashed move"]);

    // Simulate a crash between writing the destination and deleting the source.
    let source = root.join("active").join(&name);
    fs::create_dir_all(root.join("completed")).unwrap();
    let content = fs::read_to_string(&source)
        .unwrap()
        .replace("status: \"active\"", "status: \"completed\"");
    fs::write(root.join("completed").join(&name), content).unwrap();
    let journal = root.join(".effort").join("journal");
    fs::create_dir_all(&journal).unwrap();
    fs::write(
        journal.join(format!("{name}.json")),
        format!(r#"{{"filename":"{name}","from":"active","to":"completed","started":0}}"#),
    )
    .unwrap();
    fs::write(root.join("active").join("stale.md.lock"), "").unwrap();

    let output = effort(root, &["reconcile"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let report = stdout(&output);
    assert!(report.contains("replayed: 1"), "{report}");
    assert!(report.contains("orphan locks: 1"), "{report}");
    assert!(stderr(&output).contains("[effort] removed stale lock"));

    assert!(!source.exists());
    assert!(root.join("completed").join(&name).exists());
    assert!(!root.join("active").join("stale.md.lock").exists());
}

#[test]
fn integration_new_refuses_to_reuse_a_taken_name() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let name = effort_ok(root, &["new", "Fix bug"]);
    let path = root.join("active").join(&name);
    let mut notes = fs::read(&path).unwrap();
    notes.extend_from_slice(b"\nroot cause: stale cache\n");
    fs::write(&path, &notes).unwrap();

    effort_ok(root, &["counter", "reset"]);
    let output = effort(root, &["new", "Fix bug"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("already exists"));
    assert_eq!(fs::read(&path).unwrap(), notes);

    effort_ok(root, &["counter", "seed"]);
    assert_eq!(effort_ok(root, &["new", "Fix bug"]), "0002_fix_bug.md");
}

#[test]
fn integration_non_utf8_item_still_moves() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("active")).unwrap();
    let mut content = b"---\ntitle: \"Legacy\"\nstatus: \"active\"\n---\n".to_vec();
    content.extend_from_slice(b"caf\xe9\n");
    fs::write(root.join("active").join("0009_legacy.md"), &content).unwrap();

    assert!(effort_ok(root, &["list"]).contains("Legacy"));
    effort_ok(root, &["complete", "0009_legacy.md"]);
    let moved = fs::read(root.join("completed").join("0009_legacy.md")).unwrap();
    assert!(moved.ends_with(b"caf\xe9\n"));
    assert_eq!(effort_ok(root, &["counter", "next"]), "10");
}
