use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use devsweep::cleaner::{Cleaner, CleanerOptions, SizeEstimate, Strategy};
use devsweep::cleaners::TempFilesCleaner;
use devsweep::common::exec::Context;
use tempfile::TempDir;

const HOUR: Duration = Duration::from_secs(3600);

fn write_aged(path: &Path, bytes: usize, age: Duration) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, vec![0u8; bytes]).unwrap();
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

fn cleaner(root: &Path, dry_run: bool, excludes: Vec<PathBuf>) -> TempFilesCleaner {
    TempFilesCleaner::new(
        CleanerOptions::new(false, dry_run),
        "24h",
        excludes,
        vec![root.to_path_buf()],
    )
    .unwrap()
}

fn paths(c: &TempFilesCleaner) -> Vec<String> {
    let mut p: Vec<String> = c
        .scan(&Context::background())
        .unwrap()
        .into_iter()
        .map(|i| i.path)
        .collect();
    p.sort();
    p
}

#[test]
fn test_age_filter_scan_and_clean() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("old");
    let recent = dir.path().join("recent");
    write_aged(&old, 100, 48 * HOUR);
    write_aged(&recent, 100, HOUR);

    let c = cleaner(dir.path(), false, Vec::new());
    assert_eq!(paths(&c), vec![old.to_string_lossy().into_owned()]);

    let result = c.clean(&Context::background()).unwrap();
    assert_eq!(result.items_removed, 1);
    assert_eq!(result.size_estimate, SizeEstimate::known(100));
    assert_eq!(result.strategy, Strategy::Conservative);
    assert!(!old.exists());
    assert!(recent.exists());
}

#[test]
fn test_dry_run_does_not_delete() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("nested/old.tmp");
    write_aged(&old, 40, 72 * HOUR);

    let result = cleaner(dir.path(), true, Vec::new())
        .clean(&Context::background())
        .unwrap();
    assert!(result.is_dry_run());
    assert_eq!(result.items_removed, 1);
    assert_eq!(result.size_estimate, SizeEstimate::known(40));
    assert!(old.exists());
    result.validate().unwrap();
}

#[test]
fn test_excluded_prefix_is_never_touched() {
    let dir = TempDir::new().unwrap();
    let keep = dir.path().join("keep");
    let kept = keep.join("a/b.log");
    let sibling = dir.path().join("keeper/c.log");
    write_aged(&kept, 10, 48 * HOUR);
    write_aged(&sibling, 10, 48 * HOUR);

    let c = cleaner(dir.path(), false, vec![keep.clone()]);
    let found = paths(&c);
    assert_eq!(found, vec![sibling.to_string_lossy().into_owned()]);

    c.clean(&Context::background()).unwrap();
    assert!(kept.exists());
    assert!(!sibling.exists());
}

#[test]
fn test_second_clean_removes_nothing() {
    let dir = TempDir::new().unwrap();
    write_aged(&dir.path().join("a"), 10, 48 * HOUR);
    write_aged(&dir.path().join("b"), 20, 48 * HOUR);

    let c = cleaner(dir.path(), false, Vec::new());
    let first = c.clean(&Context::background()).unwrap();
    assert_eq!(first.items_removed, 2);

    let second = c.clean(&Context::background()).unwrap();
    assert_eq!(second.items_removed, 0);
    assert_eq!(second.size_estimate, SizeEstimate::known(0));
}

#[test]
fn test_repeated_scan_is_stable() {
    let dir = TempDir::new().unwrap();
    for name in ["x", "y/z", "y/w"] {
        write_aged(&dir.path().join(name), 5, 48 * HOUR);
    }
    let c = cleaner(dir.path(), true, Vec::new());
    assert_eq!(paths(&c), paths(&c));
    assert_eq!(paths(&c).len(), 3);
}

#[test]
fn test_missing_root_scans_empty() {
    let dir = TempDir::new().unwrap();
    let c = cleaner(&dir.path().join("does-not-exist"), false, Vec::new());
    assert!(paths(&c).is_empty());
    let result = c.clean(&Context::background()).unwrap();
    assert_eq!(result.items_removed, 0);
}

#[test]
fn test_invalid_duration_fails_at_construction() {
    let err = TempFilesCleaner::new(
        CleanerOptions::default(),
        "soon",
        Vec::new(),
        vec![PathBuf::from("/tmp")],
    )
    .unwrap_err();
    assert!(err.is(devsweep::common::errors::ErrorCode::InvalidFormat));
}
