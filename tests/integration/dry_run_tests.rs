use crate::integration::helpers::Fixture;
use relocase::error::ExitCode;
use std::fs;

#[test]
fn test_dry_run_changes_nothing() {
    let f = Fixture::with_files(
        &[("a.txt", "X"), ("b.txt", "new"), ("c.txt", "C")],
        &[("old/a.txt", "X"), ("b.txt", "old")],
    );
    let before = f.target_files();

    assert_eq!(f.run(&["--dry-run"]), ExitCode::Success);

    assert_eq!(f.target_files(), before);
    assert!(!f.db_path().exists());
}

#[test]
fn test_dry_run_leaves_existing_cache_untouched() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[("z.txt", "Z")]);
    f.run(&[]);
    let db_before = fs::read(f.db_path()).unwrap();

    f.write_source("b.txt", "B");
    fs::remove_file(f.target.join("z.txt")).unwrap();
    f.run(&["--dry-run", "--clear-cache"]);

    assert_eq!(fs::read(f.db_path()).unwrap(), db_before);
    assert!(f.open_cache().lookup("z.txt").is_some());
    assert!(!f.target.join("b.txt").exists());
}

#[test]
fn test_dry_run_does_not_create_missing_target() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    fs::remove_dir(&f.target).unwrap();

    assert_eq!(f.run(&["--dry-run"]), ExitCode::Success);

    assert!(!f.target.exists());
}

#[test]
fn test_real_run_creates_missing_target() {
    let f = Fixture::with_files(&[("dir/a.txt", "A")], &[]);
    fs::remove_dir(&f.target).unwrap();

    assert_eq!(f.run(&[]), ExitCode::Success);

    assert_eq!(f.read_target("dir/a.txt").as_deref(), Some("A"));
    f.assert_cache_coherent();
}
