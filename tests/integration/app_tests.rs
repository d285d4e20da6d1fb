use crate::integration::helpers::Fixture;
use clap::Parser;
use relocase::cli::Cli;
use relocase::error::{ExitCode, SyncError};
use std::fs;
use std::path::Path;

fn run_with(fixture: &Fixture, source: &Path, target: &Path) -> anyhow::Result<ExitCode> {
    let cli = Cli::parse_from([
        "relocase".to_string(),
        "--quiet".to_string(),
        "--config".to_string(),
        fixture.config.display().to_string(),
        source.display().to_string(),
        target.display().to_string(),
    ]);
    relocase::run_app(cli)
}

#[test]
fn test_missing_source_is_an_error() {
    let f = Fixture::new();
    let missing = f.source.join("nope");

    let err = run_with(&f, &missing, &f.target).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::SourceNotFound(_))
    ));
}

#[test]
fn test_nested_trees_are_rejected() {
    let f = Fixture::new();
    let inner = f.source.join("inner");
    fs::create_dir(&inner).unwrap();

    let err = run_with(&f, &f.source, &inner).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::OverlappingTrees { .. })
    ));

    let err = run_with(&f, &f.source, &f.source).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::SameTree(_))
    ));
}

#[test]
fn test_target_that_is_a_file_is_rejected() {
    let f = Fixture::new();
    let file = f.source.join("plain.txt");
    fs::write(&file, "x").unwrap();

    let err = run_with(&f, &f.target, &file).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::NotADirectory(_))
    ));
}

#[test]
fn test_invalid_db_name_is_rejected() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);

    let err = relocase::run_app(f.cli(&["--db-name", "nested/cache.db"])).unwrap_err();

    assert!(format!("{err:#}").contains("db_name"));
    assert!(!f.target.join("a.txt").exists());
}

#[test]
fn test_missing_config_file_is_an_error() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    fs::remove_file(&f.config).unwrap();

    assert!(relocase::run_app(f.cli(&[])).is_err());
}

#[test]
fn test_json_output_run_succeeds() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[("old/a.txt", "A")]);

    assert_eq!(f.run(&["--output", "json"]), ExitCode::Success);

    assert_eq!(f.read_target("a.txt").as_deref(), Some("A"));
}

#[test]
fn test_sha256_and_rsync_flags_parse() {
    let f = Fixture::new();
    let cli = f.cli(&[
        "--algorithm",
        "sha256",
        "--transfer",
        "rsync",
        "--overwrite",
        "keep",
    ]);

    assert!(cli.algorithm.is_some());
    assert!(cli.transfer.is_some());
    assert!(cli.overwrite.is_some());
}
