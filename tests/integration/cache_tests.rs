use crate::integration::helpers::{digest, Fixture};
use relocase::cache::HashCache;
use relocase::error::ExitCode;
use relocase::scanner::{HashAlgorithm, Hasher, ReservedPaths, WalkerConfig};
use relocase::sync::{ContentIndex, IndexOptions};
use std::fs;

#[test]
fn test_run_persists_digests_for_the_whole_target() {
    let f = Fixture::with_files(&[("a.txt", "A"), ("b.txt", "B")], &[("extra.txt", "E")]);

    assert_eq!(f.run(&[]), ExitCode::Success);

    assert!(f.db_path().exists());
    f.assert_cache_coherent();
    let cache = f.open_cache();
    assert_eq!(cache.lookup("extra.txt").unwrap().digest, digest("E"));
}

#[test]
fn test_cached_digests_are_reused() {
    let f = Fixture::with_files(&[], &[("a.txt", "A"), ("b/c.txt", "C")]);
    f.run(&[]);

    let walker = WalkerConfig::default().with_reserved(ReservedPaths::for_database(&f.db_path()));
    let mut cache = f.open_cache();
    let (_, stats) = ContentIndex::build(
        &f.target,
        &mut cache,
        &Hasher::default(),
        &IndexOptions::default().with_walker(walker),
    )
    .unwrap();

    assert_eq!(stats.files, 2);
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.hashed, 0);
}

#[test]
fn test_deleted_target_files_are_pruned() {
    let f = Fixture::with_files(&[], &[("a.txt", "A"), ("gone.txt", "G")]);
    f.run(&[]);
    assert!(f.open_cache().lookup("gone.txt").is_some());

    fs::remove_file(f.target.join("gone.txt")).unwrap();
    f.run(&[]);

    let cache = f.open_cache();
    assert!(cache.lookup("gone.txt").is_none());
    assert!(cache.lookup("a.txt").is_some());
}

#[test]
fn test_modified_target_file_is_rehashed() {
    let f = Fixture::with_files(&[], &[("a.txt", "before")]);
    f.run(&[]);

    let path = f.target.join("a.txt");
    fs::write(&path, "after").unwrap();
    let later = filetime::FileTime::from_unix_time(4_000_000_000, 0);
    filetime::set_file_mtime(&path, later).unwrap();
    f.run(&[]);

    assert_eq!(f.open_cache().lookup("a.txt").unwrap().digest, digest("after"));
}

#[test]
fn test_algorithm_change_discards_old_digests() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    f.run(&[]);

    f.run(&["--algorithm", "sha256"]);

    let cache = HashCache::open(&f.db_path(), HashAlgorithm::Sha256).unwrap();
    assert_eq!(
        cache.lookup("a.txt").unwrap().digest,
        Hasher::new(HashAlgorithm::Sha256).hash_bytes(b"A")
    );
}

#[test]
fn test_clear_cache_forces_rehash() {
    let f = Fixture::with_files(&[], &[("a.txt", "A")]);
    f.run(&[]);
    f.run(&["--clear-cache"]);

    f.assert_cache_coherent();
}

#[test]
fn test_custom_db_name_is_never_synced() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    // A stray cache in the source must not be transferred.
    fs::write(f.source.join("hashes.db"), "not a file to sync").unwrap();

    assert_eq!(f.run(&["--db-name", "hashes.db"]), ExitCode::Success);

    assert!(f.target.join("hashes.db").exists());
    let cache = HashCache::open(&f.target.join("hashes.db"), HashAlgorithm::Blake3).unwrap();
    assert!(cache.lookup("a.txt").is_some());
    assert!(cache.lookup("hashes.db").is_none());
}

#[test]
fn test_corrupted_cache_is_reported() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    fs::write(f.db_path(), b"not a sqlite database").unwrap();

    assert!(HashCache::open(&f.db_path(), HashAlgorithm::Blake3).is_err());
    let err = relocase::run_app(f.cli(&[])).unwrap_err();
    assert!(format!("{err:#}").contains("failed to open cache"));
    assert!(!f.target.join("a.txt").exists());
}

#[test]
fn test_leftover_staged_copy_is_not_cached() {
    let f = Fixture::with_files(&[("a.txt", "A")], &[]);
    f.write_target("dir/.relocase-Qz81aB.partial", "half a copy");

    assert_eq!(f.run(&[]), ExitCode::Success);

    let cache = f.open_cache();
    assert!(cache.lookup("dir/.relocase-Qz81aB.partial").is_none());
    assert!(cache.lookup("a.txt").is_some());
    assert_eq!(cache.len(), 1);
}
