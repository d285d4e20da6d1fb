use clap::Parser;
use relocase::actions::NativeExecutor;
use relocase::cache::HashCache;
use relocase::cli::Cli;
use relocase::error::ExitCode;
use relocase::scanner::path_utils::key_to_path;
use relocase::scanner::{HashAlgorithm, Hasher, ReservedPaths, Walker, WalkerConfig};
use relocase::sync::{ContentIndex, IndexOptions, ReconcileOptions, Reconciler, Step};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const DB_NAME: &str = ".relocase.db";

/// A source and a target tree inside one temporary directory.
pub struct Fixture {
    _dir: TempDir,
    pub source: PathBuf,
    pub target: PathBuf,
    pub config: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let target = dir.path().join("target");
        let config = dir.path().join("config.toml");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        // An empty file keeps the user's own config out of the tests.
        fs::write(&config, "").unwrap();
        Self {
            _dir: dir,
            source: source.canonicalize().unwrap(),
            target: target.canonicalize().unwrap(),
            config,
        }
    }

    pub fn with_files(source: &[(&str, &str)], target: &[(&str, &str)]) -> Self {
        let fixture = Self::new();
        for (key, content) in source {
            fixture.write_source(key, content);
        }
        for (key, content) in target {
            fixture.write_target(key, content);
        }
        fixture
    }

    pub fn write_source(&self, key: &str, content: &str) {
        write(&key_to_path(&self.source, key), content);
    }

    pub fn write_target(&self, key: &str, content: &str) {
        write(&key_to_path(&self.target, key), content);
    }

    pub fn read_target(&self, key: &str) -> Option<String> {
        fs::read_to_string(key_to_path(&self.target, key)).ok()
    }

    pub fn db_path(&self) -> PathBuf {
        self.target.join(DB_NAME)
    }

    /// Every file in the target (cache database excluded) with its content.
    pub fn target_files(&self) -> BTreeMap<String, String> {
        let config =
            WalkerConfig::default().with_reserved(ReservedPaths::for_database(&self.db_path()));
        Walker::new(&self.target, config)
            .walk()
            .map(|entry| {
                let entry = entry.unwrap();
                let content = fs::read_to_string(&entry.path).unwrap();
                (entry.relative, content)
            })
            .collect()
    }

    pub fn cli(&self, extra: &[&str]) -> Cli {
        let mut args: Vec<String> = vec![
            "relocase".into(),
            "--quiet".into(),
            "--no-progress".into(),
            "--config".into(),
            self.config.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| (*s).to_string()));
        args.push(self.source.display().to_string());
        args.push(self.target.display().to_string());
        Cli::parse_from(args)
    }

    pub fn run(&self, extra: &[&str]) -> ExitCode {
        relocase::run_app(self.cli(extra)).unwrap()
    }

    pub fn open_cache(&self) -> HashCache {
        HashCache::open(&self.db_path(), HashAlgorithm::Blake3).unwrap()
    }

    /// Run the engine directly against the persisted cache and collect
    /// every step.
    pub fn reconcile(&self, options: ReconcileOptions) -> Vec<Step> {
        let reserved = ReservedPaths::for_database(&self.db_path());
        let walker = WalkerConfig::default().with_reserved(reserved);
        let mut cache = self.open_cache();
        let (index, _) = ContentIndex::build(
            &self.target,
            &mut cache,
            &Hasher::default(),
            &IndexOptions::default().with_walker(walker.clone()),
        )
        .unwrap();
        let mut reconciler = Reconciler::new(
            &self.target,
            index,
            cache,
            Box::new(NativeExecutor::new()),
            Hasher::default(),
            options.with_walker(walker),
        );
        let steps = reconciler
            .reconcile(&self.source)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        reconciler.finish().close().unwrap();
        steps
    }

    /// Assert that every target file has a cache entry matching its content.
    pub fn assert_cache_coherent(&self) {
        let cache = self.open_cache();
        let files = self.target_files();
        for (key, content) in &files {
            let entry = cache
                .lookup(key)
                .unwrap_or_else(|| panic!("{key} missing from cache"));
            assert_eq!(entry.digest, digest(content), "stale digest for {key}");
        }
        assert_eq!(cache.len(), files.len());
    }
}

pub fn write(path: &std::path::Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn digest(content: &str) -> relocase::scanner::Digest {
    Hasher::new(HashAlgorithm::Blake3).hash_bytes(content.as_bytes())
}
