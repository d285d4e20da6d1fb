//! Content-addressed index of the target tree.
//!
//! # Overview
//!
//! [`ContentIndex::build`] walks the target, prunes the cache of vanished
//! paths, reuses cached digests whose mtime still matches, hashes the rest
//! in parallel, and files every path under its digest.
//!
//! Within a digest bucket, paths keep the walk order. The reconciler takes
//! move candidates from the front of a bucket, so the first file discovered
//! with a given content is the first one relocated.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use thiserror::Error;

use crate::cache::{CacheError, HashCache};
use crate::progress::{ProgressCallback, PHASE_INDEX};
use crate::scanner::{Digest, FileEntry, HashError, Hasher, ScanError, Walker, WalkerConfig};

/// Errors that abort index construction.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The cache could not be committed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The hashing thread pool could not be created.
    #[error("failed to create hashing thread pool: {0}")]
    ThreadPool(String),

    /// A shutdown was requested while indexing.
    #[error("indexing interrupted")]
    Interrupted,
}

/// Options for building the index.
#[derive(Clone, Default)]
pub struct IndexOptions {
    /// Walk configuration for the target tree.
    pub walker: WalkerConfig,
    /// Number of hashing threads (0 means rayon's default).
    pub io_threads: usize,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexOptions")
            .field("walker", &self.walker)
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl IndexOptions {
    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the number of hashing threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    /// Set the shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from building the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Regular files found in the target
    pub files: usize,
    /// Digests reused from the cache
    pub cache_hits: usize,
    /// Files hashed because the cache had no fresh entry
    pub hashed: usize,
    /// Bytes read while hashing
    pub bytes_hashed: u64,
    /// Stale cache entries removed
    pub pruned: usize,
    /// Files that disappeared between walk and hash
    pub vanished: usize,
    /// Files that could not be read or walked
    pub failed: usize,
    /// Wall time of the build
    pub duration: Duration,
}

/// Mapping from content digest to the target paths holding it.
#[derive(Debug, Clone, Default)]
pub struct ContentIndex {
    buckets: HashMap<Digest, VecDeque<String>>,
    by_path: HashMap<String, Digest>,
}

impl ContentIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index for `root`, refreshing `cache` along the way.
    ///
    /// The cache is pruned before any lookup and committed once at the end.
    ///
    /// # Errors
    ///
    /// Fails if the cache cannot be committed, the thread pool cannot be
    /// created, or a shutdown is requested. Unreadable or vanished files are
    /// skipped and counted in [`IndexStats`].
    pub fn build(
        root: &Path,
        cache: &mut HashCache,
        hasher: &Hasher,
        options: &IndexOptions,
    ) -> Result<(Self, IndexStats), IndexError> {
        let started = Instant::now();
        let mut stats = IndexStats::default();

        let mut walker = Walker::new(root, options.walker.clone());
        if let Some(flag) = &options.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let mut files: Vec<FileEntry> = Vec::new();
        if root.exists() {
            for result in walker.walk() {
                match result {
                    Ok(file) => files.push(file),
                    Err(ScanError::NotFound(path)) => {
                        log::debug!("Vanished during walk: {}", path.display());
                        stats.vanished += 1;
                    }
                    Err(e) => {
                        log::warn!("Skipping unreadable target entry: {}", e);
                        stats.failed += 1;
                    }
                }
            }
        } else {
            log::debug!("Target {} does not exist yet", root.display());
        }

        if options.is_shutdown_requested() {
            return Err(IndexError::Interrupted);
        }

        stats.files = files.len();
        let existing: HashSet<String> = files.iter().map(|f| f.relative.clone()).collect();
        stats.pruned = cache.prune(&existing);
        if stats.pruned > 0 {
            log::info!("Pruned {} stale cache entries", stats.pruned);
        }

        let cached: Vec<Option<Digest>> = files
            .iter()
            .map(|file| {
                cache
                    .lookup(&file.relative)
                    .filter(|entry| entry.is_fresh(file.modified))
                    .map(|entry| entry.digest.clone())
            })
            .collect();

        if let Some(ref callback) = options.progress_callback {
            callback.on_phase_start(PHASE_INDEX, files.len());
        }

        let resolved = Self::resolve_digests(files, cached, hasher, options)?;

        if let Some(ref callback) = options.progress_callback {
            callback.on_phase_end(PHASE_INDEX);
        }

        let mut index = Self::new();
        for (file, result, from_cache) in resolved {
            match result {
                Ok(digest) => {
                    if from_cache {
                        log::trace!("Cache hit: {}", file.relative);
                        stats.cache_hits += 1;
                    } else {
                        log::trace!("Hashed {} -> {}", file.relative, digest.short());
                        stats.hashed += 1;
                        stats.bytes_hashed += file.size;
                        cache.put(&file.relative, file.modified, digest.clone());
                    }
                    index.push(digest, file.relative);
                }
                Err(HashError::NotFound(_)) => {
                    log::debug!("Vanished before hashing: {}", file.path.display());
                    cache.delete(&file.relative);
                    stats.vanished += 1;
                }
                Err(e) => {
                    log::warn!("Failed to hash {}: {}", file.path.display(), e);
                    cache.delete(&file.relative);
                    stats.failed += 1;
                }
            }
        }

        cache.commit()?;

        if options.is_shutdown_requested() {
            return Err(IndexError::Interrupted);
        }

        stats.duration = started.elapsed();
        log::debug!(
            "Indexed {} files ({} cached, {} hashed) into {} digests",
            stats.files,
            stats.cache_hits,
            stats.hashed,
            index.digest_count()
        );
        Ok((index, stats))
    }

    /// Hash cache misses in parallel; output order equals input order.
    #[allow(clippy::type_complexity)]
    fn resolve_digests(
        files: Vec<FileEntry>,
        cached: Vec<Option<Digest>>,
        hasher: &Hasher,
        options: &IndexOptions,
    ) -> Result<Vec<(FileEntry, Result<Digest, HashError>, bool)>, IndexError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if options.io_threads > 0 {
            builder = builder.num_threads(options.io_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| IndexError::ThreadPool(e.to_string()))?;

        Ok(pool.install(|| {
            files
                .into_par_iter()
                .zip(cached.into_par_iter())
                .enumerate()
                .map(|(idx, (file, cached))| {
                    if let Some(ref callback) = options.progress_callback {
                        callback.on_progress(idx + 1, &file.relative);
                    }
                    match cached {
                        Some(digest) => (file, Ok(digest), true),
                        None if options.is_shutdown_requested() => {
                            let err = HashError::Interrupted(file.path.clone());
                            (file, Err(err), false)
                        }
                        None => {
                            let result = hasher.hash_file(&file.path);
                            (file, result, false)
                        }
                    }
                })
                .collect()
        }))
    }

    /// Append `path` to the bucket of `digest`.
    ///
    /// A path already indexed under another digest is moved to the new one.
    pub fn push(&mut self, digest: Digest, path: String) {
        if self.by_path.contains_key(&path) {
            self.remove_path(&path);
        }
        self.buckets
            .entry(digest.clone())
            .or_default()
            .push_back(path.clone());
        self.by_path.insert(path, digest);
    }

    /// First candidate path for `digest`.
    #[must_use]
    pub fn front(&self, digest: &Digest) -> Option<&str> {
        self.buckets
            .get(digest)
            .and_then(VecDeque::front)
            .map(String::as_str)
    }

    /// Remove and return the first candidate for `digest`.
    pub fn pop_front(&mut self, digest: &Digest) -> Option<String> {
        let bucket = self.buckets.get_mut(digest)?;
        let path = bucket.pop_front()?;
        if bucket.is_empty() {
            self.buckets.remove(digest);
        }
        self.by_path.remove(&path);
        Some(path)
    }

    /// Whether `path` is indexed under `digest`.
    #[must_use]
    pub fn contains(&self, digest: &Digest, path: &str) -> bool {
        self.by_path.get(path) == Some(digest)
    }

    /// Digest currently recorded for `path`.
    #[must_use]
    pub fn digest_of(&self, path: &str) -> Option<&Digest> {
        self.by_path.get(path)
    }

    /// Remove `path` from whichever bucket holds it.
    pub fn remove_path(&mut self, path: &str) -> Option<Digest> {
        let digest = self.by_path.remove(path)?;
        if let Some(bucket) = self.buckets.get_mut(&digest) {
            if let Some(pos) = bucket.iter().position(|p| p == path) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                self.buckets.remove(&digest);
            }
        }
        Some(digest)
    }

    /// Candidate paths for `digest`, in consumption order.
    pub fn candidates(&self, digest: &Digest) -> impl Iterator<Item = &str> {
        self.buckets
            .get(digest)
            .into_iter()
            .flat_map(|bucket| bucket.iter().map(String::as_str))
    }

    /// Number of indexed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether no path is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Number of distinct digests.
    #[must_use]
    pub fn digest_count(&self) -> usize {
        self.buckets.len()
    }
}
