//! Per-file reconciliation of a source tree against the indexed target.
//!
//! # Overview
//!
//! For every source file the [`Reconciler`] looks its digest up in the
//! [`ContentIndex`] and picks one of four actions:
//!
//! | Target state                                   | Action                 |
//! |------------------------------------------------|------------------------|
//! | content already indexed at the same path       | skip                   |
//! | content indexed elsewhere, destination free    | move                   |
//! | content indexed elsewhere, destination taken   | conflict               |
//! | content not indexed                            | copy (or skip if same) |
//!
//! Each executed action is written to the cache and committed before the
//! next file is looked at, so an interrupted run leaves a cache that still
//! describes the tree.
//!
//! In a dry run the index is consumed exactly as in a real run and the
//! reconciler keeps track of the paths it would have vacated or filled, so
//! the reported plan is the one a real run would carry out.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::action::{Operation, Outcome, PendingAction, SkipReason, Step};
use super::index::ContentIndex;
use crate::actions::TransferExecutor;
use crate::cache::{CacheError, HashCache};
use crate::progress::{ProgressCallback, PHASE_RECONCILE};
use crate::scanner::path_utils::{backup_path, key_to_path, path_occupied, relative_key};
use crate::scanner::{Digest, FileEntry, Hasher, Walker, WalkerConfig};

/// What to do when a copy would replace a file with different content.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Atomically replace the destination
    #[default]
    Replace,
    /// Leave the destination alone and report a conflict
    Keep,
    /// Move the destination aside to `<name>.bak`, then copy
    Backup,
}

/// Options for a reconciliation pass.
#[derive(Clone, Default)]
pub struct ReconcileOptions {
    /// Report actions without touching the filesystem.
    pub dry_run: bool,
    /// Policy for replacing different content at the destination.
    pub overwrite: OverwritePolicy,
    /// Walk configuration for the source tree.
    pub walker: WalkerConfig,
    /// Optional shutdown flag; checked before every file.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ReconcileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileOptions")
            .field("dry_run", &self.dry_run)
            .field("overwrite", &self.overwrite)
            .field("walker", &self.walker)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl ReconcileOptions {
    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the overwrite policy.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the walker configuration for the source tree.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
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
}

/// Occupancy changes a dry run has reported but not performed.
#[derive(Debug, Default)]
struct PlannedTree {
    vacated: HashSet<String>,
    occupied: HashSet<String>,
}

impl PlannedTree {
    fn fill(&mut self, key: &str) {
        self.vacated.remove(key);
        self.occupied.insert(key.to_string());
    }

    fn vacate(&mut self, key: &str) {
        self.occupied.remove(key);
        self.vacated.insert(key.to_string());
    }
}

/// Decides and executes the action for each source file.
pub struct Reconciler {
    target_root: PathBuf,
    index: ContentIndex,
    cache: HashCache,
    executor: Box<dyn TransferExecutor>,
    hasher: Hasher,
    options: ReconcileOptions,
    planned: PlannedTree,
    walk_errors: usize,
    interrupted: bool,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("target_root", &self.target_root)
            .field("index", &self.index.len())
            .field("cache", &self.cache)
            .field("executor", &self.executor.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler for `target_root`.
    ///
    /// `index` and `cache` must describe the same tree; normally both come
    /// straight out of [`ContentIndex::build`].
    #[must_use]
    pub fn new(
        target_root: &Path,
        index: ContentIndex,
        cache: HashCache,
        executor: Box<dyn TransferExecutor>,
        hasher: Hasher,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
            index,
            cache,
            executor,
            hasher,
            options,
            planned: PlannedTree::default(),
            walk_errors: 0,
            interrupted: false,
        }
    }

    /// Walk `source_root` and return an iterator yielding one [`Step`] per
    /// source file.
    ///
    /// The source is enumerated up front; decisions are made lazily as the
    /// iterator is advanced. Entries the walk cannot read are logged and
    /// counted in [`Reconciler::walk_errors`].
    pub fn reconcile(&mut self, source_root: &Path) -> Reconcile<'_> {
        let mut walker = Walker::new(source_root, self.options.walker.clone());
        if let Some(flag) = &self.options.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let mut files = Vec::new();
        for result in walker.walk() {
            match result {
                Ok(file) => files.push(file),
                Err(e) => {
                    log::warn!("Skipping unreadable source entry: {}", e);
                    self.walk_errors += 1;
                }
            }
        }

        if let Some(ref callback) = self.options.progress_callback {
            callback.on_phase_start(PHASE_RECONCILE, files.len());
        }

        Reconcile {
            files: files.into_iter().enumerate(),
            reconciler: self,
            done: false,
        }
    }

    /// Root of the target tree.
    #[must_use]
    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// The index in its current (partly consumed) state.
    #[must_use]
    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    /// The cache in its current state.
    #[must_use]
    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Number of source entries the walk could not read.
    #[must_use]
    pub fn walk_errors(&self) -> usize {
        self.walk_errors
    }

    /// Whether the last pass stopped because of a shutdown request.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Consume the reconciler and hand back the cache.
    #[must_use]
    pub fn finish(self) -> HashCache {
        self.cache
    }

    fn is_shutdown_requested(&self) -> bool {
        self.options
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn is_occupied(&self, key: &str) -> bool {
        if self.planned.occupied.contains(key) {
            return true;
        }
        if self.planned.vacated.contains(key) {
            return false;
        }
        path_occupied(&key_to_path(&self.target_root, key))
    }

    /// Digest of whatever currently sits at `key` in the target.
    fn existing_digest(&self, key: &str) -> Option<Digest> {
        if let Some(digest) = self.index.digest_of(key) {
            return Some(digest.clone());
        }
        let path = key_to_path(&self.target_root, key);
        match self.hasher.hash_file(&path) {
            Ok(digest) => Some(digest),
            Err(e) => {
                log::debug!("Cannot hash existing {}: {}", path.display(), e);
                None
            }
        }
    }

    fn outcome_for_dry_run(&self) -> Outcome {
        if self.options.dry_run {
            Outcome::Planned
        } else {
            Outcome::Applied
        }
    }

    fn process(&mut self, file: &FileEntry) -> Result<Step, CacheError> {
        let key = file.relative.as_str();
        let dest = key_to_path(&self.target_root, key);

        let digest = match self.hasher.hash_file(&file.path) {
            Ok(digest) => digest,
            Err(e) => {
                log::warn!("Cannot read source {}: {}", file.path.display(), e);
                let action = PendingAction::Skip {
                    path: dest,
                    reason: SkipReason::Unreadable,
                };
                return Ok(Step::new(
                    file.path.clone(),
                    action,
                    Outcome::Failed(e.to_string()),
                    file.size,
                ));
            }
        };

        if self.index.contains(&digest, key) {
            self.index.remove_path(key);
            log::debug!("Already in place: {}", key);
            let action = PendingAction::Skip {
                path: dest,
                reason: SkipReason::AlreadyPlaced,
            };
            return Ok(Step::new(file.path.clone(), action, Outcome::Noop, file.size));
        }

        if self.index.front(&digest).is_some() {
            if self.is_occupied(key) {
                log::debug!("Move to occupied {} skipped", dest.display());
                let action = PendingAction::Conflict {
                    to: dest,
                    operation: Operation::Move,
                };
                return Ok(Step::new(file.path.clone(), action, Outcome::Noop, file.size));
            }
            if let Some(from_key) = self.index.pop_front(&digest) {
                return self.apply_move(file, &from_key, &digest);
            }
        }

        let mut backup = None;
        if self.is_occupied(key) {
            let existing = self.existing_digest(key);
            if existing.as_ref() == Some(&digest) {
                log::debug!("Identical content already at {}", dest.display());
                let action = PendingAction::Skip {
                    path: dest,
                    reason: SkipReason::Identical,
                };
                return Ok(Step::new(file.path.clone(), action, Outcome::Noop, file.size));
            }

            match self.options.overwrite {
                OverwritePolicy::Replace => {}
                OverwritePolicy::Keep => {
                    log::debug!("Keeping existing {}", dest.display());
                    let action = PendingAction::Conflict {
                        to: dest,
                        operation: Operation::Copy,
                    };
                    return Ok(Step::new(file.path.clone(), action, Outcome::Noop, file.size));
                }
                OverwritePolicy::Backup => backup = Some(existing),
            }
        }

        self.apply_copy(file, digest, backup)
    }

    fn apply_move(
        &mut self,
        file: &FileEntry,
        from_key: &str,
        digest: &Digest,
    ) -> Result<Step, CacheError> {
        let to_key = file.relative.as_str();
        let from = key_to_path(&self.target_root, from_key);
        let to = key_to_path(&self.target_root, to_key);
        let action = PendingAction::Move {
            from: from.clone(),
            to: to.clone(),
        };

        log::debug!("Move {} -> {}", from_key, to_key);
        if self.options.dry_run {
            self.planned.vacate(from_key);
            self.planned.fill(to_key);
            return Ok(Step::new(
                file.path.clone(),
                action,
                self.outcome_for_dry_run(),
                file.size,
            ));
        }

        match self.executor.move_file(&from, &to) {
            Ok(()) => {
                match modified(&to) {
                    Ok(mtime) => {
                        if !self.cache.rename(from_key, to_key, mtime) {
                            self.cache.put(to_key, mtime, digest.clone());
                        }
                    }
                    Err(e) => {
                        log::debug!("Cannot stat {} after move: {}", to.display(), e);
                        self.cache.delete(from_key);
                    }
                }
                self.cache.commit()?;
                Ok(Step::new(file.path.clone(), action, Outcome::Applied, file.size))
            }
            Err(e) => {
                log::warn!("Move {} -> {} failed: {}", from.display(), to.display(), e);
                if e.is_not_found() {
                    self.cache.delete(from_key);
                    self.cache.commit()?;
                }
                Ok(Step::new(
                    file.path.clone(),
                    action,
                    Outcome::Failed(e.to_string()),
                    file.size,
                ))
            }
        }
    }

    fn apply_copy(
        &mut self,
        file: &FileEntry,
        digest: Digest,
        backup: Option<Option<Digest>>,
    ) -> Result<Step, CacheError> {
        let key = file.relative.as_str();
        let to = key_to_path(&self.target_root, key);
        let backup_to = backup.as_ref().map(|_| backup_path(&to));
        let previous = backup.flatten();
        let action = PendingAction::Copy {
            from: file.path.clone(),
            to: to.clone(),
            backup: backup_to.clone(),
        };

        // Whatever was indexed at `key` is about to be replaced.
        self.index.remove_path(key);

        log::debug!("Copy {} -> {}", file.path.display(), key);
        if self.options.dry_run {
            self.planned.fill(key);
            if let Some(backup_key) = backup_to
                .as_deref()
                .and_then(|b| relative_key(&self.target_root, b))
            {
                self.planned.fill(&backup_key);
                if let Some(previous) = previous {
                    self.index.push(previous, backup_key);
                }
            }
            return Ok(Step::new(
                file.path.clone(),
                action,
                self.outcome_for_dry_run(),
                file.size,
            ));
        }

        if let Some(backup_to) = &backup_to {
            if let Err(e) = self.executor.move_file(&to, backup_to) {
                log::warn!("Cannot move {} aside: {}", to.display(), e);
                return Ok(Step::new(
                    file.path.clone(),
                    action,
                    Outcome::Failed(e.to_string()),
                    file.size,
                ));
            }
            log::info!("Moved existing {} to {}", to.display(), backup_to.display());
            self.record_backup(key, backup_to, previous);
        }

        match self.executor.copy_file(&file.path, &to) {
            Ok(()) => {
                match modified(&to) {
                    Ok(mtime) => self.cache.put(key, mtime, digest),
                    Err(e) => {
                        log::debug!("Cannot stat {} after copy: {}", to.display(), e);
                        self.cache.delete(key);
                    }
                }
                self.cache.commit()?;
                Ok(Step::new(file.path.clone(), action, Outcome::Applied, file.size))
            }
            Err(e) => {
                log::warn!(
                    "Transfer {} -> {} failed: {}",
                    file.path.display(),
                    to.display(),
                    e
                );
                if backup_to.is_some() {
                    self.cache.delete(key);
                }
                self.cache.commit()?;
                Ok(Step::new(
                    file.path.clone(),
                    action,
                    Outcome::Failed(e.to_string()),
                    file.size,
                ))
            }
        }
    }

    /// Record a file that was moved aside so later files can relocate it.
    fn record_backup(&mut self, key: &str, backup_to: &Path, previous: Option<Digest>) {
        let Some(backup_key) = relative_key(&self.target_root, backup_to) else {
            return;
        };
        self.cache.delete(key);
        match (previous, modified(backup_to)) {
            (Some(digest), Ok(mtime)) => {
                self.cache.put(&backup_key, mtime, digest.clone());
                self.index.push(digest, backup_key);
            }
            _ => log::debug!("Backup {} left for the next run to hash", backup_key),
        }
    }
}

fn modified(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

/// Iterator over the reconciliation steps of one source tree.
///
/// Yields `Err` only for cache failures; the iterator is exhausted after
/// the first one. Stops early when a shutdown is requested.
pub struct Reconcile<'a> {
    reconciler: &'a mut Reconciler,
    files: std::iter::Enumerate<std::vec::IntoIter<FileEntry>>,
    done: bool,
}

impl Reconcile<'_> {
    fn end_phase(&mut self) {
        self.done = true;
        if let Some(ref callback) = self.reconciler.options.progress_callback {
            callback.on_phase_end(PHASE_RECONCILE);
        }
    }
}

impl Iterator for Reconcile<'_> {
    type Item = Result<Step, CacheError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.reconciler.is_shutdown_requested() {
            log::debug!("Reconcile: Shutdown requested, stopping");
            self.reconciler.interrupted = true;
            self.end_phase();
            return None;
        }

        let Some((idx, file)) = self.files.next() else {
            self.end_phase();
            return None;
        };

        if let Some(ref callback) = self.reconciler.options.progress_callback {
            callback.on_progress(idx + 1, &file.relative);
        }

        let result = self.reconciler.process(&file);
        if result.is_err() {
            self.end_phase();
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, Some(self.files.len()))
        }
    }
}
