//! Tree walker built on jwalk.
//!
//! Children of every directory are visited in file-name order, so a given
//! tree always walks the same way. The content index depends on it: when
//! several target files share a digest, the first one discovered is the
//! first move candidate.
//!
//! Directories, reserved paths (the cache database), unfollowed symlinks
//! and ignored keys are filtered out; only regular files are yielded.
//!
//! # Example
//!
//! ```no_run
//! use relocase::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/data/target"), WalkerConfig::default());
//! let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
//! println!("Found {} files", files.len());
//! ```

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::{DirEntry, WalkDir};

use super::path_utils::{is_staging_file, relative_key};
use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker rooted at `path`.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Root directory of this walk.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compile the ignore patterns, relative to the walk root.
    ///
    /// Invalid patterns are logged and dropped; the rest still apply.
    fn ignore_matcher(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(matcher) => (!matcher.is_empty()).then_some(matcher),
            Err(e) => {
                log::warn!("Ignore patterns disabled: {}", e);
                None
            }
        }
    }

    /// Walk the tree, yielding regular files in sorted order.
    ///
    /// Unreadable entries are yielded as [`ScanError`] values and the walk
    /// carries on. Empty files are included: they still have to exist in
    /// the target after a sync.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let matcher = self.ignore_matcher();

        WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .sort(true)
            .into_iter()
            .take_while(move |_| {
                let stop = self.is_shutdown_requested();
                if stop {
                    log::debug!("Walk of {} stopped by shutdown", self.root.display());
                }
                !stop
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => self.visit(&entry, matcher.as_ref()),
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Cannot read {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            })
    }

    /// Turn one walk entry into a file, an error, or nothing.
    fn visit(
        &self,
        entry: &DirEntry<((), ())>,
        matcher: Option<&Gitignore>,
    ) -> Option<Result<FileEntry, ScanError>> {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            return None;
        }

        let path = entry.path();
        if self.config.reserved.is_reserved(&path) {
            log::trace!("Reserved, not synced: {}", path.display());
            return None;
        }
        if is_staging_file(&path) {
            log::debug!("Leftover staged copy, not synced: {}", path.display());
            return None;
        }
        if file_type.is_symlink() && !self.config.follow_symlinks {
            log::trace!("Symlink skipped: {}", path.display());
            return None;
        }

        let Some(relative) = relative_key(&self.root, &path) else {
            log::warn!("Path is not valid UTF-8: {}", path.display());
            return Some(Err(ScanError::NonUtf8Path(path)));
        };
        if matcher.is_some_and(|m| {
            m.matched_path_or_any_parents(Path::new(&relative), false)
                .is_ignore()
        }) {
            log::trace!("Ignored by pattern: {}", relative);
            return None;
        }

        match self.metadata(&path) {
            Ok(metadata) if metadata.is_file() => {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                Some(Ok(FileEntry::new(path, relative, metadata.len(), modified)))
            }
            Ok(_) => None,
            Err(e) => {
                let err = ScanError::from_io(&path, e);
                match err {
                    ScanError::NotFound(_) => log::debug!("Vanished during walk: {}", relative),
                    _ => log::warn!("{}", err),
                }
                Some(Err(err))
            }
        }
    }

    fn metadata(&self, path: &Path) -> std::io::Result<Metadata> {
        if self.config.follow_symlinks {
            std::fs::metadata(path)
        } else {
            std::fs::symlink_metadata(path)
        }
    }
}
