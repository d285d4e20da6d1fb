//! Tree enumeration and content hashing.
//!
//! Both the source and the target are read through this module, with one
//! shared [`WalkerConfig`], so the two sides agree on which files exist:
//! - [`walker`]: name-sorted traversal yielding [`FileEntry`] values
//! - [`hasher`]: BLAKE3 or SHA-256 digests of file contents
//! - [`path_utils`]: relative keys, filesystem roots, reserved paths
//!
//! # Example
//!
//! ```no_run
//! use relocase::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("."), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.relative, file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

// Re-export main types
pub use hasher::{Digest, HashAlgorithm, Hasher};
pub use path_utils::ReservedPaths;
pub use walker::Walker;

/// A regular file found by the walker.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Absolute path (root joined with `relative`)
    pub path: PathBuf,
    /// Key relative to the walked root, `/`-separated
    pub relative: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time, the cache's freshness token
    pub modified: SystemTime,
}

impl FileEntry {
    /// Bundle the walk results for one file.
    #[must_use]
    pub fn new(path: PathBuf, relative: String, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            relative,
            size,
            modified,
        }
    }
}

/// Configuration for directory walking.
///
/// The same configuration is applied to the source and the target tree so
/// that both sides agree on which files take part in a sync.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Sync the targets of symbolic links instead of skipping the links.
    pub follow_symlinks: bool,

    /// Leave out dot-files and dot-directories.
    pub skip_hidden: bool,

    /// Gitignore-style patterns, matched against relative keys.
    pub ignore_patterns: Vec<String>,

    /// Paths owned by relocase itself (the cache database and its sidecars).
    pub reserved: ReservedPaths,
}

impl WalkerConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(follow_symlinks: bool, skip_hidden: bool, ignore_patterns: Vec<String>) -> Self {
        Self {
            follow_symlinks,
            skip_hidden,
            ignore_patterns,
            reserved: ReservedPaths::default(),
        }
    }

    /// Replace the reserved path set.
    #[must_use]
    pub fn with_reserved(mut self, reserved: ReservedPaths) -> Self {
        self.reserved = reserved;
        self
    }
}

/// Errors raised while walking a tree.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The entry exists but may not be read.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The entry disappeared while the walk was running.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The path cannot be represented as a UTF-8 cache key.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error raised for `path`.
    #[must_use]
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing was interrupted by a shutdown request.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    /// Build a hash error from an I/O error, classifying common kinds.
    #[must_use]
    pub fn from_io(path: &std::path::Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Whether the file simply disappeared (a race with another process).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
