//! Path helpers shared by the walker, the cache and the reconciler.
//!
//! Cache keys are paths relative to a tree root, joined with `/` on every
//! platform so that a cache file stays meaningful if the tree is mounted
//! elsewhere.
//!
//! # Example
//!
//! ```
//! use relocase::scanner::path_utils::{key_to_path, relative_key};
//! use std::path::Path;
//!
//! let root = Path::new("/data/target");
//! let key = relative_key(root, &root.join("photos").join("a.jpg")).unwrap();
//! assert_eq!(key, "photos/a.jpg");
//! assert_eq!(key_to_path(root, &key), root.join("photos").join("a.jpg"));
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Suffixes SQLite appends to a database name for its sidecar files.
const SQLITE_SIDECARS: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Name prefix of the temporary file a copy is staged in.
pub const STAGING_PREFIX: &str = ".relocase-";

/// Name suffix of the temporary file a copy is staged in.
pub const STAGING_SUFFIX: &str = ".partial";

/// Whether `path` names a staged copy left behind by an interrupted run.
#[must_use]
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.len() > STAGING_PREFIX.len() + STAGING_SUFFIX.len()
                && name.starts_with(STAGING_PREFIX)
                && name.ends_with(STAGING_SUFFIX)
        })
}

/// Compute the `/`-separated key of `path` relative to `root`.
///
/// Returns `None` when `path` is not under `root`, is the root itself, or is
/// not valid UTF-8.
#[must_use]
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Turn a relative key back into a path under `root`.
#[must_use]
pub fn key_to_path(root: &Path, key: &str) -> PathBuf {
    key.split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Whether anything (file, directory or dangling symlink) occupies `path`.
#[must_use]
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Find the root of the filesystem holding `path`.
///
/// Walks up the ancestors of the canonical path until the parent lives on a
/// different device (a mount point boundary).
///
/// # Errors
///
/// Returns an error if `path` cannot be canonicalized or stat'ed.
pub fn filesystem_root(path: &Path) -> io::Result<PathBuf> {
    let canonical = path.canonicalize()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        let device = fs::metadata(&canonical)?.dev();
        let mut current = canonical.as_path();
        while let Some(parent) = current.parent() {
            if fs::metadata(parent)?.dev() != device {
                break;
            }
            current = parent;
        }
        Ok(current.to_path_buf())
    }

    #[cfg(not(unix))]
    {
        Ok(canonical
            .ancestors()
            .last()
            .map_or_else(|| canonical.clone(), Path::to_path_buf))
    }
}

/// Pick a free sibling name to move an existing file aside to.
///
/// Tries `<name>.bak`, then `<name>.bak.1`, `<name>.bak.2`, ...
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut base = path.as_os_str().to_os_string();
    base.push(".bak");
    let first = PathBuf::from(&base);
    if !path_occupied(&first) {
        return first;
    }

    (1u32..)
        .map(|n| {
            let mut candidate = base.clone();
            candidate.push(format!(".{n}"));
            PathBuf::from(candidate)
        })
        .find(|candidate| !path_occupied(candidate))
        .unwrap_or(first)
}

/// Set of paths the walker must never report.
///
/// This is the explicit "is this path ours?" predicate handed to the tree
/// walk, so the cache database can live anywhere without the walker knowing
/// its naming scheme.
#[derive(Debug, Clone, Default)]
pub struct ReservedPaths {
    paths: Vec<PathBuf>,
}

impl ReservedPaths {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a SQLite database file together with its journal sidecars.
    #[must_use]
    pub fn for_database(db_path: &Path) -> Self {
        let mut reserved = Self::new();
        reserved.insert_database(db_path);
        reserved
    }

    /// Add a SQLite database file and its sidecars to the set.
    pub fn insert_database(&mut self, db_path: &Path) {
        self.insert(db_path.to_path_buf());
        for suffix in SQLITE_SIDECARS {
            let mut sidecar: OsString = db_path.as_os_str().to_os_string();
            sidecar.push(suffix);
            self.insert(PathBuf::from(sidecar));
        }
    }

    /// Add a single path to the set.
    pub fn insert(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Whether `path` is reserved.
    #[must_use]
    pub fn is_reserved(&self, path: &Path) -> bool {
        self.paths.iter().any(|reserved| reserved == path)
    }

    /// Number of reserved paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path is reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
