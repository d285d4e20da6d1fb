//! Byte-transfer executors.
//!
//! # Overview
//!
//! The reconciler only decides *what* to do; a [`TransferExecutor`] does it.
//! Two executors are provided:
//! - [`NativeExecutor`]: `rename(2)` for moves, and copies that keep the
//!   source's permissions and timestamps and atomically replace the
//!   destination.
//! - [`RsyncExecutor`]: copies through an external `rsync -a`, moves through
//!   a native rename.
//!
//! # Safety
//!
//! Moves never replace an existing destination. Copies write to a temporary
//! sibling first, so a crash leaves either the old or the new file, never a
//! truncated one.
//!
//! # Example
//!
//! ```no_run
//! use relocase::actions::transfer::{NativeExecutor, TransferExecutor};
//! use std::path::Path;
//!
//! let executor = NativeExecutor::new();
//! executor.move_file(Path::new("/t/old/a.txt"), Path::new("/t/a.txt"))?;
//! # Ok::<(), relocase::actions::TransferError>(())
//! ```

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::path_utils::{path_occupied, STAGING_PREFIX, STAGING_SUFFIX};

/// Error type for transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Source was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied reading the source or writing the destination.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The destination of a move is already occupied.
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// An external transfer command failed.
    #[error("{program} failed for {path}: {message}")]
    CommandFailed {
        /// Program that was run
        program: String,
        /// Source path of the transfer
        path: PathBuf,
        /// Exit status and stderr
        message: String,
    },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Classify an I/O error.
    #[must_use]
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::DestinationExists(p)
            | Self::CommandFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }

    /// Whether the source vanished before it could be transferred.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Performs the file operations the reconciler decides on.
pub trait TransferExecutor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Relocate `from` to `to` without re-transferring bytes where possible.
    ///
    /// Parent directories of `to` are created. Fails with
    /// [`TransferError::DestinationExists`] if `to` is occupied.
    fn move_file(&self, from: &Path, to: &Path) -> Result<(), TransferError>;

    /// Copy `from` to `to`, replacing `to` if it exists.
    ///
    /// Parent directories of `to` are created; permissions and modification
    /// time follow the source.
    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), TransferError>;
}

/// Which executor to build.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// In-process rename and copy
    #[default]
    Native,
    /// External `rsync -a` for copies
    Rsync,
}

impl TransferMode {
    /// Build the executor for this mode.
    #[must_use]
    pub fn executor(self) -> Box<dyn TransferExecutor> {
        match self {
            Self::Native => Box::new(NativeExecutor::new()),
            Self::Rsync => Box::new(RsyncExecutor::new()),
        }
    }
}

fn ensure_parent(to: &Path) -> Result<(), TransferError> {
    match to.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| TransferError::from_io(parent, e))
        }
        _ => Ok(()),
    }
}

/// In-process executor built on `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct NativeExecutor;

impl NativeExecutor {
    /// Create a native executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn rename(from: &Path, to: &Path) -> Result<(), TransferError> {
        ensure_parent(to)?;
        if path_occupied(to) {
            return Err(TransferError::DestinationExists(to.to_path_buf()));
        }

        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                log::debug!(
                    "Rename across devices, copying instead: {} -> {}",
                    from.display(),
                    to.display()
                );
                Self::copy_preserving(from, to)?;
                fs::remove_file(from).map_err(|e| TransferError::from_io(from, e))
            }
            Err(e) => Err(TransferError::from_io(from, e)),
        }
    }

    fn copy_preserving(from: &Path, to: &Path) -> Result<(), TransferError> {
        ensure_parent(to)?;
        let parent = to
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let metadata = fs::metadata(from).map_err(|e| TransferError::from_io(from, e))?;
        let mut source = File::open(from).map_err(|e| TransferError::from_io(from, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(parent)
            .map_err(|e| TransferError::from_io(parent, e))?;

        io::copy(&mut source, staged.as_file_mut())
            .map_err(|e| TransferError::from_io(staged.path(), e))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| TransferError::from_io(staged.path(), e))?;

        fs::set_permissions(staged.path(), metadata.permissions())
            .map_err(|e| TransferError::from_io(staged.path(), e))?;
        filetime::set_file_times(
            staged.path(),
            FileTime::from_last_access_time(&metadata),
            FileTime::from_last_modification_time(&metadata),
        )
        .map_err(|e| TransferError::from_io(staged.path(), e))?;

        staged
            .persist(to)
            .map_err(|e| TransferError::from_io(to, e.error))?;
        Ok(())
    }
}

impl TransferExecutor for NativeExecutor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), TransferError> {
        Self::rename(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), TransferError> {
        Self::copy_preserving(from, to)
    }
}

/// Executor delegating copies to `rsync -a`.
#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    program: PathBuf,
}

impl Default for RsyncExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RsyncExecutor {
    /// Use `rsync` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("rsync")
    }

    /// Use a specific rsync binary.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TransferExecutor for RsyncExecutor {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn move_file(&self, from: &Path, to: &Path) -> Result<(), TransferError> {
        NativeExecutor::rename(from, to)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<(), TransferError> {
        if !from.exists() {
            return Err(TransferError::NotFound(from.to_path_buf()));
        }
        ensure_parent(to)?;

        let program = self.program.display().to_string();
        let output = Command::new(&self.program)
            .arg("-a")
            .arg(from)
            .arg(to)
            .output()
            .map_err(|e| TransferError::CommandFailed {
                program: program.clone(),
                path: from.to_path_buf(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TransferError::CommandFailed {
                program,
                path: from.to_path_buf(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }
}
