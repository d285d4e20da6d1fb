//! Structured error handling and exit codes.

use std::path::PathBuf;

use serde::Serialize;

/// Exit codes for relocase.
///
/// - 0: Success (conflicts and per-file failures are reported, not fatal)
/// - 1: General error (bad arguments, unusable trees, cache failure)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: every source file was reconciled.
    Success = 0,
    /// General error: the run could not be set up or the cache failed.
    GeneralError = 1,
    /// Interrupted: the run was stopped by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "RL000",
            Self::GeneralError => "RL001",
            Self::Interrupted => "RL130",
        }
    }
}

/// Problems with the trees handed to a run, detected before anything moves.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The source tree does not exist.
    #[error("source directory not found: {0}")]
    SourceNotFound(PathBuf),

    /// A root is a file rather than a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Source and target are the same directory.
    #[error("source and target are the same directory: {0}")]
    SameTree(PathBuf),

    /// One tree contains the other.
    #[error("source {source_root} and target {target_root} overlap")]
    OverlappingTrees {
        /// Source root
        source_root: PathBuf,
        /// Target root
        target_root: PathBuf,
    },
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "RL001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
