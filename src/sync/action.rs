//! Actions decided by the reconciler and their outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Why a source file needed no transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The target already holds this content at the same relative path.
    AlreadyPlaced,
    /// The destination exists with identical content but was not indexed.
    Identical,
    /// The source file could not be read.
    Unreadable,
}

/// Which operation a conflict blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Relocation of an existing target file
    Move,
    /// Transfer from the source
    Copy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move => f.write_str("move"),
            Self::Copy => f.write_str("transfer"),
        }
    }
}

/// The decision for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum PendingAction {
    /// Nothing to do.
    Skip {
        /// Destination path in the target
        path: PathBuf,
        /// Why nothing needs doing
        reason: SkipReason,
    },
    /// Relocate a target file that already holds the content.
    Move {
        /// Existing target file
        from: PathBuf,
        /// Destination in the target
        to: PathBuf,
    },
    /// Transfer the bytes from the source.
    Copy {
        /// Source file
        from: PathBuf,
        /// Destination in the target
        to: PathBuf,
        /// Where the previous occupant of `to` was moved aside to
        #[serde(skip_serializing_if = "Option::is_none")]
        backup: Option<PathBuf>,
    },
    /// The destination is occupied; nothing was changed.
    Conflict {
        /// Occupied destination
        to: PathBuf,
        /// Operation that was blocked
        operation: Operation,
    },
}

impl PendingAction {
    /// Whether the action changes the target tree.
    #[must_use]
    pub fn modifies_target(&self) -> bool {
        matches!(self, Self::Move { .. } | Self::Copy { .. })
    }

    /// Destination path of the action.
    #[must_use]
    pub fn destination(&self) -> &PathBuf {
        match self {
            Self::Skip { path, .. } => path,
            Self::Move { to, .. } | Self::Copy { to, .. } | Self::Conflict { to, .. } => to,
        }
    }
}

/// What happened to a decided action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "kebab-case")]
pub enum Outcome {
    /// Dry run: reported, not executed.
    Planned,
    /// Executed and recorded in the cache.
    Applied,
    /// Nothing to execute (skip or conflict).
    Noop,
    /// Execution failed; the run continued.
    Failed(String),
}

/// One reconciled source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Source file
    pub source: PathBuf,
    /// Decision
    #[serde(flatten)]
    pub action: PendingAction,
    /// Result of executing the decision
    pub outcome: Outcome,
    /// Size of the source file in bytes
    pub bytes: u64,
}

impl Step {
    /// Create a step.
    #[must_use]
    pub fn new(source: PathBuf, action: PendingAction, outcome: Outcome, bytes: u64) -> Self {
        Self {
            source,
            action,
            outcome,
            bytes,
        }
    }

    /// Whether execution failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}
