//! Reconciliation engine.
//!
//! This module ties the pieces of a sync together:
//! - [`index`]: the content-addressed view of the target tree
//! - [`reconciler`]: per-file decisions and their execution
//! - [`action`]: the decisions and outcomes reported to the user
//!
//! # Example
//!
//! ```no_run
//! use relocase::actions::TransferMode;
//! use relocase::cache::HashCache;
//! use relocase::scanner::{HashAlgorithm, Hasher};
//! use relocase::sync::{ContentIndex, IndexOptions, ReconcileOptions, Reconciler};
//! use std::path::Path;
//!
//! let target = Path::new("/data/target");
//! let mut cache = HashCache::open(&target.join(".relocase.db"), HashAlgorithm::Blake3)?;
//! let hasher = Hasher::new(HashAlgorithm::Blake3);
//! let (index, _) = ContentIndex::build(target, &mut cache, &hasher, &IndexOptions::default())?;
//!
//! let mut reconciler = Reconciler::new(
//!     target,
//!     index,
//!     cache,
//!     TransferMode::Native.executor(),
//!     hasher,
//!     ReconcileOptions::default(),
//! );
//! for step in reconciler.reconcile(Path::new("/data/source")) {
//!     println!("{:?}", step?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod action;
pub mod index;
pub mod reconciler;

use bytesize::ByteSize;
use serde::Serialize;

pub use action::{Operation, Outcome, PendingAction, SkipReason, Step};
pub use index::{ContentIndex, IndexError, IndexOptions, IndexStats};
pub use reconciler::{OverwritePolicy, Reconcile, ReconcileOptions, Reconciler};

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Files relocated inside the target
    pub moved: usize,
    /// Files transferred from the source
    pub copied: usize,
    /// Files already in place
    pub skipped: usize,
    /// Destinations left untouched because they were occupied
    pub conflicts: usize,
    /// Actions that failed
    pub failed: usize,
    /// Bytes transferred from the source
    pub bytes_transferred: u64,
    /// Bytes that did not need transferring thanks to moves
    pub bytes_relocated: u64,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Whether the run stopped early
    pub interrupted: bool,
}

impl RunSummary {
    /// Create an empty summary.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Count one step.
    pub fn record(&mut self, step: &Step) {
        if step.is_failed() {
            self.failed += 1;
            return;
        }
        match step.action {
            PendingAction::Skip { .. } => self.skipped += 1,
            PendingAction::Conflict { .. } => self.conflicts += 1,
            PendingAction::Move { .. } => {
                self.moved += 1;
                self.bytes_relocated += step.bytes;
            }
            PendingAction::Copy { .. } => {
                self.copied += 1;
                self.bytes_transferred += step.bytes;
            }
        }
    }

    /// Total number of steps counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.moved + self.copied + self.skipped + self.conflicts + self.failed
    }

    /// One-line human readable summary.
    #[must_use]
    pub fn to_line(&self) -> String {
        let (moved, copied) = if self.dry_run {
            ("would move", "would transfer")
        } else {
            ("moved", "transferred")
        };
        let mut line = format!(
            "{} {}, {} {}, {} up to date, {} conflicts, {} failed ({} transferred, {} saved by moves)",
            self.moved,
            moved,
            self.copied,
            copied,
            self.skipped,
            self.conflicts,
            self.failed,
            ByteSize::b(self.bytes_transferred),
            ByteSize::b(self.bytes_relocated),
        );
        if self.interrupted {
            line.push_str(" [interrupted]");
        }
        line
    }
}
