//! JSON output formatter for sync results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "dry_run": false,
//!   "actions": [
//!     {
//!       "source": "/src/a.txt",
//!       "action": "move",
//!       "from": "/dst/old/a.txt",
//!       "to": "/dst/a.txt",
//!       "outcome": { "status": "applied" },
//!       "bytes": 1024
//!     }
//!   ],
//!   "summary": {
//!     "moved": 1,
//!     "copied": 0,
//!     "skipped": 0,
//!     "conflicts": 0,
//!     "failed": 0,
//!     "bytes_transferred": 0,
//!     "bytes_relocated": 1024,
//!     "files_indexed": 1,
//!     "cache_hits": 0,
//!     "hashed": 1,
//!     "pruned": 0,
//!     "index_duration_ms": 3,
//!     "interrupted": false,
//!     "exit_code": 0,
//!     "exit_code_name": "RL000"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::error::ExitCode;
use crate::sync::{IndexStats, RunSummary, Step};

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Files relocated inside the target
    pub moved: usize,
    /// Files transferred from the source
    pub copied: usize,
    /// Files already in place
    pub skipped: usize,
    /// Occupied destinations left untouched
    pub conflicts: usize,
    /// Actions that failed
    pub failed: usize,
    /// Bytes transferred from the source
    pub bytes_transferred: u64,
    /// Bytes relocated instead of transferred
    pub bytes_relocated: u64,
    /// Files found in the target
    pub files_indexed: usize,
    /// Target digests reused from the cache
    pub cache_hits: usize,
    /// Target files hashed this run
    pub hashed: usize,
    /// Stale cache entries removed
    pub pruned: usize,
    /// Duration of the index build in milliseconds
    pub index_duration_ms: u64,
    /// Whether the run was interrupted
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "RL000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Build the summary from the run totals and index statistics.
    #[must_use]
    pub fn new(summary: &RunSummary, index: &IndexStats, exit_code: ExitCode) -> Self {
        Self {
            moved: summary.moved,
            copied: summary.copied,
            skipped: summary.skipped,
            conflicts: summary.conflicts,
            failed: summary.failed,
            bytes_transferred: summary.bytes_transferred,
            bytes_relocated: summary.bytes_relocated,
            files_indexed: index.files,
            cache_hits: index.cache_hits,
            hashed: index.hashed,
            pruned: index.pruned,
            index_duration_ms: u64::try_from(index.duration.as_millis()).unwrap_or(u64::MAX),
            interrupted: summary.interrupted,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Whether nothing was modified
    pub dry_run: bool,
    /// One entry per source file, in walk order
    pub actions: Vec<Step>,
    /// Totals
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create the document for a finished run.
    #[must_use]
    pub fn new(
        steps: Vec<Step>,
        summary: &RunSummary,
        index: &IndexStats,
        exit_code: ExitCode,
    ) -> Self {
        Self {
            dry_run: summary.dry_run,
            actions: steps,
            summary: JsonSummary::new(summary, index, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (unlikely for valid data).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
