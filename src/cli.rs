//! Command-line interface definitions for relocase.
//!
//! This module defines all CLI arguments using the clap derive API. Options
//! that also exist in the configuration file are optional here, so that an
//! absent flag leaves the configured value alone.
//!
//! # Example
//!
//! ```bash
//! # Preview what a sync would do
//! relocase --dry-run ~/photos /mnt/backup/photos
//!
//! # Sync, keeping the digest cache at the root of the backup disk
//! relocase --cache-location filesystem-root ~/photos /mnt/backup/photos
//!
//! # Machine-readable report
//! relocase --output json ~/photos /mnt/backup/photos
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::actions::TransferMode;
use crate::config::CacheLocation;
use crate::scanner::HashAlgorithm;
use crate::sync::OverwritePolicy;

/// Sync a source tree into a target tree, moving files the target already
/// holds instead of copying them again.
#[derive(Debug, Parser)]
#[command(name = "relocase")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to read files from
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Directory to bring in line with SOURCE
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Report what would happen without modifying any file
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// File name of the digest cache database
    #[arg(long, value_name = "NAME")]
    pub db_name: Option<String>,

    /// Where to keep the digest cache database
    #[arg(long, value_enum, value_name = "LOCATION")]
    pub cache_location: Option<CacheLocation>,

    /// Clear the digest cache before indexing the target
    #[arg(long)]
    pub clear_cache: bool,

    /// Content digest algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<HashAlgorithm>,

    /// How bytes are transferred from SOURCE
    #[arg(long, value_enum)]
    pub transfer: Option<TransferMode>,

    /// What to do when a transfer would replace different content
    #[arg(long, value_enum)]
    pub overwrite: Option<OverwritePolicy>,

    /// Gitignore-style patterns to exclude (can be specified multiple times)
    ///
    /// Patterns apply to both trees.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Follow symbolic links during traversal
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Number of threads hashing the target (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Report fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

/// How results are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per action, then a summary
    #[default]
    Text,
    /// A single JSON document
    Json,
}
