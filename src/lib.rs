//! relocase - content-aware tree synchronizer
//!
//! relocase brings a TARGET tree in line with a SOURCE tree. Before copying
//! a file it checks whether the target already holds the same bytes under
//! another name; if so, that file is moved into place instead. Target
//! digests are cached in SQLite keyed by path and modification time, so
//! repeated runs only hash what changed.
//!
//! The engine lives in [`sync`]; [`run_app`] wires it to the CLI.

pub mod actions;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod sync;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::HashCache;
use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::error::{ExitCode, SyncError};
use crate::output::{render_step, render_summary, JsonOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::{Hasher, ReservedPaths};
use crate::sync::{ContentIndex, IndexOptions, ReconcileOptions, Reconciler, RunSummary};

/// Run one sync as described by `cli`.
///
/// Conflicts and per-file failures are reported and do not fail the run.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the trees are unusable,
/// the cache cannot be opened or written, or indexing was interrupted.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let shutdown = signal::install_handler()?;

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli)?;

    let (source, target) = prepare_roots(&cli.source, &cli.target, cli.dry_run)?;
    let db_path = if target.exists() {
        config.database_path(&target)?
    } else {
        target.join(&config.db_name)
    };
    log::debug!("Cache database: {}", db_path.display());

    let mut reserved = ReservedPaths::for_database(&db_path);
    reserved.insert_database(&target.join(&config.db_name));
    reserved.insert_database(&source.join(&config.db_name));
    let walker = config.walker_config(reserved);

    let mut cache = if cli.dry_run {
        HashCache::in_memory(config.algorithm)?
    } else {
        HashCache::open(&db_path, config.algorithm)
            .with_context(|| format!("failed to open cache {}", db_path.display()))?
    };
    if cli.clear_cache && !cli.dry_run {
        log::info!("Clearing cache {}", db_path.display());
        cache.clear()?;
    }

    let progress = Arc::new(Progress::new(cli.quiet || cli.no_progress));
    let callback: Arc<dyn ProgressCallback> = progress.clone();
    let hasher = Hasher::new(config.algorithm).with_shutdown_flag(shutdown.get_flag());

    let index_options = IndexOptions::default()
        .with_walker(walker.clone())
        .with_io_threads(config.io_threads)
        .with_shutdown_flag(shutdown.get_flag())
        .with_progress_callback(Arc::clone(&callback));
    let (index, index_stats) = ContentIndex::build(&target, &mut cache, &hasher, &index_options)
        .with_context(|| format!("failed to index {}", target.display()))?;
    log::info!(
        "Indexed {} target files ({} cached, {} hashed, {} pruned) in {:.2?}",
        index_stats.files,
        index_stats.cache_hits,
        index_stats.hashed,
        index_stats.pruned,
        index_stats.duration
    );

    let reconcile_options = ReconcileOptions::default()
        .with_dry_run(cli.dry_run)
        .with_overwrite(config.overwrite)
        .with_walker(walker)
        .with_shutdown_flag(shutdown.get_flag())
        .with_progress_callback(callback);
    let executor = config.transfer.executor();
    log::debug!("Transfer executor: {}", executor.name());
    let mut reconciler = Reconciler::new(
        &target,
        index,
        cache,
        executor,
        hasher,
        reconcile_options,
    );

    let print_lines = cli.output == OutputFormat::Text && !cli.quiet;
    let mut summary = RunSummary::new(cli.dry_run);
    let mut steps = Vec::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for result in reconciler.reconcile(&source) {
        let step = result.context("failed to update the cache")?;
        summary.record(&step);
        if print_lines {
            if let Some(line) = render_step(&step) {
                progress.suspend(|| writeln!(out, "{line}"))?;
            }
        }
        if cli.output == OutputFormat::Json {
            steps.push(step);
        }
    }

    summary.interrupted = reconciler.was_interrupted();
    if reconciler.walk_errors() > 0 {
        log::warn!(
            "{} source entries could not be read",
            reconciler.walk_errors()
        );
    }
    reconciler
        .finish()
        .close()
        .context("failed to close the cache")?;

    let exit_code = if summary.interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    };

    match cli.output {
        OutputFormat::Text => {
            if !cli.quiet {
                writeln!(out, "{}", render_summary(&summary, &index_stats))?;
            }
        }
        OutputFormat::Json => {
            JsonOutput::new(steps, &summary, &index_stats, exit_code).write_to(&mut out, true)?;
        }
    }
    log::debug!("{}", summary.to_line());

    Ok(exit_code)
}

/// Resolve both roots and check they can be synced.
///
/// A missing target is created, except in a dry run.
fn prepare_roots(source: &Path, target: &Path, dry_run: bool) -> Result<(PathBuf, PathBuf)> {
    if !source.exists() {
        return Err(SyncError::SourceNotFound(source.to_path_buf()).into());
    }
    if !source.is_dir() {
        return Err(SyncError::NotADirectory(source.to_path_buf()).into());
    }
    let source = source
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", source.display()))?;

    if target.exists() {
        if !target.is_dir() {
            return Err(SyncError::NotADirectory(target.to_path_buf()).into());
        }
    } else if !dry_run {
        log::info!("Creating target directory {}", target.display());
        fs::create_dir_all(target)
            .with_context(|| format!("cannot create {}", target.display()))?;
    }

    let resolved = if target.exists() {
        target.canonicalize()
    } else {
        std::path::absolute(target)
    };
    let target = resolved.with_context(|| format!("cannot resolve {}", target.display()))?;

    if source == target {
        return Err(SyncError::SameTree(source).into());
    }
    if source.starts_with(&target) || target.starts_with(&source) {
        return Err(SyncError::OverlappingTrees {
            source_root: source,
            target_root: target,
        }
        .into());
    }

    Ok((source, target))
}
