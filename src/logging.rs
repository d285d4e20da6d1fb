//! Logging setup for relocase.
//!
//! Log records go through the `log` facade to an `env_logger` backend on
//! stderr, leaving stdout to the action report. The level comes from, in
//! order:
//!
//! 1. `RUST_LOG`, when set
//! 2. `--quiet` (errors only) or `--verbose` (`-v` debug, `-vv` trace)
//! 3. info
//!
//! Debug builds stamp each line with the time; with `-v` they also show the
//! module path so that index and reconcile messages can be told apart.
//!
//! ```rust,no_run
//! relocase::logging::init_logging(1, false);
//! log::debug!("Reconciling");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Crates whose debug output would drown the per-file messages.
const NOISY_DEPENDENCIES: [&str; 2] = ["ignore", "globset"];

/// How each record is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineFormat {
    timestamp: bool,
    module_path: bool,
}

impl LineFormat {
    fn for_build(verbose: u8) -> Self {
        Self {
            timestamp: cfg!(debug_assertions),
            module_path: cfg!(debug_assertions) && verbose >= 1,
        }
    }
}

/// Install the global logger.
///
/// Only the first call in a process takes effect, so `run_app` can be
/// driven repeatedly from tests.
///
/// # Arguments
///
/// * `verbose` - `-v` count (0 info, 1 debug, 2+ trace)
/// * `quiet` - errors only; ignored when `RUST_LOG` is set
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    match from_env {
        Some(ref spec) => {
            builder.parse_filters(spec);
        }
        None => {
            builder.filter_level(level);
            for module in NOISY_DEPENDENCIES {
                builder.filter_module(module, level.min(LevelFilter::Warn));
            }
        }
    }
    apply_format(&mut builder, LineFormat::for_build(verbose));

    if builder.try_init().is_ok() {
        match from_env {
            Some(spec) => log::debug!("Log filter from RUST_LOG: {}", spec),
            None => log::debug!("Log level: {}", level),
        }
    }
}

/// Map CLI flags to a level filter.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

fn apply_format(builder: &mut Builder, format: LineFormat) {
    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        if format.timestamp {
            write!(buf, "{} ", buf.timestamp_seconds())?;
        }
        write!(buf, "{style}{level:<5}{style:#} ")?;
        if format.module_path {
            write!(buf, "[{}] ", record.module_path().unwrap_or("?"))?;
        }
        writeln!(buf, "{}", record.args())
    });
}
