//! Ctrl+C handling.
//!
//! Ctrl+C sets a shared `AtomicBool`. The walker, the index builder and the
//! reconciler poll it, so a sync stops between two files and every action
//! already carried out is recorded in the cache.
//!
//! # Usage
//!
//! ```rust,no_run
//! use relocase::signal::install_handler;
//! use relocase::sync::ReconcileOptions;
//!
//! let handler = install_handler()?;
//! let options = ReconcileOptions::default().with_shutdown_flag(handler.get_flag());
//! # Ok::<(), relocase::signal::SignalError>(())
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, OnceLock};

/// Shared shutdown flag.
///
/// Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed (or a shutdown requested by hand).
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Raise the flag as if Ctrl+C had been pressed.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the flag for the walker, index builder and reconciler.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reset the flag to `false`.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// The Ctrl+C hook could not be registered.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Error reported by the `ctrlc` crate.
    #[error("cannot hook Ctrl+C: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();
static HOOK: Once = Once::new();

/// Install a Ctrl+C handler that sets the shutdown flag on interrupt.
///
/// Every call returns the same process-wide handler with its flag cleared,
/// so `run_app` can run several syncs in one process (tests do). The signal
/// hook itself is registered on the first call only. If some other code
/// already owns the Ctrl+C hook, the handler still works through
/// [`ShutdownHandler::request_shutdown`].
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the operating system refuses
/// the hook.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    let handler = GLOBAL_HANDLER.get_or_init(ShutdownHandler::new);
    handler.reset();

    let mut hooked = Ok(());
    HOOK.call_once(|| {
        let flag = handler.get_flag();
        hooked = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "\nInterrupted. Finishing the current file...");
            let _ = stderr.flush();
            log::info!("Shutdown signal received");
        });
    });

    match hooked {
        Ok(()) => {}
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C is already hooked elsewhere; relying on manual shutdown");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(handler.clone())
}
