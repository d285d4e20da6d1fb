//! File actions module.
//!
//! This module performs the filesystem side of a sync:
//! - Moves (relocating bytes already present in the target)
//! - Copies (transferring bytes from the source, keeping metadata)
//!
//! The reconciler talks to a [`TransferExecutor`] only, so the transfer
//! mechanism (in-process or external `rsync`) is a configuration choice.
//!
//! ```no_run
//! use relocase::actions::{TransferExecutor, TransferMode};
//! use std::path::Path;
//!
//! let executor = TransferMode::Native.executor();
//! executor.copy_file(Path::new("/src/a.txt"), Path::new("/dst/a.txt"))?;
//! # Ok::<(), relocase::actions::TransferError>(())
//! ```

pub mod transfer;

pub use transfer::{NativeExecutor, RsyncExecutor, TransferError, TransferExecutor, TransferMode};
