//! Output formatters for sync results.
//!
//! This module renders reconciliation steps and the run summary:
//! - Text: one line per action, as the actions happen
//! - JSON: one document for scripting, written when the run ends
//!
//! # Example
//!
//! ```
//! use relocase::output::text::render_step;
//! use relocase::sync::{Outcome, PendingAction, Step};
//! use std::path::PathBuf;
//!
//! let step = Step::new(
//!     PathBuf::from("/src/a.txt"),
//!     PendingAction::Copy {
//!         from: PathBuf::from("/src/a.txt"),
//!         to: PathBuf::from("/dst/a.txt"),
//!         backup: None,
//!     },
//!     Outcome::Planned,
//!     3,
//! );
//! assert_eq!(
//!     render_step(&step).as_deref(),
//!     Some("Would transfer: /src/a.txt -> /dst/a.txt")
//! );
//! ```

pub mod json;
pub mod text;

pub use json::{JsonOutput, JsonOutputError};
pub use text::{render_step, render_summary};
