//! Line-oriented text output.

use crate::sync::{IndexStats, Outcome, PendingAction, RunSummary, Step};
use bytesize::ByteSize;

/// Render one step as a report line.
///
/// Files that needed nothing return `None`.
#[must_use]
pub fn render_step(step: &Step) -> Option<String> {
    match (&step.action, &step.outcome) {
        (PendingAction::Skip { .. }, Outcome::Failed(error)) => Some(format!(
            "Failed to read {}: {}",
            step.source.display(),
            error
        )),
        (PendingAction::Skip { .. }, _) => None,
        (PendingAction::Conflict { to, operation }, _) => Some(format!(
            "Warning: Destination {} already exists. Skipping {}.",
            to.display(),
            operation
        )),
        (PendingAction::Move { from, to }, outcome) => Some(match outcome {
            Outcome::Planned => format!("Would move: {} -> {}", from.display(), to.display()),
            Outcome::Failed(error) => format!(
                "Failed to move {} -> {}: {}",
                from.display(),
                to.display(),
                error
            ),
            Outcome::Applied | Outcome::Noop => {
                format!("Moved: {} -> {}", from.display(), to.display())
            }
        }),
        (PendingAction::Copy { from, to, backup }, outcome) => {
            let mut line = match outcome {
                Outcome::Planned => {
                    format!("Would transfer: {} -> {}", from.display(), to.display())
                }
                Outcome::Failed(error) => format!(
                    "Failed to transfer {} -> {}: {}",
                    from.display(),
                    to.display(),
                    error
                ),
                Outcome::Applied | Outcome::Noop => {
                    format!("Transferred: {} -> {}", from.display(), to.display())
                }
            };
            if let Some(backup) = backup {
                line.push_str(&format!(" (previous file kept as {})", backup.display()));
            }
            Some(line)
        }
    }
}

/// Render the closing summary.
#[must_use]
pub fn render_summary(summary: &RunSummary, index: &IndexStats) -> String {
    format!(
        "{}\nTarget index: {} files ({} from cache, {} hashed, {} read)",
        summary.to_line(),
        index.files,
        index.cache_hits,
        index.hashed,
        ByteSize::b(index.bytes_hashed),
    )
}
