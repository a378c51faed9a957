//! Interrupt handling for a running transfer.
//!
//! The first interrupt stops admission and lets in-flight jobs finish; a
//! second one asks the caller to quit immediately.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::core::ProgressTracker;

/// Exit status used when the user forces a quit.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Wait for interrupts from `next_interrupt`.
///
/// Returns `true` once a second interrupt arrives after `cancel` has been
/// fired, and `false` if the signal source fails first.
pub async fn watch_interrupts<F, Fut>(
    mut next_interrupt: F,
    cancel: CancellationToken,
    progress: ProgressTracker,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    let in_flight = progress.active_count().await;
    warn!(
        in_flight = in_flight,
        "Interrupt received, letting in-flight transfers finish (interrupt again to quit now)"
    );
    cancel.cancel();

    if next_interrupt().await.is_err() {
        return false;
    }
    let in_flight = progress.active_count().await;
    error!(
        in_flight = in_flight,
        "Second interrupt, abandoning in-flight transfers"
    );
    true
}
