//! Timer helpers
//!
//! An optional deadline that can sit unarmed inside a select loop.

use tokio::time::{sleep_until, Instant};

/// Resolves when `deadline` passes; pends forever while unarmed.
/// Cancelling an armed deadline is setting the option back to `None`.
pub(crate) async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
