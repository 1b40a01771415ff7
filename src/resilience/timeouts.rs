//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with a deadline
//! - Report expiry as a distinct error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A single attempt per request; no retries after expiry
//! - Dropping the wrapped future cancels the upstream call

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, Error)]
#[error("deadline of {after:?} exceeded")]
pub struct TimedOut {
    pub after: Duration,
}

/// Run `fut` to completion or until `deadline` elapses.
pub async fn with_deadline<F: Future>(deadline: Duration, fut: F) -> Result<F::Output, TimedOut> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| TimedOut { after: deadline })
}
