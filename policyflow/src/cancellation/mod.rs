//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is threaded through every suspension point of an
//! execution: the operation call itself and any retry delay.

mod token;

pub use token::{CancelCallback, CancellationToken};

use crate::errors::Failure;

/// Builds the failure reported when `token` aborts an execution.
pub(crate) fn cancellation_failure(token: &CancellationToken) -> Failure {
    Failure::cancelled(token.reason().unwrap_or_else(|| "cancelled".to_string()))
}
