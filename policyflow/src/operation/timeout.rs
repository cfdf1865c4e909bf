//! Deadlines expressed as an operation.

use super::Operation;
use crate::cancellation::CancellationToken;
use crate::errors::Failure;
use async_trait::async_trait;
use std::time::Duration;

/// Fails with a timeout failure if the inner operation outlives its deadline.
///
/// Because the deadline is just another operation, it composes with retry,
/// circuit breaker and fallback like any other failure source.
#[derive(Debug, Clone)]
pub struct TimeoutOperation<O> {
    inner: O,
    deadline: Duration,
}

impl<O> TimeoutOperation<O> {
    /// Wraps `inner` with a per-call deadline.
    pub fn new(inner: O, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    /// Returns the configured deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[async_trait]
impl<T, O> Operation<T> for TimeoutOperation<O>
where
    T: Send + 'static,
    O: Operation<T>,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        match tokio::time::timeout(self.deadline, self.inner.call(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Failure::timeout(format!(
                "operation exceeded its {}ms deadline",
                self.deadline.as_millis()
            ))),
        }
    }
}
