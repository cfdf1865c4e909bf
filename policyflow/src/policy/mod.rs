//! Resilience policies.
//!
//! A [`Policy`] wraps an [`Operation`](crate::operation::Operation) and returns
//! a new operation with adjusted failure, retry or substitution behaviour.
//! Policies compose through [`PolicyWrap`], outermost first:
//!
//! ```text
//! call  ──▶ Fallback ──▶ Retry ──▶ CircuitBreaker ──▶ operation
//! fail  ◀── (substitute) ◀── (re-invoke) ◀── (count / reject) ◀──
//! ```
//!
//! Every policy acts only on failures its [`Classifier`](crate::classify::Classifier)
//! accepts and passes everything else through unchanged. Cancellation
//! failures are never retried, counted or substituted.

mod circuit_breaker;
mod fallback;
mod retry;
mod wrap;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{FallbackAction, FallbackPolicy};
pub use retry::{BackoffStrategy, DelayFn, JitterStrategy, RetryBound, RetryConfig, RetryPolicy};
pub use wrap::{PolicyWrap, PolicyWrapBuilder};

use crate::operation::BoxOperation;
use std::sync::Arc;

/// Capability shared by every resilience strategy.
pub trait Policy<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Returns the policy name used in notifications and logs.
    fn name(&self) -> &str;

    /// Wraps `inner`, returning an operation that runs it under this policy.
    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T>;
}

impl<T, P> Policy<T> for Arc<P>
where
    T: Send + 'static,
    P: Policy<T> + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        (**self).wrap(inner)
    }
}

/// A policy that returns the operation unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPolicy;

impl<T> Policy<T> for NoOpPolicy
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        "noop"
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        inner
    }
}
