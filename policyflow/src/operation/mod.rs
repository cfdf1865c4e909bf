//! Operations: the units of work policies wrap.
//!
//! An [`Operation`] is a callable that, given a cancellation token, produces
//! a value or fails with a [`Failure`]. Operations are stateless from the
//! point of view of the policies: every call is an independent invocation.

mod timeout;

pub use timeout::TimeoutOperation;

use crate::cancellation::CancellationToken;
use crate::errors::Failure;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

/// Trait for invocable operations.
#[async_trait]
pub trait Operation<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Invokes the operation once.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation signal the operation should honour at its
    ///   own suspension points
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure>;
}

/// A shared, type-erased operation.
pub type BoxOperation<T> = Arc<dyn Operation<T>>;

#[async_trait]
impl<T, O> Operation<T> for Arc<O>
where
    T: Send + 'static,
    O: Operation<T> + ?Sized,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        (**self).call(cancel).await
    }
}

/// An async function-based operation.
pub struct FnOperation<F> {
    func: F,
}

impl<F> FnOperation<F> {
    /// Creates a new function-based operation.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnOperation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, F, Fut> Operation<T> for FnOperation<F>
where
    T: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        (self.func)(cancel.clone()).await
    }
}

/// Builds an operation from an async closure.
///
/// ```rust,ignore
/// let op = operation_fn(|_cancel| async { Ok::<_, Failure>(42) });
/// ```
pub fn operation_fn<T, F, Fut>(func: F) -> FnOperation<F>
where
    T: Send + 'static,
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Failure>> + Send + 'static,
{
    FnOperation::new(func)
}
