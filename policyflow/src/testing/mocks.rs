//! Mock operations for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cancellation::{cancellation_failure, CancellationToken};
use crate::errors::Failure;
use crate::operation::Operation;

/// An operation that replays a script of outcomes.
///
/// Each call consumes the next outcome; the last one repeats forever.
#[derive(Debug)]
pub struct ScriptedOperation<T> {
    script: Mutex<VecDeque<Result<T, Failure>>>,
    calls: AtomicUsize,
}

impl<T: Clone> ScriptedOperation<T> {
    /// Creates an operation replaying `outcomes` in order.
    pub fn new(outcomes: impl IntoIterator<Item = Result<T, Failure>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails `failures` times with `failure`, then succeeds with `value`.
    pub fn failing_then(failures: usize, failure: Failure, value: T) -> Self {
        let mut outcomes: Vec<Result<T, Failure>> = vec![Err(failure); failures];
        outcomes.push(Ok(value));
        Self::new(outcomes)
    }

    /// Always fails with `failure`.
    #[must_use]
    pub fn always_failing(failure: Failure) -> Self {
        Self::new([Err(failure)])
    }

    /// Always succeeds with `value`.
    pub fn always(value: T) -> Self {
        Self::new([Ok(value)])
    }

    /// Replaces the remaining script with a single repeating outcome.
    pub fn set_outcome(&self, outcome: Result<T, Failure>) {
        let mut script = self.script.lock();
        script.clear();
        script.push_back(outcome);
    }

    /// Returns the number of times the operation was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<T, Failure> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            if let Some(outcome) = script.pop_front() {
                return outcome;
            }
        }
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(Failure::generic("scripted operation has no outcomes")))
    }
}

#[async_trait]
impl<T> Operation<T> for ScriptedOperation<T>
where
    T: Clone + Send + 'static,
{
    async fn call(&self, _cancel: &CancellationToken) -> Result<T, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next_outcome()
    }
}

/// An operation whose calls block until the test releases them.
#[derive(Debug)]
pub struct GatedOperation<T> {
    outcome: Mutex<Result<T, Failure>>,
    gate: Semaphore,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl<T: Clone> GatedOperation<T> {
    /// Creates a closed gate that yields `outcome` once released.
    pub fn new(outcome: Result<T, Failure>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Lets `n` blocked or future calls through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Changes the outcome of calls that have not completed yet.
    pub fn set_outcome(&self, outcome: Result<T, Failure>) {
        *self.outcome.lock() = outcome;
    }

    /// Returns the number of times the operation was invoked.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the number of calls currently waiting at the gate.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Returns the highest number of calls ever waiting at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Yields until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.call_count() < n {
            tokio::task::yield_now().await;
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T> Operation<T> for GatedOperation<T>
where
    T: Clone + Send + 'static,
{
    async fn call(&self, _cancel: &CancellationToken) -> Result<T, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(Failure::generic("gate closed")),
        }
        self.outcome.lock().clone()
    }
}

/// An operation that sleeps before succeeding, honouring cancellation.
#[derive(Debug, Clone)]
pub struct DelayedOperation<T> {
    value: T,
    delay: Duration,
}

impl<T> DelayedOperation<T> {
    /// Creates an operation returning `value` after `delay`.
    pub fn new(value: T, delay: Duration) -> Self {
        Self { value, delay }
    }
}

#[async_trait]
impl<T> Operation<T> for DelayedOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        tokio::select! {
            () = cancel.cancelled() => Err(cancellation_failure(cancel)),
            () = tokio::time::sleep(self.delay) => Ok(self.value.clone()),
        }
    }
}
