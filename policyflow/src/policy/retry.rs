//! Retry policy with configurable backoff and jitter strategies.
//!
//! The attempt counter lives on the stack of each invocation, so concurrent
//! callers of the same wrapped operation never see each other's retries.

use super::Policy;
use crate::cancellation::{cancellation_failure, CancellationToken};
use crate::classify::Classifier;
use crate::errors::{Failure, PolicyConfigError};
use crate::notify::{NoOpSink, Notification, NotificationKind, NotificationSink};
use crate::operation::{BoxOperation, Operation};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maps a retry number (1 for the first retry) to the wait before it.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How many retries a policy may make per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBound {
    /// At most this many retries after the first attempt.
    Finite(u32),
    /// Keep retrying until success, an unclassified failure, or cancellation.
    Unbounded,
}

impl RetryBound {
    /// Returns true if another retry is allowed after `retries_made`.
    #[must_use]
    pub fn permits(self, retries_made: u32) -> bool {
        match self {
            Self::Finite(max) => retries_made < max,
            Self::Unbounded => true,
        }
    }
}

impl Default for RetryBound {
    fn default() -> Self {
        Self::Finite(3)
    }
}

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^(retry - 1)
    #[default]
    Exponential,
    /// delay = base * retry
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for a retry policy built from backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry bound per invocation.
    pub bound: RetryBound,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            bound: RetryBound::default(),
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry bound.
    #[must_use]
    pub fn with_bound(mut self, bound: RetryBound) -> Self {
        self.bound = bound;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Checks the delay bounds.
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        if self.max_delay_ms < self.base_delay_ms {
            return Err(PolicyConfigError::InvalidDelayBounds {
                base_delay_ms: self.base_delay_ms,
                max_delay_ms: self.max_delay_ms,
            });
        }
        Ok(())
    }

    /// Calculates the delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;
        let exponent = retry.saturating_sub(1);

        let delay = match self.backoff {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(exponent)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry.max(1))).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Re-invokes an operation on classified failures.
#[derive(Clone)]
pub struct RetryPolicy {
    name: String,
    classifier: Classifier,
    bound: RetryBound,
    delay: DelayFn,
    sink: Arc<dyn NotificationSink>,
}

impl RetryPolicy {
    /// Creates a retry policy with a caller-supplied delay function.
    pub fn new<F>(bound: RetryBound, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            name: "retry".to_string(),
            classifier: Classifier::any(),
            bound,
            delay: Arc::new(delay),
            sink: Arc::new(NoOpSink),
        }
    }

    /// Creates a policy that retries until success.
    pub fn forever<F>(delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::new(RetryBound::Unbounded, delay)
    }

    /// Creates a policy retrying `max_retries` times with a constant delay.
    #[must_use]
    pub fn constant(max_retries: u32, delay: Duration) -> Self {
        Self::new(RetryBound::Finite(max_retries), move |_| delay)
    }

    /// Creates a policy from a backoff configuration.
    pub fn from_config(config: &RetryConfig) -> Result<Self, PolicyConfigError> {
        config.validate()?;
        let config = config.clone();
        let bound = config.bound;
        Ok(Self::new(bound, move |retry| config.delay_for(retry)))
    }

    /// Restricts the failures this policy retries.
    #[must_use]
    pub fn handle(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the notification sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the policy name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the retry bound.
    #[must_use]
    pub fn bound(&self) -> RetryBound {
        self.bound
    }

    /// Returns the delay before retry number `retry`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        (self.delay)(retry)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("classifier", &self.classifier)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl<T> Policy<T> for RetryPolicy
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        Arc::new(RetryOperation {
            inner,
            policy: self.clone(),
        })
    }
}

struct RetryOperation<T> {
    inner: BoxOperation<T>,
    policy: RetryPolicy,
}

#[async_trait]
impl<T> Operation<T> for RetryOperation<T>
where
    T: Send + 'static,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        let policy = &self.policy;
        let mut retries: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(cancellation_failure(cancel));
            }

            let failure = match self.inner.call(cancel).await {
                Ok(value) => return Ok(value),
                Err(failure) => failure,
            };

            if cancel.is_cancelled() {
                return Err(cancellation_failure(cancel));
            }
            if failure.is_cancelled() || !policy.classifier.interested(&failure) {
                return Err(failure);
            }
            if !policy.bound.permits(retries) {
                debug!(policy = %policy.name, retries, error = %failure, "Retries exhausted");
                return Err(failure);
            }

            retries = retries.saturating_add(1);
            let delay = policy.delay_for(retries);
            debug!(
                policy = %policy.name,
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "Retrying after error"
            );
            policy.sink.notify(
                &Notification::new(
                    NotificationKind::RetryScheduled,
                    policy.name.as_str(),
                    format!("retry {retries} in {}ms after: {failure}", delay.as_millis()),
                )
                .with_attempt(retries)
                .with_delay(delay)
                .with_failure(&failure),
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancellation_failure(cancel)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
