//! Circuit breaker for protecting a failing dependency.
//!
//! # States
//! - Closed: calls pass through, classified failures are counted
//! - Open: calls fail fast with a circuit-open failure
//! - Half-Open: exactly one trial call is let through
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive classified failures >= threshold
//! Open → Half-Open: first call after the break duration elapsed
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (fresh break window)
//! ```
//!
//! All transitions happen under one mutex owned by the breaker instance.
//! Notifications are emitted after the lock is released, so a sink that
//! reads [`CircuitBreaker::state`] sees the state it is being told about.

use super::Policy;
use crate::cancellation::{cancellation_failure, CancellationToken};
use crate::classify::Classifier;
use crate::errors::{Failure, PolicyConfigError};
use crate::notify::{NoOpSink, Notification, NotificationKind, NotificationSink};
use crate::operation::{BoxOperation, Operation};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The phase a circuit breaker is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    #[default]
    Closed,
    /// Calls are rejected without invoking the operation.
    Open,
    /// One trial call is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Serializable circuit breaker parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive classified failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call, in milliseconds.
    pub break_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the break duration.
    #[must_use]
    pub fn with_break_duration_ms(mut self, duration: u64) -> Self {
        self.break_duration_ms = duration;
        self
    }

    /// Returns the break duration.
    #[must_use]
    pub fn break_duration(&self) -> Duration {
        Duration::from_millis(self.break_duration_ms)
    }

    /// Checks the configuration.
    pub fn validate(&self) -> Result<(), PolicyConfigError> {
        if self.failure_threshold == 0 {
            return Err(PolicyConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    phase: CircuitState,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
    isolated: bool,
    last_failure: Option<Failure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// Stops calling a failing dependency for a cooldown period.
///
/// Clones are handles to the same breaker: they share one state cell, so
/// every operation wrapped by any clone trips and resets together.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    classifier: Classifier,
    failure_threshold: u32,
    break_duration: Duration,
    sink: Arc<dyn NotificationSink>,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    /// Creates a breaker that opens after `failure_threshold` consecutive
    /// classified failures and stays open for `break_duration`.
    pub fn new(failure_threshold: u32, break_duration: Duration) -> Result<Self, PolicyConfigError> {
        if failure_threshold == 0 {
            return Err(PolicyConfigError::ZeroFailureThreshold);
        }
        Ok(Self {
            name: "circuit-breaker".to_string(),
            classifier: Classifier::any(),
            failure_threshold,
            break_duration,
            sink: Arc::new(NoOpSink),
            state: Arc::new(Mutex::new(BreakerState::default())),
        })
    }

    /// Creates a breaker from a config.
    pub fn from_config(config: &CircuitBreakerConfig) -> Result<Self, PolicyConfigError> {
        config.validate()?;
        Self::new(config.failure_threshold, config.break_duration())
    }

    /// Restricts the failures this breaker counts.
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

    /// Sets the breaker name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the current phase.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().phase
    }

    /// Returns the consecutive classified failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Returns the last classified failure seen since the last reset.
    #[must_use]
    pub fn last_failure(&self) -> Option<Failure> {
        self.state.lock().last_failure.clone()
    }

    /// Returns the configured threshold.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns the configured break duration.
    #[must_use]
    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Holds the circuit open until [`reset`](Self::reset) is called.
    pub fn isolate(&self) {
        {
            let mut state = self.state.lock();
            state.phase = CircuitState::Open;
            state.open_until = None;
            state.trial_in_flight = false;
            state.isolated = true;
        }
        warn!(breaker = %self.name, "Circuit manually isolated");
        self.sink.notify(&Notification::new(
            NotificationKind::BreakerIsolated,
            self.name.as_str(),
            "circuit held open manually",
        ));
    }

    /// Forces the circuit closed and clears the failure count.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            *state = BreakerState::default();
        }
        info!(breaker = %self.name, "Circuit manually reset");
        self.sink.notify(&Notification::new(
            NotificationKind::BreakerReset,
            self.name.as_str(),
            "circuit closed manually",
        ));
    }

    fn open_failure(&self, state: &BreakerState) -> Failure {
        let message = if state.isolated {
            format!("circuit '{}' is isolated", self.name)
        } else {
            format!("circuit '{}' is open", self.name)
        };
        let failure = Failure::circuit_open(message);
        match &state.last_failure {
            Some(last) => failure.with_cause(last.clone()),
            None => failure,
        }
    }

    fn acquire(&self) -> Result<Permit, Failure> {
        let mut transition = None;
        let permit = {
            let mut state = self.state.lock();
            let (phase, open_until) = (state.phase, state.open_until);
            match phase {
                CircuitState::Closed => Ok(Permit::Normal),
                CircuitState::Open => match open_until {
                    Some(until) if Instant::now() >= until => {
                        state.phase = CircuitState::HalfOpen;
                        state.trial_in_flight = true;
                        transition = Some(Notification::new(
                            NotificationKind::BreakerHalfOpen,
                            self.name.as_str(),
                            "half-open: next call is a trial",
                        ));
                        Ok(Permit::Trial)
                    }
                    _ => Err(self.open_failure(&state)),
                },
                CircuitState::HalfOpen => {
                    if state.trial_in_flight {
                        Err(self.open_failure(&state))
                    } else {
                        state.trial_in_flight = true;
                        Ok(Permit::Trial)
                    }
                }
            }
        };

        if let Some(notification) = transition {
            info!(breaker = %self.name, "Circuit half-open, admitting trial call");
            self.sink.notify(&notification);
        }
        if permit.is_err() {
            debug!(breaker = %self.name, "Call rejected by open circuit");
        }
        permit
    }

    fn on_success(&self, permit: Permit) {
        let mut transition = None;
        {
            let mut state = self.state.lock();
            match permit {
                Permit::Trial if state.phase == CircuitState::HalfOpen => {
                    *state = BreakerState::default();
                    transition = Some(Notification::new(
                        NotificationKind::BreakerReset,
                        self.name.as_str(),
                        "trial call succeeded, circuit closed",
                    ));
                }
                Permit::Normal if state.phase == CircuitState::Closed => {
                    state.consecutive_failures = 0;
                }
                _ => {}
            }
        }

        if let Some(notification) = transition {
            info!(breaker = %self.name, "Circuit closed");
            self.sink.notify(&notification);
        }
    }

    fn on_failure(&self, permit: Permit, failure: Failure) -> Failure {
        if failure.is_cancelled() || !self.classifier.interested(&failure) {
            if permit == Permit::Trial {
                self.release_trial();
            }
            return failure;
        }

        let mut transition = None;
        let outcome = {
            let mut state = self.state.lock();
            state.last_failure = Some(failure.clone());
            let trips = match permit {
                Permit::Trial => state.phase == CircuitState::HalfOpen,
                Permit::Normal if state.phase == CircuitState::Closed => {
                    state.consecutive_failures += 1;
                    state.consecutive_failures >= self.failure_threshold
                }
                Permit::Normal => false,
            };

            if trips {
                state.phase = CircuitState::Open;
                // A window past the clock's range stays open until reset.
                state.open_until = Instant::now().checked_add(self.break_duration);
                state.trial_in_flight = false;
                transition = Some(
                    Notification::new(
                        NotificationKind::BreakerOpened,
                        self.name.as_str(),
                        format!(
                            "breaking the circuit for {}ms due to: {failure}",
                            self.break_duration.as_millis()
                        ),
                    )
                    .with_delay(self.break_duration)
                    .with_failure(&failure),
                );
                self.open_failure(&state)
            } else {
                failure
            }
        };

        if transition.is_some() {
            warn!(
                breaker = %self.name,
                break_ms = u64::try_from(self.break_duration.as_millis()).unwrap_or(u64::MAX),
                "Circuit opened"
            );
        }
        if let Some(notification) = transition {
            self.sink.notify(&notification);
        }
        outcome
    }

    fn release_trial(&self) {
        let mut state = self.state.lock();
        if state.phase == CircuitState::HalfOpen {
            state.trial_in_flight = false;
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("classifier", &self.classifier)
            .field("failure_threshold", &self.failure_threshold)
            .field("break_duration", &self.break_duration)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T> Policy<T> for CircuitBreaker
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        Arc::new(BreakerOperation {
            inner,
            breaker: self.clone(),
        })
    }
}

/// Releases an unsettled trial slot when a call is dropped mid-flight.
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    settled: bool,
}

impl PermitGuard<'_> {
    fn settle(mut self) -> Permit {
        self.settled = true;
        self.permit
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.permit == Permit::Trial {
            self.breaker.release_trial();
        }
    }
}

struct BreakerOperation<T> {
    inner: BoxOperation<T>,
    breaker: CircuitBreaker,
}

#[async_trait]
impl<T> Operation<T> for BreakerOperation<T>
where
    T: Send + 'static,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        let guard = PermitGuard {
            breaker: &self.breaker,
            permit: self.breaker.acquire()?,
            settled: false,
        };

        let result = self.inner.call(cancel).await;
        let permit = guard.settle();
        match result {
            Ok(value) => {
                self.breaker.on_success(permit);
                Ok(value)
            }
            Err(_) if cancel.is_cancelled() => {
                Err(self.breaker.on_failure(permit, cancellation_failure(cancel)))
            }
            Err(failure) => Err(self.breaker.on_failure(permit, failure)),
        }
    }
}
