//! Notification values emitted by policies.

use crate::errors::{Failure, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The policy event a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A retry policy is about to wait and re-invoke the operation.
    RetryScheduled,
    /// A circuit breaker transitioned to open.
    BreakerOpened,
    /// A circuit breaker transitioned to half-open and will admit one trial call.
    BreakerHalfOpen,
    /// A circuit breaker transitioned back to closed.
    BreakerReset,
    /// A circuit breaker was manually held open.
    BreakerIsolated,
    /// A fallback policy substituted a value for a failure.
    FallbackTriggered,
}

impl NotificationKind {
    /// Returns the default severity for this kind.
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            Self::RetryScheduled | Self::BreakerHalfOpen => Severity::Warning,
            Self::BreakerOpened | Self::BreakerIsolated | Self::FallbackTriggered => {
                Severity::Error
            }
            Self::BreakerReset => Severity::Success,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryScheduled => write!(f, "retry.scheduled"),
            Self::BreakerOpened => write!(f, "breaker.opened"),
            Self::BreakerHalfOpen => write!(f, "breaker.half_open"),
            Self::BreakerReset => write!(f, "breaker.reset"),
            Self::BreakerIsolated => write!(f, "breaker.isolated"),
            Self::FallbackTriggered => write!(f, "fallback.triggered"),
        }
    }
}

/// Rendering category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Neutral progress information.
    Info,
    /// A recovery.
    Success,
    /// Something went wrong but is being handled.
    Warning,
    /// A failure was given up on or absorbed.
    Error,
}

/// An immutable, purely observational policy event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub kind: NotificationKind,
    /// How a sink should present it.
    pub severity: Severity,
    /// Name of the policy that emitted it.
    pub policy: String,
    /// Human-readable message.
    pub message: String,
    /// Retry attempt number, for retry notifications.
    pub attempt: Option<u32>,
    /// Retry delay or break duration, when relevant.
    pub delay: Option<Duration>,
    /// Kind of the triggering failure, if any.
    pub failure_kind: Option<FailureKind>,
    /// Message of the triggering failure, if any.
    pub failure_message: Option<String>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification with the kind's default severity.
    #[must_use]
    pub fn new(kind: NotificationKind, policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            policy: policy.into(),
            message: message.into(),
            attempt: None,
            delay: None,
            failure_kind: None,
            failure_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Sets the delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Records the triggering failure.
    #[must_use]
    pub fn with_failure(mut self, failure: &Failure) -> Self {
        self.failure_kind = Some(failure.kind().clone());
        self.failure_message = Some(failure.message().to_string());
        self
    }
}
