//! Error types for policyflow.
//!
//! [`Failure`] is the only value policies inspect when deciding whether to
//! retry, break or substitute. [`PolicyConfigError`] is returned when a policy
//! or composition is rejected at construction time.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable underlying cause of a failure.
pub type FailureCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Result alias used by operations and policies.
pub type PolicyResult<T> = Result<T, Failure>;

/// The category a failure belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A failure that is expected to go away when retried.
    Transient,
    /// A deadline elapsed before the operation completed.
    Timeout,
    /// A circuit breaker rejected the call without invoking the operation.
    CircuitOpen,
    /// The caller requested an abort.
    Cancelled,
    /// Any other failure.
    Generic,
    /// A caller-defined category.
    Custom(String),
}

impl Default for FailureKind {
    fn default() -> Self {
        Self::Generic
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Timeout => write!(f, "timeout"),
            Self::CircuitOpen => write!(f, "circuit_open"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Generic => write!(f, "generic"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// A tagged failure produced by an operation or a policy.
///
/// Failures are cheap to clone: the underlying cause is reference counted,
/// so a breaker can keep the last failure while the same value keeps
/// propagating outward.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
    #[source]
    cause: Option<FailureCause>,
}

impl Failure {
    /// Creates a new failure of the given kind.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Creates a transient failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Creates a circuit-open failure.
    #[must_use]
    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CircuitOpen, message)
    }

    /// Creates a cancellation failure.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, reason)
    }

    /// Creates a generic failure.
    #[must_use]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Generic, message)
    }

    /// Wraps an arbitrary error, using its display text as the message.
    #[must_use]
    pub fn from_error<E>(kind: FailureKind, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            message: error.to_string(),
            cause: Some(Arc::new(error)),
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Returns the failure kind.
    #[must_use]
    pub fn kind(&self) -> &FailureKind {
        &self.kind
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Attempts to view the underlying cause as a concrete error type.
    #[must_use]
    pub fn downcast_cause<E: StdError + 'static>(&self) -> Option<&E> {
        self.cause.as_deref().and_then(|c| c.downcast_ref::<E>())
    }

    /// Returns true if this failure reports a caller-requested abort.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }

    /// Returns true if a circuit breaker rejected the call.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.kind == FailureKind::CircuitOpen
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        let message = err.to_string();
        let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
        Self {
            kind: FailureKind::Generic,
            message,
            cause: Some(Arc::from(boxed)),
        }
    }
}

impl From<tokio::time::error::Elapsed> for Failure {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::from_error(FailureKind::Timeout, err)
    }
}

/// Errors raised when a policy or composition is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyConfigError {
    /// A wrap was built from an empty list of policies.
    #[error("policy wrap requires at least one policy")]
    EmptyWrap,

    /// A circuit breaker was configured to break after zero failures.
    #[error("circuit breaker failure threshold must be >= 1")]
    ZeroFailureThreshold,

    /// The retry delay cap is below the base delay.
    #[error("retry max_delay_ms ({max_delay_ms}) must be >= base_delay_ms ({base_delay_ms})")]
    InvalidDelayBounds {
        /// The configured base delay.
        base_delay_ms: u64,
        /// The configured delay cap.
        max_delay_ms: u64,
    },
}
