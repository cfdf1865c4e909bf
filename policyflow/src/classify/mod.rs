//! Outcome classification.
//!
//! A [`Classifier`] decides whether a policy is interested in a failure.
//! Classifiers are pure predicates and can be combined:
//!
//! ```rust,ignore
//! use policyflow::prelude::*;
//!
//! // Retry anything except a rejected call from an open circuit.
//! let retryable = Classifier::except(FailureKind::CircuitOpen);
//!
//! // Only transient failures or timeouts, and never cancellations.
//! let narrow = (Classifier::kind(FailureKind::Transient) | Classifier::kind(FailureKind::Timeout))
//!     & !Classifier::kind(FailureKind::Cancelled);
//! ```

use crate::errors::{Failure, FailureKind};
use std::error::Error as StdError;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Failure) -> bool + Send + Sync>;

/// A predicate selecting which failures a policy acts upon.
#[derive(Clone)]
pub struct Classifier {
    predicate: Predicate,
    description: String,
}

impl Classifier {
    /// Builds a classifier from an arbitrary predicate.
    pub fn predicate<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Failure) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            description: description.into(),
        }
    }

    /// Accepts every failure.
    #[must_use]
    pub fn any() -> Self {
        Self::predicate("any", |_| true)
    }

    /// Rejects every failure.
    #[must_use]
    pub fn none() -> Self {
        Self::predicate("none", |_| false)
    }

    /// Accepts failures of exactly this kind.
    #[must_use]
    pub fn kind(kind: FailureKind) -> Self {
        let description = format!("kind({kind})");
        Self::predicate(description, move |f| *f.kind() == kind)
    }

    /// Accepts failures whose kind is any of `kinds`.
    pub fn kinds<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = FailureKind>,
    {
        let kinds: Vec<FailureKind> = kinds.into_iter().collect();
        let description = format!(
            "kinds({})",
            kinds
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self::predicate(description, move |f| kinds.contains(f.kind()))
    }

    /// Accepts every failure except those of this kind.
    #[must_use]
    pub fn except(kind: FailureKind) -> Self {
        !Self::kind(kind)
    }

    /// Accepts failures whose underlying cause is an `E`.
    #[must_use]
    pub fn cause_is<E>() -> Self
    where
        E: StdError + 'static,
    {
        Self::predicate(
            format!("cause_is({})", std::any::type_name::<E>()),
            |f| f.downcast_cause::<E>().is_some(),
        )
    }

    /// Accepts failures both classifiers accept.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let description = format!("({} and {})", self.description, other.description);
        let (a, b) = (self.predicate, other.predicate);
        Self::predicate(description, move |f| a(f) && b(f))
    }

    /// Accepts failures either classifier accepts.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        let description = format!("({} or {})", self.description, other.description);
        let (a, b) = (self.predicate, other.predicate);
        Self::predicate(description, move |f| a(f) || b(f))
    }

    /// Returns true if the policy owning this classifier should act on `failure`.
    #[must_use]
    pub fn interested(&self, failure: &Failure) -> bool {
        (self.predicate)(failure)
    }

    /// Returns a human-readable description of the predicate.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Classifier").field(&self.description).finish()
    }
}

impl Not for Classifier {
    type Output = Self;

    fn not(self) -> Self {
        let description = format!("not {}", self.description);
        let inner = self.predicate;
        Self::predicate(description, move |f| !inner(f))
    }
}

impl BitAnd for Classifier {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for Classifier {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("dns lookup failed")]
    struct DnsError;

    #[test]
    fn test_any_and_none() {
        let failure = Failure::generic("x");
        assert!(Classifier::any().interested(&failure));
        assert!(!Classifier::none().interested(&failure));
        assert!(Classifier::default().interested(&failure));
    }

    #[test]
    fn test_kind_exact_match() {
        let classifier = Classifier::kind(FailureKind::Transient);
        assert!(classifier.interested(&Failure::transient("503")));
        assert!(!classifier.interested(&Failure::timeout("slow")));
    }

    #[test]
    fn test_kinds_set() {
        let classifier = Classifier::kinds([FailureKind::Transient, FailureKind::Timeout]);
        assert!(classifier.interested(&Failure::timeout("slow")));
        assert!(!classifier.interested(&Failure::generic("bad input")));
        assert_eq!(classifier.description(), "kinds(transient, timeout)");
    }

    #[test]
    fn test_except_circuit_open() {
        let classifier = Classifier::except(FailureKind::CircuitOpen);
        assert!(classifier.interested(&Failure::transient("503")));
        assert!(!classifier.interested(&Failure::circuit_open("breaker")));
    }

    #[test]
    fn test_custom_kind_match() {
        let throttled = FailureKind::Custom("throttled".to_string());
        let classifier = Classifier::kind(throttled.clone());
        assert!(classifier.interested(&Failure::new(throttled, "429")));
        assert!(!classifier.interested(&Failure::transient("503")));
    }

    #[test]
    fn test_cause_is() {
        let classifier = Classifier::cause_is::<DnsError>();
        let with_cause = Failure::generic("lookup").with_cause(DnsError);
        assert!(classifier.interested(&with_cause));
        assert!(!classifier.interested(&Failure::generic("lookup")));
    }

    #[test]
    fn test_combinators() {
        let transient_or_timeout =
            Classifier::kind(FailureKind::Transient) | Classifier::kind(FailureKind::Timeout);
        let not_timeout = !Classifier::kind(FailureKind::Timeout);
        let combined = transient_or_timeout & not_timeout;

        assert!(combined.interested(&Failure::transient("503")));
        assert!(!combined.interested(&Failure::timeout("slow")));
        assert!(!combined.interested(&Failure::generic("other")));
        assert_eq!(
            combined.description(),
            "((kind(transient) or kind(timeout)) and not kind(timeout))"
        );
    }
}
