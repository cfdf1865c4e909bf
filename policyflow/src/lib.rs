//! # Policyflow
//!
//! Composable resilience policies for async operations.
//!
//! Policyflow wraps an operation that may fail in an ordered stack of
//! policies and runs it through a single entry point:
//!
//! - **Retry**: re-invoke on classified failures, with backoff and jitter
//! - **Circuit breaker**: stop calling a failing dependency for a cooldown
//! - **Fallback**: substitute a value or an action's result for a failure
//! - **Policy wrap**: compose policies outermost first; wraps nest
//! - **Cancellation**: one token threaded through every suspension point
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use policyflow::prelude::*;
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(4, Duration::from_secs(3))?;
//! let pipeline = Pipeline::builder()
//!     .policy(FallbackPolicy::with_value("cached".to_string())
//!         .handle(Classifier::kind(FailureKind::CircuitOpen)))
//!     .policy(RetryPolicy::forever(|_| Duration::from_millis(200))
//!         .handle(Classifier::except(FailureKind::CircuitOpen)))
//!     .policy(breaker)
//!     .build()?;
//!
//! let value = pipeline
//!     .execute(operation_fn(|_cancel| fetch_greeting()), &CancellationToken::new())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod classify;
pub mod errors;
pub mod notify;
pub mod observability;
pub mod operation;
pub mod pipeline;
pub mod policy;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::classify::Classifier;
    pub use crate::errors::{Failure, FailureKind, PolicyConfigError, PolicyResult};
    pub use crate::notify::{
        CollectingSink, LoggingSink, NoOpSink, Notification, NotificationKind,
        NotificationSink, Severity,
    };
    pub use crate::operation::{operation_fn, BoxOperation, Operation, TimeoutOperation};
    pub use crate::pipeline::{execute, ExecutionReport, Pipeline, PipelineBuilder};
    pub use crate::policy::{
        CircuitBreaker, CircuitBreakerConfig, CircuitState, FallbackPolicy, NoOpPolicy,
        Policy, PolicyWrap, RetryBound, RetryConfig, RetryPolicy,
    };
}
