//! Execution pipeline.
//!
//! A [`Pipeline`] owns a composed policy and is the single call surface:
//! it wraps an operation, races the call against the caller's
//! cancellation token, and returns either a value or the final failure
//! no policy absorbed.

mod integration_tests;

use crate::cancellation::{cancellation_failure, CancellationToken};
use crate::errors::{Failure, PolicyConfigError};
use crate::operation::{BoxOperation, Operation};
use crate::policy::{NoOpPolicy, Policy, PolicyWrapBuilder};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, debug_span, Instrument};
use uuid::Uuid;

/// Runs an already composed operation under `cancel`.
///
/// Returns a cancellation failure as soon as the token fires, even if the
/// operation itself does not observe it.
pub async fn execute<T, O>(operation: &O, cancel: &CancellationToken) -> Result<T, Failure>
where
    T: Send + 'static,
    O: Operation<T> + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(cancellation_failure(cancel));
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancellation_failure(cancel)),
        result = operation.call(cancel) => result,
    }
}

/// Outcome of one top-level execution with timing.
#[derive(Debug)]
pub struct ExecutionReport<T> {
    /// Unique id, also recorded on the `policy.execute` span.
    pub execution_id: Uuid,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Time from start to final outcome, retries and fallbacks included.
    pub elapsed: Duration,
    /// The final outcome.
    pub result: Result<T, Failure>,
}

impl<T> ExecutionReport<T> {
    /// Returns true if the execution produced a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Consumes the report, returning the outcome.
    pub fn into_result(self) -> Result<T, Failure> {
        self.result
    }
}

/// A policy composition ready to run operations.
pub struct Pipeline<T> {
    name: String,
    policy: Arc<dyn Policy<T>>,
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    /// Creates a pipeline around one policy, usually a wrap.
    pub fn new<P>(policy: P) -> Self
    where
        P: Policy<T> + 'static,
    {
        Self {
            name: "pipeline".to_string(),
            policy: Arc::new(policy),
        }
    }

    /// Creates a pipeline that applies no policy.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::new(NoOpPolicy)
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder<T> {
        PipelineBuilder::new()
    }

    /// Sets the pipeline name used in logs.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wraps `operation` in the pipeline's policies.
    pub fn compose<O>(&self, operation: O) -> BoxOperation<T>
    where
        O: Operation<T> + 'static,
    {
        self.policy.wrap(Arc::new(operation))
    }

    /// Runs `operation` under the pipeline's policies.
    pub async fn execute<O>(&self, operation: O, cancel: &CancellationToken) -> Result<T, Failure>
    where
        O: Operation<T> + 'static,
    {
        self.run(Uuid::new_v4(), operation, cancel).await
    }

    /// Runs `operation` and reports its timing alongside the outcome.
    pub async fn execute_and_capture<O>(
        &self,
        operation: O,
        cancel: &CancellationToken,
    ) -> ExecutionReport<T>
    where
        O: Operation<T> + 'static,
    {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        let result = self.run(execution_id, operation, cancel).await;

        ExecutionReport {
            execution_id,
            started_at,
            elapsed: start.elapsed(),
            result,
        }
    }

    async fn run<O>(&self, execution_id: Uuid, operation: O, cancel: &CancellationToken) -> Result<T, Failure>
    where
        O: Operation<T> + 'static,
    {
        let composed = self.compose(operation);
        let span = debug_span!(
            "policy.execute",
            pipeline = %self.name,
            execution_id = %execution_id
        );

        async move {
            let result = execute(&composed, cancel).await;
            match &result {
                Ok(_) => debug!("Execution succeeded"),
                Err(failure) => debug!(kind = %failure.kind(), error = %failure, "Execution failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("policy", &self.policy.name())
            .finish()
    }
}

/// Builder for [`Pipeline`], taking policies outermost first.
pub struct PipelineBuilder<T> {
    name: Option<String>,
    policies: PolicyWrapBuilder<T>,
}

impl<T> PipelineBuilder<T>
where
    T: Send + 'static,
{
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            policies: PolicyWrapBuilder::new(),
        }
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a policy inside the ones already added.
    #[must_use]
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Policy<T> + 'static,
    {
        self.policies = self.policies.policy(policy);
        self
    }

    /// Appends an already shared policy.
    #[must_use]
    pub fn shared(mut self, policy: Arc<dyn Policy<T>>) -> Self {
        self.policies = self.policies.shared(policy);
        self
    }

    /// Builds the pipeline. Fails if no policy was added.
    pub fn build(self) -> Result<Pipeline<T>, PolicyConfigError> {
        let wrap = self.policies.build()?;
        let pipeline = Pipeline::new(wrap);
        Ok(match self.name {
            Some(name) => pipeline.named(name),
            None => pipeline,
        })
    }
}

impl<T> Default for PipelineBuilder<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
