//! Fallback policy: substitutes a value or action result for a failure.

use super::Policy;
use crate::cancellation::{cancellation_failure, CancellationToken};
use crate::classify::Classifier;
use crate::errors::Failure;
use crate::notify::{NoOpSink, Notification, NotificationKind, NotificationSink};
use crate::operation::{BoxOperation, Operation};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

type ActionFn<T> =
    Arc<dyn Fn(Failure, CancellationToken) -> BoxFuture<'static, Result<T, Failure>> + Send + Sync>;

/// Hook run with the triggering failure before the substitute is produced.
pub type FallbackHook = Arc<dyn Fn(&Failure) -> Result<(), Failure> + Send + Sync>;

/// What a fallback produces in place of a failure.
pub enum FallbackAction<T> {
    /// A fixed value, cloned per use.
    Value(T),
    /// An async action receiving the triggering failure.
    Action(ActionFn<T>),
}

impl<T: Clone> Clone for FallbackAction<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Action(action) => Self::Action(Arc::clone(action)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FallbackAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// Replaces classified failures with a substitute result.
///
/// Successes and unclassified failures pass through untouched. A failure
/// raised by the hook or the action propagates as the call's result.
pub struct FallbackPolicy<T> {
    name: String,
    classifier: Classifier,
    action: FallbackAction<T>,
    on_fallback: Option<FallbackHook>,
    sink: Arc<dyn NotificationSink>,
}

impl<T> FallbackPolicy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from_action(action: FallbackAction<T>) -> Self {
        Self {
            name: "fallback".to_string(),
            classifier: Classifier::any(),
            action,
            on_fallback: None,
            sink: Arc::new(NoOpSink),
        }
    }

    /// Substitutes a fixed value.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::from_action(FallbackAction::Value(value))
    }

    /// Substitutes the result of an async action.
    pub fn with_action<F, Fut>(action: F) -> Self
    where
        F: Fn(Failure, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
    {
        Self::from_action(FallbackAction::Action(Arc::new(move |failure, cancel| {
            Box::pin(action(failure, cancel))
        })))
    }

    /// Restricts the failures this policy substitutes.
    #[must_use]
    pub fn handle(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Runs `hook` with the failure before the substitute is produced.
    #[must_use]
    pub fn on_fallback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Failure) -> Result<(), Failure> + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(hook));
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
}

impl<T: Clone> Clone for FallbackPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            classifier: self.classifier.clone(),
            action: self.action.clone(),
            on_fallback: self.on_fallback.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for FallbackPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("name", &self.name)
            .field("classifier", &self.classifier)
            .field("action", &self.action)
            .field("has_hook", &self.on_fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Policy<T> for FallbackPolicy<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        Arc::new(FallbackOperation {
            inner,
            policy: self.clone(),
        })
    }
}

struct FallbackOperation<T> {
    inner: BoxOperation<T>,
    policy: FallbackPolicy<T>,
}

#[async_trait]
impl<T> Operation<T> for FallbackOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn call(&self, cancel: &CancellationToken) -> Result<T, Failure> {
        let failure = match self.inner.call(cancel).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        if cancel.is_cancelled() {
            return Err(cancellation_failure(cancel));
        }
        let policy = &self.policy;
        if failure.is_cancelled() || !policy.classifier.interested(&failure) {
            return Err(failure);
        }

        info!(policy = %policy.name, error = %failure, "Falling back");
        policy.sink.notify(
            &Notification::new(
                NotificationKind::FallbackTriggered,
                policy.name.as_str(),
                format!("fallback for: {failure}"),
            )
            .with_failure(&failure),
        );

        if let Some(hook) = &policy.on_fallback {
            hook(&failure)?;
        }

        match &policy.action {
            FallbackAction::Value(value) => Ok(value.clone()),
            FallbackAction::Action(action) => action(failure, cancel.clone()).await,
        }
    }
}
