//! Ordered composition of policies.

use super::Policy;
use crate::errors::PolicyConfigError;
use crate::operation::BoxOperation;
use std::fmt;
use std::sync::Arc;

/// An ordered list of policies applied outermost first.
///
/// `[fallback, retry, breaker]` wraps an operation as
/// `fallback(retry(breaker(operation)))`. A wrap is itself a [`Policy`],
/// so wraps nest.
pub struct PolicyWrap<T> {
    name: String,
    policies: Vec<Arc<dyn Policy<T>>>,
}

impl<T> PolicyWrap<T>
where
    T: Send + 'static,
{
    /// Creates a wrap from policies listed outermost first.
    pub fn new(policies: Vec<Arc<dyn Policy<T>>>) -> Result<Self, PolicyConfigError> {
        if policies.is_empty() {
            return Err(PolicyConfigError::EmptyWrap);
        }
        Ok(Self {
            name: "wrap".to_string(),
            policies,
        })
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> PolicyWrapBuilder<T> {
        PolicyWrapBuilder::new()
    }

    /// Sets the wrap name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the number of policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Always false: empty wraps cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Returns policy names, outermost first.
    #[must_use]
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }
}

impl<T> Clone for PolicyWrap<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policies: self.policies.clone(),
        }
    }
}

impl<T> fmt::Debug for PolicyWrap<T>
where
    T: Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyWrap")
            .field("name", &self.name)
            .field("policies", &self.policy_names())
            .finish()
    }
}

impl<T> Policy<T> for PolicyWrap<T>
where
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn wrap(&self, inner: BoxOperation<T>) -> BoxOperation<T> {
        self.policies
            .iter()
            .rev()
            .fold(inner, |operation, policy| policy.wrap(operation))
    }
}

/// Collects policies for a [`PolicyWrap`], outermost first.
pub struct PolicyWrapBuilder<T> {
    policies: Vec<Arc<dyn Policy<T>>>,
}

impl<T> PolicyWrapBuilder<T>
where
    T: Send + 'static,
{
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// Appends a policy inside the ones already added.
    #[must_use]
    pub fn policy<P>(mut self, policy: P) -> Self
    where
        P: Policy<T> + 'static,
    {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Appends an already shared policy.
    #[must_use]
    pub fn shared(mut self, policy: Arc<dyn Policy<T>>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Builds the wrap.
    pub fn build(self) -> Result<PolicyWrap<T>, PolicyConfigError> {
        PolicyWrap::new(self.policies)
    }
}

impl<T> Default for PolicyWrapBuilder<T>
where
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
