//! Per-context policy evaluation for the builtin authenticator

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::identity::AuthInfo;

/// Decision for one context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Decides whether an identity may perform a context's operation
#[async_trait]
pub trait ContextEvaluator: Send + Sync {
    /// Evaluator name for logging
    fn name(&self) -> &str;

    /// Evaluate one context
    async fn evaluate(
        &self,
        identity: &AuthInfo,
        context: &RequestContext,
    ) -> Result<Decision, AuthError>;
}

/// Evaluator wrapper that denies when the inner evaluator fails
pub struct FailClosed {
    inner: Arc<dyn ContextEvaluator>,
}

impl FailClosed {
    pub fn new(inner: Arc<dyn ContextEvaluator>) -> Self {
        Self { inner }
    }

    /// Evaluate, treating evaluator errors as denials
    pub async fn decide(&self, identity: &AuthInfo, context: &RequestContext) -> Decision {
        match self.inner.evaluate(identity, context).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    "Policy evaluator {} failed for {}: {}",
                    self.inner.name(),
                    context.api_method,
                    e
                );
                Decision::Deny
            }
        }
    }
}

/// Allows every context
pub struct AllowAllEvaluator;

#[async_trait]
impl ContextEvaluator for AllowAllEvaluator {
    fn name(&self) -> &str {
        "allow-all"
    }

    async fn evaluate(
        &self,
        _identity: &AuthInfo,
        _context: &RequestContext,
    ) -> Result<Decision, AuthError> {
        Ok(Decision::Allow)
    }
}

/// Denies every context
pub struct DenyAllEvaluator;

#[async_trait]
impl ContextEvaluator for DenyAllEvaluator {
    fn name(&self) -> &str {
        "deny-all"
    }

    async fn evaluate(
        &self,
        _identity: &AuthInfo,
        _context: &RequestContext,
    ) -> Result<Decision, AuthError> {
        Ok(Decision::Deny)
    }
}
