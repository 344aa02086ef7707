//! Builtin authenticator
//!
//! Verifies SigV4 header signatures against the local credential store and
//! decides each request context with a pluggable [`ContextEvaluator`].
//! Requests without credentials authenticate as the public user and carry
//! no authorization results; handlers apply bucket ACLs to them.

use async_trait::async_trait;
use std::sync::Arc;

use crate::authenticator::{AuthRequest, Authenticator};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::evaluator::{ContextEvaluator, Decision, FailClosed};
use crate::identity::{AuthOutcome, AuthorizationResult};
use crate::sigv4::SigV4Verifier;
use crate::store::CredentialStore;

/// Local SigV4 authenticator
pub struct BuiltinAuthenticator {
    verifier: SigV4Verifier,
    evaluator: FailClosed,
}

impl BuiltinAuthenticator {
    /// Create a builtin authenticator
    pub fn new(
        credentials: Arc<CredentialStore>,
        region: impl Into<String>,
        evaluator: Arc<dyn ContextEvaluator>,
    ) -> Self {
        Self {
            verifier: SigV4Verifier::new(credentials, region),
            evaluator: FailClosed::new(evaluator),
        }
    }
}

#[async_trait]
impl Authenticator for BuiltinAuthenticator {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn do_auth(
        &self,
        request: &AuthRequest<'_>,
        contexts: Option<&[RequestContext]>,
    ) -> Result<AuthOutcome, AuthError> {
        if request.authorization_header().is_none() {
            if request.has_presigned_query() {
                tracing::debug!("presigned query authentication is not supported");
                return Err(AuthError::UnsupportedAuthMethod);
            }
            tracing::trace!("no credentials, authenticating as public user");
            return Ok(AuthOutcome::public());
        }

        let verified = self.verifier.verify(request)?;

        let authorization_results = match contexts {
            Some(contexts) => {
                let mut results = Vec::with_capacity(contexts.len());
                for context in contexts {
                    let decision = self.evaluator.decide(&verified.auth_info, context).await;
                    results.push(AuthorizationResult {
                        action: context.api_method.clone(),
                        resource: context.resource(),
                        is_allowed: decision == Decision::Allow,
                    });
                }
                Some(results)
            }
            None => None,
        };

        Ok(AuthOutcome {
            auth_info: verified.auth_info,
            authorization_results,
            streaming_v4_params: verified.streaming_v4_params,
        })
    }
}
