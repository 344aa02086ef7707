//! Authentication outcome types

use serde::{Deserialize, Serialize};

/// Canonical id of the anonymous requester
pub const PUBLIC_CANONICAL_ID: &str =
    "http://acs.amazonaws.com/groups/global/AllUsers";

/// Resolved requester identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    /// Canonical account id
    pub canonical_id: String,
    /// Account display name
    pub display_name: String,
    /// ARN of the signing principal
    pub arn: String,
    /// Access key used to sign, if any
    #[serde(default)]
    pub access_key: Option<String>,
}

impl AuthInfo {
    /// Create an identity for an authenticated account
    pub fn new(
        canonical_id: impl Into<String>,
        display_name: impl Into<String>,
        arn: impl Into<String>,
    ) -> Self {
        Self {
            canonical_id: canonical_id.into(),
            display_name: display_name.into(),
            arn: arn.into(),
            access_key: None,
        }
    }

    /// Set the access key
    #[must_use]
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// The anonymous requester
    #[must_use]
    pub fn public() -> Self {
        Self::new(PUBLIC_CANONICAL_ID, "", "")
    }

    /// Whether this is the anonymous requester
    #[must_use]
    pub fn is_requester_public_user(&self) -> bool {
        self.canonical_id == PUBLIC_CANONICAL_ID
    }
}

/// Decision for one request context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    /// Operation the context named
    pub action: String,
    /// Resource the context addressed
    pub resource: String,
    pub is_allowed: bool,
}

/// Parameters needed to verify an `aws-chunked` streaming body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingV4Params {
    pub access_key: String,
    /// Seed signature from the Authorization header
    pub signature_from_request: String,
    pub region: String,
    /// `YYYYMMDD`
    pub scope_date: String,
    /// `x-amz-date` value
    pub timestamp: String,
    pub credential_scope: String,
}

/// Everything an authenticator returns for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub auth_info: AuthInfo,
    /// One result per context, in context order; `None` when no contexts
    /// were evaluated
    pub authorization_results: Option<Vec<AuthorizationResult>>,
    pub streaming_v4_params: Option<StreamingV4Params>,
}

impl AuthOutcome {
    /// Outcome for an anonymous request
    #[must_use]
    pub fn public() -> Self {
        Self {
            auth_info: AuthInfo::public(),
            authorization_results: None,
            streaming_v4_params: None,
        }
    }

    /// First denied result, if any context was denied
    #[must_use]
    pub fn first_denial(&self) -> Option<&AuthorizationResult> {
        self.authorization_results
            .as_deref()
            .and_then(|results| results.iter().find(|r| !r.is_allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(action: &str, is_allowed: bool) -> AuthorizationResult {
        AuthorizationResult {
            action: action.to_string(),
            resource: "arn:aws:s3:::bucket".to_string(),
            is_allowed,
        }
    }

    #[test]
    fn test_public_user() {
        assert!(AuthInfo::public().is_requester_public_user());
        assert!(!AuthInfo::new("abc", "alice", "arn:aws:iam::1:root").is_requester_public_user());
    }

    #[test]
    fn test_any_denial_is_found() {
        let mut outcome = AuthOutcome::public();
        assert!(outcome.first_denial().is_none());

        outcome.authorization_results = Some(vec![
            result("objectGet", true),
            result("objectPut", false),
        ]);
        assert_eq!(outcome.first_denial().unwrap().action, "objectPut");

        outcome.authorization_results = Some(vec![
            result("objectGet", false),
            result("objectPut", true),
        ]);
        assert_eq!(outcome.first_denial().unwrap().action, "objectGet");
    }
}
