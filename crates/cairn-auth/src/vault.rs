//! Remote authority client
//!
//! Forwards the request's signature material and authorization contexts to
//! an external authority over HTTP and maps its answer to an
//! [`AuthOutcome`]. The authority owns identity and policy decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::authenticator::{AuthRequest, Authenticator};
use crate::context::RequestContext;
use crate::error::AuthError;
use crate::identity::{AuthInfo, AuthOutcome, AuthorizationResult, StreamingV4Params};

/// Configuration for the remote authority
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
    /// Base URL, e.g. `http://127.0.0.1:8500`
    pub endpoint: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    2000
}

impl VaultConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Authentication request document
#[derive(Debug, Serialize)]
struct VaultRequest<'a> {
    method: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_contexts: Option<&'a [RequestContext]>,
}

#[derive(Debug, Deserialize)]
struct VaultError {
    code: String,
    #[serde(default)]
    message: String,
}

/// Authentication response document
#[derive(Debug, Deserialize)]
struct VaultResponse {
    #[serde(default)]
    error: Option<VaultError>,
    #[serde(default)]
    auth_info: Option<AuthInfo>,
    #[serde(default)]
    authorization_results: Option<Vec<AuthorizationResult>>,
    #[serde(default)]
    streaming_v4_params: Option<StreamingV4Params>,
}

impl VaultResponse {
    fn into_outcome(self) -> Result<AuthOutcome, AuthError> {
        if let Some(error) = self.error {
            return Err(AuthError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        let auth_info = self
            .auth_info
            .ok_or_else(|| AuthError::Internal("authority response has no identity".into()))?;
        Ok(AuthOutcome {
            auth_info,
            authorization_results: self.authorization_results,
            streaming_v4_params: self.streaming_v4_params,
        })
    }
}

/// Authenticator backed by a remote authority
pub struct VaultAuthenticator {
    config: VaultConfig,
    http_client: reqwest::Client,
}

impl VaultAuthenticator {
    /// Create a new remote authenticator
    pub fn new(config: VaultConfig) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the endpoint
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl Authenticator for VaultAuthenticator {
    fn name(&self) -> &str {
        "vault"
    }

    async fn do_auth(
        &self,
        request: &AuthRequest<'_>,
        contexts: Option<&[RequestContext]>,
    ) -> Result<AuthOutcome, AuthError> {
        let url = format!("{}/authenticate", self.config.endpoint.trim_end_matches('/'));

        let headers = request
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = VaultRequest {
            method: request.method,
            path: request.path,
            query: request.query,
            headers,
            source_ip: request.source_ip.map(|ip| ip.to_string()),
            request_contexts: contexts,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, endpoint = %self.config.endpoint, "authority unreachable");
                AuthError::Internal(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        match serde_json::from_str::<VaultResponse>(&text) {
            Ok(parsed) => parsed.into_outcome(),
            Err(e) => {
                tracing::error!(
                    status = %status,
                    error = %e,
                    "authority returned an unreadable response"
                );
                Err(AuthError::Internal(format!(
                    "authority returned status {status}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_error() {
        let response: VaultResponse = serde_json::from_str(
            r#"{"error":{"code":"SignatureDoesNotMatch","message":"bad sig"}}"#,
        )
        .unwrap();
        match response.into_outcome() {
            Err(AuthError::Remote { code, message }) => {
                assert_eq!(code, "SignatureDoesNotMatch");
                assert_eq!(message, "bad sig");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_response_with_results() {
        let response: VaultResponse = serde_json::from_str(
            r#"{
                "auth_info": {"canonical_id":"abc","display_name":"alice","arn":"arn:aws:iam::1:root"},
                "authorization_results": [
                    {"action":"objectGet","resource":"arn:aws:s3:::src/k","is_allowed":true},
                    {"action":"objectPut","resource":"arn:aws:s3:::dst/k","is_allowed":false}
                ]
            }"#,
        )
        .unwrap();
        let outcome = response.into_outcome().unwrap();
        assert_eq!(outcome.auth_info.canonical_id, "abc");
        assert_eq!(outcome.first_denial().unwrap().action, "objectPut");
        assert!(outcome.streaming_v4_params.is_none());
    }

    #[test]
    fn test_response_without_identity() {
        let response: VaultResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            response.into_outcome(),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn test_request_document_shape() {
        let body = VaultRequest {
            method: "GET",
            path: "/b",
            query: None,
            headers: BTreeMap::new(),
            source_ip: None,
            request_contexts: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["method"], "GET");
        assert!(json.get("query").is_none());
        assert!(json.get("request_contexts").is_none());
    }
}
