//! The authenticator contract
//!
//! The dispatcher hands every non-bypass request to an [`Authenticator`]
//! together with the authorization contexts built for it. The authenticator
//! resolves the identity and decides each context.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::AuthError;
use crate::identity::AuthOutcome;

/// Streaming SigV4 payload marker in `x-amz-content-sha256`
pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";

/// Request view used for authentication
#[derive(Debug)]
pub struct AuthRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Request path, still percent-encoded
    pub path: &'a str,
    /// HTTP headers
    pub headers: &'a http::HeaderMap,
    /// Raw query string
    pub query: Option<&'a str>,
    /// Source IP address
    pub source_ip: Option<std::net::IpAddr>,
}

impl<'a> AuthRequest<'a> {
    /// Create a new auth request
    pub const fn new(method: &'a str, path: &'a str, headers: &'a http::HeaderMap) -> Self {
        Self {
            method,
            path,
            headers,
            query: None,
            source_ip: None,
        }
    }

    /// Set query string
    #[must_use]
    pub const fn with_query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    /// Set source IP
    #[must_use]
    pub const fn with_source_ip(mut self, ip: Option<std::net::IpAddr>) -> Self {
        self.source_ip = ip;
        self
    }

    /// Get Authorization header value
    pub fn authorization_header(&self) -> Option<&str> {
        self.headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Check if request has AWS SigV4 header authentication
    pub fn has_sigv4_auth(&self) -> bool {
        self.authorization_header()
            .is_some_and(|s| s.starts_with("AWS4-HMAC-SHA256"))
    }

    /// Check if the query string carries presigned credentials
    pub fn has_presigned_query(&self) -> bool {
        self.query.is_some_and(|q| {
            q.split('&').any(|pair| {
                let name = pair.split('=').next().unwrap_or("");
                name == "X-Amz-Algorithm" || name == "Signature"
            })
        })
    }

    /// Check if the body is sent as signed `aws-chunked` frames
    pub fn is_streaming_payload(&self) -> bool {
        self.headers
            .get("x-amz-content-sha256")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == STREAMING_PAYLOAD)
    }
}

/// Resolves identity and authorizes request contexts
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticator name for logging
    fn name(&self) -> &str;

    /// Authenticate the request and decide every context.
    ///
    /// `contexts` is `None` when authorization is deferred to the handler.
    async fn do_auth(
        &self,
        request: &AuthRequest<'_>,
        contexts: Option<&[RequestContext]>,
    ) -> Result<AuthOutcome, AuthError>;
}
