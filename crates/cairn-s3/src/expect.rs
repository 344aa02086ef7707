//! `Expect: 100-continue` handling
//!
//! The interim response is decided from two vantage points. Before
//! authentication only protocol hints are known; afterwards the identity is
//! too. The two policies split V4 requests so each gets one interim
//! response.

use cairn_auth::AuthInfo;
use http::HeaderMap;
use std::collections::BTreeMap;

const CONTINUE: &str = "100-continue";

/// Receives the continue decision for a request.
///
/// The transport owns the wire: a server that answers `100-continue` on its
/// own when the body is first read is free to treat this as a notification.
pub trait InterimResponder: Send + Sync {
    fn write_continue(&self, request_id: &str);
}

/// Signature scheme signals visible before authentication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureHints {
    pub v2: bool,
    pub v4: bool,
    pub streaming: bool,
}

impl SignatureHints {
    pub fn detect(headers: &HeaderMap, query: &BTreeMap<String, String>) -> Self {
        let mut v2 = query.contains_key("Signature");
        let mut v4 = query.contains_key("X-Amz-Algorithm");
        if let Some(auth) = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            v2 = auth.starts_with("AWS ");
            v4 = auth.starts_with("AWS4");
        }
        let streaming = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "application/octet-stream");
        Self { v2, v4, streaming }
    }
}

fn expects_continue(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::EXPECT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(CONTINUE))
}

/// Whether to emit `100 Continue` now.
///
/// `auth_info` is `None` before authentication.
pub fn should_continue(
    headers: &HeaderMap,
    query: &BTreeMap<String, String>,
    auth_info: Option<&AuthInfo>,
) -> bool {
    if !expects_continue(headers) {
        return false;
    }
    let hints = SignatureHints::detect(headers, query);
    match auth_info {
        Some(info) => {
            info.is_requester_public_user() || hints.v2 || (hints.v4 && !hints.streaming)
        }
        None => hints.v4 && hints.streaming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, value.parse().unwrap());
        }
        map
    }

    fn user() -> AuthInfo {
        AuthInfo::new("abc123", "alice", "arn:aws:iam::1:user/alice")
    }

    const V4: &str = "AWS4-HMAC-SHA256 Credential=AK/20250101/us-east-1/s3/aws4_request";
    const OCTET: &str = "application/octet-stream";

    #[test]
    fn test_no_expect_header_never_continues() {
        let h = headers(&[("authorization", V4)]);
        assert!(!should_continue(&h, &BTreeMap::new(), None));
        assert!(!should_continue(&h, &BTreeMap::new(), Some(&user())));
    }

    #[test]
    fn test_v4_streaming_continues_before_auth_only() {
        let h = headers(&[
            ("expect", "100-Continue"),
            ("authorization", V4),
            ("content-type", OCTET),
        ]);
        assert!(should_continue(&h, &BTreeMap::new(), None));
        assert!(!should_continue(&h, &BTreeMap::new(), Some(&user())));
    }

    #[test]
    fn test_v4_non_streaming_continues_after_auth_only() {
        let h = headers(&[
            ("expect", "100-continue"),
            ("authorization", V4),
            ("content-type", "text/plain"),
        ]);
        assert!(!should_continue(&h, &BTreeMap::new(), None));
        assert!(should_continue(&h, &BTreeMap::new(), Some(&user())));
    }

    #[test]
    fn test_v2_continues_after_auth() {
        let h = headers(&[
            ("expect", "100-continue"),
            ("authorization", "AWS AK:sig"),
            ("content-type", OCTET),
        ]);
        assert!(!should_continue(&h, &BTreeMap::new(), None));
        assert!(should_continue(&h, &BTreeMap::new(), Some(&user())));
    }

    #[test]
    fn test_public_caller_always_continues_after_auth() {
        let h = headers(&[("expect", "100-continue"), ("content-type", OCTET)]);
        assert!(!should_continue(&h, &BTreeMap::new(), None));
        assert!(should_continue(&h, &BTreeMap::new(), Some(&AuthInfo::public())));
    }

    #[test]
    fn test_authorization_header_overrides_query() {
        let h = headers(&[("authorization", "AWS AK:sig")]);
        let query = BTreeMap::from([("X-Amz-Algorithm".to_string(), "AWS4-HMAC-SHA256".to_string())]);
        let hints = SignatureHints::detect(&h, &query);
        assert!(hints.v2);
        assert!(!hints.v4);

        let presigned = SignatureHints::detect(&HeaderMap::new(), &query);
        assert!(presigned.v4);
    }
}
