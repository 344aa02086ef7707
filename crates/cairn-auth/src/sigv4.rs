//! AWS Signature V4 verification
//!
//! Implements AWS Signature Version 4 header authentication for S3 requests.
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-authenticating-requests.html

use crate::authenticator::AuthRequest;
use crate::error::AuthError;
use crate::identity::{AuthInfo, StreamingV4Params};
use crate::store::CredentialStore;
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

type HmacSha256 = Hmac<Sha256>;

static AUTH_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"AWS4-HMAC-SHA256\s+Credential=([^/]+)/([^,]+),\s*SignedHeaders=([^,]+),\s*Signature=(\w+)",
    )
    .expect("static regex is valid")
});

/// A successfully verified request
#[derive(Debug, Clone)]
pub struct VerifiedRequest {
    pub auth_info: AuthInfo,
    /// Present when the body is sent as signed chunks
    pub streaming_v4_params: Option<StreamingV4Params>,
}

/// AWS Signature V4 verifier
pub struct SigV4Verifier {
    credentials: Arc<CredentialStore>,
    /// Service name (usually "s3")
    service: String,
    /// AWS region (e.g., "us-east-1")
    region: String,
}

impl SigV4Verifier {
    /// Create a new SigV4 verifier
    pub fn new(credentials: Arc<CredentialStore>, region: impl Into<String>) -> Self {
        Self {
            credentials,
            service: "s3".to_string(),
            region: region.into(),
        }
    }

    /// Verify a header-signed request
    pub fn verify(&self, request: &AuthRequest<'_>) -> Result<VerifiedRequest, AuthError> {
        let auth_header = request
            .authorization_header()
            .ok_or(AuthError::InvalidAuthHeader)?;

        let parsed = parse_authorization_header(auth_header)?;

        let date_str = get_request_date(request)?;
        let date = parse_date(&date_str)?;

        // Allow 15 minutes of clock skew
        let diff = Utc::now().signed_duration_since(date);
        if diff.num_minutes().abs() > 15 {
            return Err(AuthError::RequestExpired);
        }

        let account = self.credentials.lookup(&parsed.access_key_id)?;

        let canonical_request = build_canonical_request(request, &parsed.signed_headers)?;

        let date_stamp = date.format("%Y%m%d").to_string();
        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = build_string_to_sign(&canonical_request, &date_str, &credential_scope);

        let signing_key =
            derive_signing_key(&account.secret_key, &date_stamp, &self.region, &self.service);
        let calculated_signature = calculate_signature(&signing_key, &string_to_sign);

        if !constant_time_eq(&calculated_signature, &parsed.signature) {
            tracing::debug!(
                "Signature mismatch:\n  Canonical Request:\n{}\n  String to Sign:\n{}\n  Calculated: {}\n  Provided: {}",
                canonical_request,
                string_to_sign,
                calculated_signature,
                parsed.signature
            );
            return Err(AuthError::SignatureMismatch);
        }

        let streaming_v4_params = request.is_streaming_payload().then(|| StreamingV4Params {
            access_key: parsed.access_key_id.clone(),
            signature_from_request: parsed.signature.clone(),
            region: self.region.clone(),
            scope_date: date_stamp.clone(),
            timestamp: date_str.clone(),
            credential_scope: credential_scope.clone(),
        });

        Ok(VerifiedRequest {
            auth_info: account.auth_info(&parsed.access_key_id),
            streaming_v4_params,
        })
    }
}

/// Parsed authorization header
struct ParsedAuth {
    access_key_id: String,
    signed_headers: Vec<String>,
    signature: String,
}

/// Parse the Authorization header
///
/// Format: `AWS4-HMAC-SHA256 Credential=AKID/date/region/service/aws4_request,
/// SignedHeaders=host;x-amz-date, Signature=xxx`
fn parse_authorization_header(header: &str) -> Result<ParsedAuth, AuthError> {
    if !header.starts_with("AWS4-HMAC-SHA256") {
        return Err(AuthError::InvalidSignatureVersion);
    }

    let captures = AUTH_HEADER_RE
        .captures(header)
        .ok_or(AuthError::InvalidAuthHeader)?;
    let group = |i: usize| {
        captures
            .get(i)
            .map(|m| m.as_str())
            .ok_or(AuthError::InvalidAuthHeader)
    };

    Ok(ParsedAuth {
        access_key_id: group(1)?.to_string(),
        signed_headers: group(3)?.split(';').map(str::to_lowercase).collect(),
        signature: group(4)?.to_string(),
    })
}

/// Get the request date, preferring `x-amz-date`
fn get_request_date(request: &AuthRequest<'_>) -> Result<String, AuthError> {
    for name in ["x-amz-date", "date"] {
        if let Some(date) = request.headers.get(name) {
            return date
                .to_str()
                .map(ToString::to_string)
                .map_err(|_| AuthError::InvalidDateFormat);
        }
    }
    Err(AuthError::MissingDateHeader)
}

/// Parse ISO8601 basic format: 20130524T000000Z
fn parse_date(date_str: &str) -> Result<DateTime<Utc>, AuthError> {
    NaiveDateTime::parse_from_str(date_str, "%Y%m%dT%H%M%SZ")
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .map_err(|_| AuthError::InvalidDateFormat)
}

/// Build the canonical request string
fn build_canonical_request(
    request: &AuthRequest<'_>,
    signed_headers: &[String],
) -> Result<String, AuthError> {
    let canonical_uri = if request.path.is_empty() {
        "/"
    } else {
        request.path
    };

    let canonical_query = build_canonical_query_string(request.query.unwrap_or(""));

    let mut headers_map: BTreeMap<&str, String> = BTreeMap::new();
    for header_name in signed_headers {
        let value = request
            .headers
            .get(header_name.as_str())
            .ok_or_else(|| AuthError::MissingSignedHeader(header_name.clone()))?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?
            .trim()
            .to_string();
        headers_map.insert(header_name, value);
    }

    let canonical_headers: String = headers_map
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    let payload_hash = request
        .headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("UNSIGNED-PAYLOAD");

    Ok(format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers.join(";"),
        payload_hash
    ))
}

/// Build canonical query string (sorted parameters)
///
/// The incoming query string is already URL-encoded. Decode it first, then
/// re-encode using AWS's URI encoding rules.
fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| {
            let mut parts = param.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            (url_encode(&url_decode(key)), url_encode(&url_decode(value)))
        })
        .collect();

    params.sort();

    params
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the string to sign
fn build_string_to_sign(canonical_request: &str, date_str: &str, credential_scope: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        date_str,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    )
}

/// Derive the signing key
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Calculate the signature
fn calculate_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Calculate HMAC-SHA256
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Calculate SHA256 and return hex string
fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// URL encode a string (AWS style)
fn url_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{byte:02X}")),
        }
    }
    result
}

/// URL decode a string
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'%');
            }
            b'+' => out.push(b' '),
            other => out.push(other),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::STREAMING_PAYLOAD;
    use crate::store::Account;
    use http::HeaderMap;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

    fn verifier() -> SigV4Verifier {
        let store = CredentialStore::new();
        store.insert(
            "AKIDEXAMPLE",
            Account {
                canonical_id: "abc123".into(),
                display_name: "alice".into(),
                secret_key: SECRET.into(),
            },
        );
        SigV4Verifier::new(Arc::new(store), "us-east-1")
    }

    /// Sign `headers` in place the way a client would
    fn sign(method: &str, path: &str, query: Option<&str>, headers: &mut HeaderMap, secret: &str) {
        let now = Utc::now();
        let date_str = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        headers.insert("host", "localhost:8000".parse().unwrap());
        headers.insert("x-amz-date", date_str.parse().unwrap());
        if !headers.contains_key("x-amz-content-sha256") {
            headers.insert("x-amz-content-sha256", "UNSIGNED-PAYLOAD".parse().unwrap());
        }
        let signed = vec![
            "host".to_string(),
            "x-amz-content-sha256".to_string(),
            "x-amz-date".to_string(),
        ];
        let req = AuthRequest::new(method, path, headers).with_query(query);
        let canonical = build_canonical_request(&req, &signed).unwrap();
        let scope = format!("{date_stamp}/us-east-1/s3/aws4_request");
        let sts = build_string_to_sign(&canonical, &date_str, &scope);
        let key = derive_signing_key(secret, &date_stamp, "us-east-1", "s3");
        let signature = calculate_signature(&key, &sts);
        let header = format!(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/{scope}, SignedHeaders={}, Signature={signature}",
            signed.join(";")
        );
        headers.insert("authorization", header.parse().unwrap());
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("hello"), "hello");
        assert_eq!(url_encode("hello world"), "hello%20world");
        assert_eq!(url_encode("a/b"), "a%2Fb");
        assert_eq!(url_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a%2Fb"), "a/b");
        assert_eq!(url_decode("hello+world"), "hello world");
        assert_eq!(url_decode("%C3%A9"), "é");
        assert_eq!(url_decode("100%"), "100%");
    }

    #[test]
    fn test_canonical_query_sorted() {
        assert_eq!(
            build_canonical_query_string("prefix=a%2Fb&delimiter=%2F&acl"),
            "acl=&delimiter=%2F&prefix=a%2Fb"
        );
    }

    #[test]
    fn test_hex_sha256() {
        assert_eq!(
            hex_sha256(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("hello", "hello!"));
    }

    #[test]
    fn test_derive_signing_key() {
        let key = derive_signing_key(SECRET, "20130524", "us-east-1", "s3");
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_verify_signed_request() {
        let mut headers = HeaderMap::new();
        sign("GET", "/photos/a.jpg", Some("versionId=1"), &mut headers, SECRET);
        let req = AuthRequest::new("GET", "/photos/a.jpg", &headers).with_query(Some("versionId=1"));

        let verified = verifier().verify(&req).unwrap();
        assert_eq!(verified.auth_info.canonical_id, "abc123");
        assert!(verified.streaming_v4_params.is_none());
    }

    #[test]
    fn test_verify_wrong_secret() {
        let mut headers = HeaderMap::new();
        sign("GET", "/photos", None, &mut headers, "not-the-secret");
        let req = AuthRequest::new("GET", "/photos", &headers);
        assert!(matches!(
            verifier().verify(&req),
            Err(AuthError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_verify_streaming_payload() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-content-sha256", STREAMING_PAYLOAD.parse().unwrap());
        sign("PUT", "/photos/big.bin", None, &mut headers, SECRET);
        let req = AuthRequest::new("PUT", "/photos/big.bin", &headers);

        let params = verifier().verify(&req).unwrap().streaming_v4_params.unwrap();
        assert_eq!(params.access_key, "AKIDEXAMPLE");
        assert_eq!(params.region, "us-east-1");
        assert!(params.credential_scope.ends_with("/us-east-1/s3/aws4_request"));
    }

    #[test]
    fn test_unknown_access_key() {
        let mut headers = HeaderMap::new();
        sign("GET", "/", None, &mut headers, SECRET);
        let req = AuthRequest::new("GET", "/", &headers);
        let empty = SigV4Verifier::new(Arc::new(CredentialStore::new()), "us-east-1");
        assert!(matches!(
            empty.verify(&req),
            Err(AuthError::AccessKeyNotFound(_))
        ));
    }

    #[test]
    fn test_rejects_v2_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "AWS AKID:sig".parse().unwrap());
        let req = AuthRequest::new("GET", "/", &headers);
        assert!(matches!(
            verifier().verify(&req),
            Err(AuthError::InvalidSignatureVersion)
        ));
    }
}
