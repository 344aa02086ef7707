//! Authorization request contexts
//!
//! A context describes one (operation, resource) pair the authorizer must
//! decide on. It is immutable once built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Service identifier carried by every S3 context
pub const S3_SERVICE: &str = "s3";

/// One authorization question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Lowercased request headers
    pub headers: BTreeMap<String, String>,
    /// Decoded query parameters
    pub query: BTreeMap<String, String>,
    pub bucket_name: Option<String>,
    pub object_key: Option<String>,
    pub source_ip: Option<IpAddr>,
    /// Whether the connection is TLS
    pub encrypted: bool,
    /// Operation name, e.g. `objectGet`
    pub api_method: String,
    pub service: String,
}

impl RequestContext {
    /// Create a context for an S3 operation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        headers: BTreeMap<String, String>,
        query: BTreeMap<String, String>,
        bucket_name: Option<String>,
        object_key: Option<String>,
        source_ip: Option<IpAddr>,
        encrypted: bool,
        api_method: impl Into<String>,
    ) -> Self {
        Self {
            headers,
            query,
            bucket_name,
            object_key,
            source_ip,
            encrypted,
            api_method: api_method.into(),
            service: S3_SERVICE.to_string(),
        }
    }

    /// ARN of the addressed resource
    #[must_use]
    pub fn resource(&self) -> String {
        match (&self.bucket_name, &self.object_key) {
            (Some(bucket), Some(key)) => format!("arn:aws:s3:::{bucket}/{key}"),
            (Some(bucket), None) => format!("arn:aws:s3:::{bucket}"),
            _ => "arn:aws:s3:::*".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(bucket: Option<&str>, key: Option<&str>) -> RequestContext {
        RequestContext::new(
            BTreeMap::new(),
            BTreeMap::new(),
            bucket.map(String::from),
            key.map(String::from),
            None,
            false,
            "objectGet",
        )
    }

    #[test]
    fn test_resource_arn() {
        assert_eq!(
            context(Some("photos"), Some("a/b.jpg")).resource(),
            "arn:aws:s3:::photos/a/b.jpg"
        );
        assert_eq!(context(Some("photos"), None).resource(), "arn:aws:s3:::photos");
        assert_eq!(context(None, None).resource(), "arn:aws:s3:::*");
    }

    #[test]
    fn test_service_is_s3() {
        assert_eq!(context(None, None).service, "s3");
    }
}
