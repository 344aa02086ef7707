//! Core record types shared by the metadata, placement and API layers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the synthetic bucket holding per-account bucket indices
pub const USERS_BUCKET: &str = "users..bucket";

/// Prefix of the hidden bucket that stores multipart upload state
pub const MPU_SHADOW_BUCKET_PREFIX: &str = "mpuShadowBucket";

/// Bucket record schema version written by this build
pub const CURRENT_MODEL_VERSION: u32 = 2;

/// Canned ACL applied when a request names none
pub const DEFAULT_CANNED_ACL: &str = "private";

/// Where one piece of object data lives.
///
/// `data_store_name` must name a configured location, or the data can be
/// neither read nor deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRetrievalInfo {
    /// Backend-assigned opaque key
    pub key: String,
    /// Location that stored the data
    pub data_store_name: String,
    /// Byte length, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Offset of this piece within the whole object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
}

impl DataRetrievalInfo {
    #[must_use]
    pub fn new(key: impl Into<String>, data_store_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            data_store_name: data_store_name.into(),
            size: None,
            start: None,
        }
    }
}

/// Bucket versioning status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersioningStatus {
    Enabled,
    Suspended,
}

impl VersioningStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }
}

/// MFA delete setting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaDelete {
    Enabled,
    Disabled,
}

/// Stored versioning configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersioningConfiguration {
    pub status: VersioningStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_delete: Option<MfaDelete>,
}

/// Bucket ACL
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAcl {
    /// Canned ACL name (`private`, `public-read`, ...)
    pub canned: String,
}

impl Default for BucketAcl {
    fn default() -> Self {
        Self {
            canned: DEFAULT_CANNED_ACL.to_string(),
        }
    }
}

impl BucketAcl {
    /// Whether anonymous callers may read
    #[must_use]
    pub fn allows_public_read(&self) -> bool {
        matches!(self.canned.as_str(), "public-read" | "public-read-write")
    }

    /// Whether anonymous callers may write
    #[must_use]
    pub fn allows_public_write(&self) -> bool {
        self.canned == "public-read-write"
    }
}

/// Serialized bucket attributes, stored under the bucket name in the
/// reserved attribute namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub owner: String,
    pub owner_display_name: String,
    /// RFC 3339 creation timestamp
    pub creation_date: String,
    pub md_bucket_model_version: u32,
    #[serde(default)]
    pub location_constraint: Option<String>,
    #[serde(default)]
    pub acl: BucketAcl,
    #[serde(default)]
    pub versioning_configuration: Option<VersioningConfiguration>,
    /// CORS rules, kept opaque
    #[serde(default)]
    pub cors: Option<serde_json::Value>,
    /// Website configuration, kept opaque
    #[serde(default)]
    pub website_configuration: Option<serde_json::Value>,
}

impl BucketInfo {
    /// Create a record with the current model version.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        owner: impl Into<String>,
        owner_display_name: impl Into<String>,
        creation_date: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            owner_display_name: owner_display_name.into(),
            creation_date: creation_date.into(),
            md_bucket_model_version: CURRENT_MODEL_VERSION,
            location_constraint: None,
            acl: BucketAcl::default(),
            versioning_configuration: None,
            cors: None,
            website_configuration: None,
        }
    }

    #[must_use]
    pub fn with_location_constraint(mut self, location: Option<String>) -> Self {
        self.location_constraint = location;
        self
    }

    #[must_use]
    pub fn with_canned_acl(mut self, canned: impl Into<String>) -> Self {
        self.acl.canned = canned.into();
        self
    }

    #[must_use]
    pub fn is_owned_by(&self, canonical_id: &str) -> bool {
        self.owner == canonical_id
    }

    /// Encode for storage
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored record
    pub fn deserialize(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

/// Object attributes written by the gateway handlers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub owner: String,
    pub owner_display_name: String,
    pub content_length: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Hex MD5, or `<md5>-<parts>` for multipart objects
    pub etag: String,
    pub last_modified: String,
    /// `x-amz-meta-*` headers, lowercased
    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub location_constraint: Option<String>,
    /// Data pieces in object order
    #[serde(default)]
    pub location: Vec<DataRetrievalInfo>,
}

/// Current time formatted the way records store it
#[must_use]
pub fn now_rfc3339() -> String {
    format_timestamp(Utc::now())
}

/// Format a timestamp with millisecond precision
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validate a bucket name against S3 naming rules
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.len() < 3 {
        return Err("bucket name must be at least 3 characters".to_string());
    }
    if name.len() > 63 {
        return Err("bucket name must be at most 63 characters".to_string());
    }

    let bytes = name.as_bytes();
    let edge_ok = |c: u8| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return Err("bucket name must start and end with a lowercase letter or number".to_string());
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-' && *c != '.')
    {
        return Err(format!("bucket name contains invalid character: {c}"));
    }

    if name.contains("..") {
        return Err("bucket name cannot contain consecutive periods".to_string());
    }

    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err("bucket name cannot be formatted as an IP address".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_info_roundtrip() {
        let info = BucketInfo::new("photos", "abc", "alice", "2024-01-01T00:00:00.000Z")
            .with_location_constraint(Some("us-east-1".to_string()))
            .with_canned_acl("public-read");
        let data = info.serialize().unwrap();
        let decoded = BucketInfo::deserialize(&data).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.md_bucket_model_version, CURRENT_MODEL_VERSION);
        assert!(decoded.acl.allows_public_read());
        assert!(!decoded.acl.allows_public_write());
    }

    #[test]
    fn test_bucket_info_tolerates_missing_optional_fields() {
        let data = r#"{"name":"b","owner":"o","owner_display_name":"d",
            "creation_date":"2024-01-01T00:00:00.000Z","md_bucket_model_version":1}"#;
        let info = BucketInfo::deserialize(data).unwrap();
        assert_eq!(info.acl.canned, "private");
        assert!(info.location_constraint.is_none());
    }

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("my-bucket").is_ok());
        assert!(validate_bucket_name("my.bucket.123").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
        assert!(validate_bucket_name("My-Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
        assert!(validate_bucket_name("my..bucket").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name("my_bucket").is_err());
    }

    #[test]
    fn test_retrieval_info_skips_unset_offsets() {
        let info = DataRetrievalInfo::new("k1", "mem");
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"key":"k1","data_store_name":"mem"}"#);
    }
}
