//! Bucket access rules
//!
//! Owners may do anything. Other callers, anonymous or not, are judged by
//! the bucket's canned ACL.

use cairn_auth::AuthInfo;
use cairn_common::{BucketInfo, Error, Result};
use http::HeaderMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Owner,
}

pub fn check_bucket_access(bucket: &BucketInfo, auth_info: &AuthInfo, access: Access) -> Result<()> {
    if bucket.is_owned_by(&auth_info.canonical_id) {
        return Ok(());
    }
    let allowed = match access {
        Access::Read => bucket.acl.allows_public_read(),
        Access::Write => bucket.acl.allows_public_write(),
        Access::Owner => false,
    };
    if allowed {
        Ok(())
    } else {
        debug!(
            bucket = %bucket.name,
            requester = %auth_info.canonical_id,
            access = ?access,
            "Bucket access denied"
        );
        Err(Error::AccessDenied)
    }
}

const GRANT_HEADERS: &[&str] = &[
    "x-amz-grant-read",
    "x-amz-grant-write",
    "x-amz-grant-read-acp",
    "x-amz-grant-write-acp",
    "x-amz-grant-full-control",
];

/// Reject grant headers whose grantees are not `id=`, `uri=` or
/// `emailAddress=` pairs
pub fn check_grant_headers(headers: &HeaderMap) -> Result<()> {
    for name in GRANT_HEADERS {
        let Some(value) = headers.get(*name) else {
            continue;
        };
        let value = value
            .to_str()
            .map_err(|_| Error::invalid_argument(format!("invalid {name} header")))?;
        let valid = value.split(',').all(|grantee| {
            let grantee = grantee.trim();
            grantee.starts_with("id=")
                || grantee.starts_with("uri=")
                || grantee.starts_with("emailAddress=")
        });
        if !valid {
            return Err(Error::invalid_argument(format!("invalid grantee in {name}")));
        }
    }
    Ok(())
}
