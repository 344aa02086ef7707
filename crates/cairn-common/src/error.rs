//! Error types for Cairn
//!
//! Every failure a caller can observe is one of these variants. Engine and
//! backend errors are logged where they happen and surface as `Internal`.

use thiserror::Error;

/// Common result type for Cairn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Cairn
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Authentication errors (passed through from the authenticator)
    #[error("invalid access key")]
    InvalidAccessKey,

    #[error("signature mismatch")]
    SignatureDoesNotMatch,

    #[error("request time too skewed")]
    RequestTimeTooSkewed,

    #[error("missing security header: {0}")]
    MissingSecurityHeader(String),

    // Authorization
    #[error("access denied")]
    AccessDenied,

    // Malformed requests
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("body length {length} exceeds the {max} byte limit for this request type")]
    RequestBodyTooLarge { length: u64, max: u64 },

    #[error("malformed XML")]
    MalformedXml,

    #[error("illegal versioning configuration")]
    IllegalVersioningConfiguration,

    #[error("invalid URI")]
    InvalidUri,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("invalid range")]
    InvalidRange,

    // Domain errors
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    // Multipart upload errors
    #[error("no such upload: {upload_id}")]
    NoSuchUpload { upload_id: String },

    #[error("invalid part: {part_number}")]
    InvalidPart { part_number: u32 },

    #[error("invalid part order")]
    InvalidPartOrder,

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a not implemented error
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented(feature.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::NoSuchUpload { .. }
        )
    }

    /// Get HTTP status code for S3 API compatibility
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidArgument(_)
            | Self::InvalidRequest(_)
            | Self::RequestBodyTooLarge { .. }
            | Self::MalformedXml
            | Self::IllegalVersioningConfiguration
            | Self::InvalidUri
            | Self::InvalidBucketName(_)
            | Self::MissingSecurityHeader(_)
            | Self::InvalidPart { .. }
            | Self::InvalidPartOrder => 400,

            // 403 Forbidden
            Self::AccessDenied
            | Self::InvalidAccessKey
            | Self::SignatureDoesNotMatch
            | Self::RequestTimeTooSkewed => 403,

            // 404 Not Found
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::NoSuchUpload { .. } => 404,

            Self::MethodNotAllowed => 405,

            // 409 Conflict
            Self::BucketAlreadyExists(_) | Self::BucketNotEmpty(_) => 409,

            Self::InvalidRange => 416,

            Self::Internal(_) => 500,

            Self::NotImplemented(_) => 501,
        }
    }

    /// Get S3 error code for API compatibility
    #[must_use]
    pub const fn s3_error_code(&self) -> &'static str {
        match self {
            Self::InvalidAccessKey => "InvalidAccessKeyId",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::MissingSecurityHeader(_) => "MissingSecurityHeader",
            Self::AccessDenied => "AccessDenied",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::InvalidRequest(_) | Self::RequestBodyTooLarge { .. } => "InvalidRequest",
            Self::MalformedXml => "MalformedXML",
            Self::IllegalVersioningConfiguration => "IllegalVersioningConfigurationException",
            Self::InvalidUri => "InvalidURI",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::InvalidRange => "InvalidRange",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::NoSuchUpload { .. } => "NoSuchUpload",
            Self::InvalidPart { .. } => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::NotImplemented(_) => "NotImplemented",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Message placed in the XML error body.
    ///
    /// Internal errors never carry their detail to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => {
                "We encountered an internal error. Please try again.".to_string()
            }
            Self::AccessDenied => "Access Denied".to_string(),
            Self::BucketNotFound(_) => "The specified bucket does not exist.".to_string(),
            Self::ObjectNotFound { .. } => "The specified key does not exist.".to_string(),
            Self::BucketAlreadyExists(_) => {
                "The requested bucket name is not available.".to_string()
            }
            Self::MalformedXml => {
                "The XML you provided was not well-formed or did not validate against our published schema."
                    .to_string()
            }
            Self::IllegalVersioningConfiguration => {
                "The versioning configuration specified in the request is invalid.".to_string()
            }
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::BucketNotFound("test".into()).is_not_found());
        assert!(
            Error::ObjectNotFound {
                bucket: "b".into(),
                key: "k".into()
            }
            .is_not_found()
        );
        assert!(!Error::AccessDenied.is_not_found());
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::AccessDenied.http_status_code(), 403);
        assert_eq!(Error::BucketNotFound("test".into()).http_status_code(), 404);
        assert_eq!(Error::Internal("test".into()).http_status_code(), 500);
        assert_eq!(Error::not_implemented("mfa").http_status_code(), 501);
        assert_eq!(
            Error::RequestBodyTooLarge {
                length: 2,
                max: 1
            }
            .http_status_code(),
            400
        );
    }

    #[test]
    fn test_s3_error_codes() {
        assert_eq!(Error::MalformedXml.s3_error_code(), "MalformedXML");
        assert_eq!(
            Error::IllegalVersioningConfiguration.s3_error_code(),
            "IllegalVersioningConfigurationException"
        );
        assert_eq!(
            Error::RequestBodyTooLarge {
                length: 2,
                max: 1
            }
            .s3_error_code(),
            "InvalidRequest"
        );
        assert_eq!(Error::InvalidAccessKey.s3_error_code(), "InvalidAccessKeyId");
    }

    #[test]
    fn test_internal_message_is_opaque() {
        let err = Error::internal("redb: table corrupted at page 12");
        assert!(!err.public_message().contains("redb"));
        assert_eq!(
            Error::invalid_argument("bad copy source").public_message(),
            "Invalid argument: bad copy source"
        );
    }
}
