//! Authentication error types

use cairn_common::Error;
use thiserror::Error;

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    #[error("invalid signature version: expected AWS4-HMAC-SHA256")]
    InvalidSignatureVersion,

    #[error("unsupported authentication method")]
    UnsupportedAuthMethod,

    #[error("access key not found: {0}")]
    AccessKeyNotFound(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("request has expired")]
    RequestExpired,

    #[error("missing required signed header: {0}")]
    MissingSignedHeader(String),

    #[error("invalid date format")]
    InvalidDateFormat,

    #[error("missing x-amz-date or date header")]
    MissingDateHeader,

    #[error("access denied")]
    AccessDenied,

    /// Error reported by a remote authority, carrying its S3 code
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAuthHeader
            | AuthError::InvalidSignatureVersion
            | AuthError::InvalidDateFormat
            | AuthError::MissingSignedHeader(_) => Self::InvalidArgument(err.to_string()),
            AuthError::AccessKeyNotFound(_) => Self::InvalidAccessKey,
            AuthError::SignatureMismatch => Self::SignatureDoesNotMatch,
            AuthError::RequestExpired => Self::RequestTimeTooSkewed,
            AuthError::MissingDateHeader => Self::MissingSecurityHeader("x-amz-date".to_string()),
            AuthError::UnsupportedAuthMethod | AuthError::AccessDenied => Self::AccessDenied,
            AuthError::Remote { code, message } => match code.as_str() {
                "InvalidAccessKeyId" => Self::InvalidAccessKey,
                "SignatureDoesNotMatch" => Self::SignatureDoesNotMatch,
                "RequestTimeTooSkewed" => Self::RequestTimeTooSkewed,
                "MissingSecurityHeader" => Self::MissingSecurityHeader(message),
                "InvalidArgument" => Self::InvalidArgument(message),
                "InternalError" => Self::Internal(message),
                _ => Self::AccessDenied,
            },
            AuthError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            Error::from(AuthError::SignatureMismatch),
            Error::SignatureDoesNotMatch
        );
        assert_eq!(
            Error::from(AuthError::AccessKeyNotFound("AKID".into())),
            Error::InvalidAccessKey
        );
        assert_eq!(
            Error::from(AuthError::UnsupportedAuthMethod),
            Error::AccessDenied
        );
    }

    #[test]
    fn test_remote_codes_pass_through() {
        let err = AuthError::Remote {
            code: "InvalidAccessKeyId".into(),
            message: "unknown key".into(),
        };
        assert_eq!(Error::from(err), Error::InvalidAccessKey);

        let err = AuthError::Remote {
            code: "SomethingNew".into(),
            message: "?".into(),
        };
        assert_eq!(Error::from(err), Error::AccessDenied);
    }
}
