//! Error types for SigV4 signing and verification.
//!
//! All failures are represented by [`AuthError`]. Conversion into
//! [`ProxyError`] classifies each variant for the HTTP layer.

use s3proxy_core::{ProxyError, S3ErrorCode};

/// Errors that can occur during AWS Signature Version 4 signing or verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request carries neither an `Authorization` header nor presigned parameters.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The signing algorithm is not supported (only AWS4-HMAC-SHA256 is supported).
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A header referenced in `SignedHeaders` is missing from the request.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The `Credential` component does not match
    /// `AKID/date/region/service/aws4_request`.
    #[error("Invalid credential format")]
    InvalidCredential,

    /// A required presigned query parameter is missing or unparsable.
    #[error("Missing required query parameter: {0}")]
    MissingQueryParam(String),

    /// `X-Amz-Date` is not in `yyyyMMdd'T'HHmmss'Z'` format.
    #[error("Invalid request date: {0}")]
    InvalidDate(String),

    /// The request timestamp differs from the local clock by more than the
    /// configured maximum.
    #[error("The difference between the request time and the current time is too large ({drift_seconds}s > {max_drift_seconds}s)")]
    ClockDrift {
        /// Observed absolute drift.
        drift_seconds: i64,
        /// Configured maximum drift.
        max_drift_seconds: u64,
    },

    /// The presigned URL has expired.
    #[error("Request has expired")]
    RequestExpired,

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// `X-Amz-Content-SHA256` does not match the request body.
    #[error("The provided 'x-amz-content-sha256' header does not match what was computed")]
    ContentHashMismatch,

    /// Signing with the remote credential was requested but none is bound.
    #[error("No remote credential is bound to access key {0}")]
    NoRemoteCredential(String),
}

impl From<AuthError> for ProxyError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::MissingAuthHeader => {
                ProxyError::authentication(S3ErrorCode::AccessDenied, message)
            }
            AuthError::InvalidAuthHeader
            | AuthError::UnsupportedAlgorithm(_)
            | AuthError::InvalidCredential
            | AuthError::MissingQueryParam(_) => {
                ProxyError::authentication(S3ErrorCode::AuthorizationHeaderMalformed, message)
            }
            AuthError::ClockDrift { .. } => {
                ProxyError::authentication(S3ErrorCode::RequestTimeTooSkewed, message)
            }
            AuthError::RequestExpired => {
                ProxyError::authentication(S3ErrorCode::AccessDenied, message)
            }
            AuthError::SignatureDoesNotMatch => {
                ProxyError::authentication(S3ErrorCode::SignatureDoesNotMatch, message)
            }
            AuthError::MissingHeader(_) => {
                ProxyError::malformed(S3ErrorCode::MissingSecurityHeader, message)
            }
            AuthError::InvalidDate(_) => ProxyError::malformed(S3ErrorCode::InvalidRequest, message),
            AuthError::ContentHashMismatch => {
                ProxyError::malformed(S3ErrorCode::XAmzContentSHA256Mismatch, message)
            }
            AuthError::NoRemoteCredential(_) => ProxyError::NotFound {
                code: S3ErrorCode::NoSuchBucket,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_classify_auth_errors() {
        let drift: ProxyError = AuthError::ClockDrift {
            drift_seconds: 120,
            max_drift_seconds: 60,
        }
        .into();
        assert_eq!(drift.status_code().as_u16(), 401);
        assert_eq!(drift.code(), S3ErrorCode::RequestTimeTooSkewed);

        let missing: ProxyError = AuthError::MissingHeader("host".to_owned()).into();
        assert_eq!(missing.status_code().as_u16(), 400);

        let bad_date: ProxyError = AuthError::InvalidDate("yesterday".to_owned()).into();
        assert_eq!(bad_date.status_code().as_u16(), 400);

        let no_remote: ProxyError = AuthError::NoRemoteCredential("EMU".to_owned()).into();
        assert_eq!(no_remote.status_code().as_u16(), 404);

        let mismatch: ProxyError = AuthError::SignatureDoesNotMatch.into();
        assert_eq!(mismatch.code(), S3ErrorCode::SignatureDoesNotMatch);
    }
}
