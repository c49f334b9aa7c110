//! Error taxonomy for the proxy pipeline.
//!
//! Every pipeline stage reports failures as a [`ProxyError`]. Each variant
//! belongs to one failure class and carries the S3 error code rendered to
//! clients, so the HTTP layer can produce an S3-compatible error response
//! without knowing which stage failed.
//!
//! ```
//! use s3proxy_core::{ProxyError, S3ErrorCode};
//!
//! let err = ProxyError::authorization_denied(Some("bucket is read-only".to_owned()));
//! assert_eq!(err.status_code(), http::StatusCode::FORBIDDEN);
//! assert_eq!(err.code(), S3ErrorCode::AccessDenied);
//! ```

use std::fmt;

/// S3 error codes produced by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum S3ErrorCode {
    /// AccessDenied error.
    AccessDenied,
    /// AuthorizationHeaderMalformed error.
    AuthorizationHeaderMalformed,
    /// EntityTooLarge error.
    EntityTooLarge,
    /// ExpiredToken error.
    ExpiredToken,
    /// InternalError error.
    InternalError,
    /// InvalidAccessKeyId error.
    InvalidAccessKeyId,
    /// InvalidArgument error.
    InvalidArgument,
    /// InvalidRequest error.
    InvalidRequest,
    /// MissingSecurityHeader error.
    MissingSecurityHeader,
    /// NoSuchBucket error.
    NoSuchBucket,
    /// RequestTimeTooSkewed error.
    RequestTimeTooSkewed,
    /// ServiceUnavailable error.
    ServiceUnavailable,
    /// SignatureDoesNotMatch error.
    SignatureDoesNotMatch,
    /// XAmzContentSHA256Mismatch error.
    XAmzContentSHA256Mismatch,
}

impl S3ErrorCode {
    /// The wire name of the code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            Self::EntityTooLarge => "EntityTooLarge",
            Self::ExpiredToken => "ExpiredToken",
            Self::InternalError => "InternalError",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidRequest => "InvalidRequest",
            Self::MissingSecurityHeader => "MissingSecurityHeader",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::XAmzContentSHA256Mismatch => "XAmzContentSHA256Mismatch",
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified pipeline failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    /// Signature mismatch, unparsable authorization, or clock drift exceeded.
    #[error("{message}")]
    Authentication {
        /// Code rendered to the client.
        code: S3ErrorCode,
        /// Human-readable detail.
        message: String,
    },

    /// The security chain or policy engine rejected the request.
    #[error("Access Denied{}", .reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Authorization {
        /// Reason supplied by the deciding facade, if any.
        reason: Option<String>,
    },

    /// No credentials for the access key or no backing store for the request.
    #[error("{message}")]
    NotFound {
        /// Code rendered to the client.
        code: S3ErrorCode,
        /// Human-readable detail.
        message: String,
    },

    /// A credentials provider or policy engine call failed.
    ///
    /// When the provider returned a structured rejection its status is kept in
    /// `status` and reported verbatim.
    #[error("upstream provider error: {message}")]
    Upstream {
        /// Structured status supplied by the provider.
        status: Option<http::StatusCode>,
        /// Human-readable detail.
        message: String,
    },

    /// Bad date format, missing signed header, or any other malformed input.
    #[error("{message}")]
    Malformed {
        /// Code rendered to the client.
        code: S3ErrorCode,
        /// Human-readable detail.
        message: String,
    },

    /// Invalid or unusable configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProxyError {
    /// Authentication failure with the given code.
    #[must_use]
    pub fn authentication(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self::Authentication {
            code,
            message: message.into(),
        }
    }

    /// Authorization denial carrying an optional reason.
    #[must_use]
    pub fn authorization_denied(reason: Option<String>) -> Self {
        Self::Authorization { reason }
    }

    /// Malformed request with the given code.
    #[must_use]
    pub fn malformed(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self::Malformed {
            code,
            message: message.into(),
        }
    }

    /// Provider failure without a structured status.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status rendered for this error.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Self::Authentication { .. } => http::StatusCode::UNAUTHORIZED,
            Self::Authorization { .. } => http::StatusCode::FORBIDDEN,
            Self::NotFound { .. } => http::StatusCode::NOT_FOUND,
            Self::Upstream { status, .. } => {
                status.unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Malformed { .. } => http::StatusCode::BAD_REQUEST,
            Self::Configuration(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// S3 error code rendered for this error.
    #[must_use]
    pub fn code(&self) -> S3ErrorCode {
        match self {
            Self::Authentication { code, .. }
            | Self::NotFound { code, .. }
            | Self::Malformed { code, .. } => *code,
            Self::Authorization { .. } => S3ErrorCode::AccessDenied,
            Self::Upstream { status, .. } => match status {
                Some(s) if *s == http::StatusCode::SERVICE_UNAVAILABLE => {
                    S3ErrorCode::ServiceUnavailable
                }
                Some(s) if *s == http::StatusCode::FORBIDDEN => S3ErrorCode::AccessDenied,
                _ => S3ErrorCode::InternalError,
            },
            Self::Configuration(_) => S3ErrorCode::InternalError,
        }
    }
}

/// Convenience result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
