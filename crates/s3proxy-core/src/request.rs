//! The parsed form of an inbound request as it flows through the pipeline.

use std::fmt;

use bytes::Bytes;

use crate::multimap::MultiMap;
use crate::types::Credentials;

/// Where the SigV4 authorization of a request was carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationSource {
    /// The `Authorization` header.
    Header,
    /// Presigned URL query parameters.
    QueryString {
        /// `X-Amz-Expires`, in seconds.
        expires_seconds: u64,
    },
}

/// The parsed SigV4 authorization of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAuthorization {
    /// The access key that signed the request.
    pub access_key: String,
    /// Date component of the credential scope (`yyyyMMdd`).
    pub date: String,
    /// Region component of the credential scope.
    pub region: String,
    /// Service component of the credential scope.
    pub service: String,
    /// Signed header names, lowercase, in the order the client listed them.
    pub signed_headers: Vec<String>,
    /// The hex-encoded signature supplied by the client.
    pub signature: String,
    /// `X-Amz-Security-Token` presented with the request.
    pub security_token: Option<String>,
    /// Header or presigned query authorization.
    pub source: AuthorizationSource,
}

impl RequestAuthorization {
    /// `date/region/service/aws4_request`.
    #[must_use]
    pub fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date, self.region, self.service
        )
    }

    /// Whether the request was presigned.
    #[must_use]
    pub fn is_presigned(&self) -> bool {
        matches!(self.source, AuthorizationSource::QueryString { .. })
    }
}

/// The request body, buffered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestContent {
    /// No body.
    #[default]
    Empty,
    /// A fully buffered body.
    Buffered(Bytes),
}

impl RequestContent {
    /// Wrap `bytes`, mapping an empty buffer to [`RequestContent::Empty`].
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Buffered(bytes)
        }
    }

    /// The body bytes (empty for [`RequestContent::Empty`]).
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Buffered(b) => b.clone(),
        }
    }
}

/// An inbound S3 request after parsing.
///
/// Built once per request and never mutated; later stages derive new values
/// (see [`ParsedS3Request::with_bucket_and_key`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedS3Request {
    /// Correlation ID for logs and error responses.
    pub request_id: String,
    /// The parsed SigV4 authorization.
    pub request_authorization: RequestAuthorization,
    /// `X-Amz-Date` of the request (`yyyyMMdd'T'HHmmss'Z'`).
    pub request_date: String,
    /// Target bucket; empty for service-level requests.
    pub bucket_name: String,
    /// Target key; empty for bucket-level requests.
    pub key_in_bucket: String,
    /// Request headers (case-insensitive).
    pub headers: MultiMap,
    /// Decoded query parameters (case-sensitive).
    pub query_parameters: MultiMap,
    /// HTTP method.
    pub http_verb: String,
    /// The raw request path as received.
    pub raw_path: String,
    /// The raw query string as received.
    pub raw_query: Option<String>,
    /// The request body.
    pub request_content: RequestContent,
}

impl ParsedS3Request {
    /// A copy of this request targeting `bucket` / `key` instead.
    #[must_use]
    pub fn with_bucket_and_key(&self, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket.into(),
            key_in_bucket: key.into(),
            ..self.clone()
        }
    }
}

/// The service namespace a signature is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningServiceType {
    /// Amazon S3.
    S3,
    /// AWS Security Token Service.
    Sts,
}

impl SigningServiceType {
    /// The credential-scope service name.
    #[must_use]
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Sts => "sts",
        }
    }

    /// Resolve a credential-scope service name.
    #[must_use]
    pub fn from_service_name(name: &str) -> Option<Self> {
        match name {
            "s3" => Some(Self::S3),
            "sts" => Some(Self::Sts),
            _ => None,
        }
    }
}

impl fmt::Display for SigningServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service_name())
    }
}

/// Which service and credentials a signing call operates with.
#[derive(Debug, Clone, PartialEq)]
pub struct SigningMetadata {
    /// Service namespace of the signature.
    pub service_type: SigningServiceType,
    /// The resolved credentials.
    pub credentials: Credentials,
    /// Region the request was scoped to.
    pub region: Option<String>,
}

impl SigningMetadata {
    /// Create signing metadata.
    #[must_use]
    pub fn new(
        service_type: SigningServiceType,
        credentials: Credentials,
        region: Option<String>,
    ) -> Self {
        Self {
            service_type,
            credentials,
            region,
        }
    }
}
