//! Parsing of SigV4 authorization carried in headers or presigned URLs.
//!
//! Header format:
//! ```text
//! AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request,
//!   SignedHeaders=host;x-amz-content-sha256;x-amz-date,
//!   Signature=<hex-signature>
//! ```
//!
//! Presigned URLs carry the same information in `X-Amz-Algorithm`,
//! `X-Amz-Credential`, `X-Amz-Date`, `X-Amz-Expires`, `X-Amz-SignedHeaders`
//! and `X-Amz-Signature` query parameters.

use s3proxy_core::{AuthorizationSource, MultiMap, RequestAuthorization};

use crate::error::AuthError;

/// The only algorithm supported by this implementation.
pub const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Query parameter carrying the presigned signature.
pub const X_AMZ_SIGNATURE: &str = "X-Amz-Signature";

/// A parsed presigned URL authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedAuthorization {
    /// The authorization components.
    pub authorization: RequestAuthorization,
    /// `X-Amz-Date` from the query string.
    pub amz_date: String,
}

/// Parse an AWS SigV4 `Authorization` header value.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthHeader`] if a component is missing,
/// [`AuthError::UnsupportedAlgorithm`] for anything other than
/// `AWS4-HMAC-SHA256`, or [`AuthError::InvalidCredential`] when the credential
/// scope is malformed.
pub fn parse_authorization_header(
    header: &str,
    security_token: Option<String>,
) -> Result<RequestAuthorization, AuthError> {
    let (algorithm, rest) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let credential = credential.ok_or(AuthError::InvalidAuthHeader)?;
    let signed_headers = signed_headers.ok_or(AuthError::InvalidAuthHeader)?;
    let signature = signature.ok_or(AuthError::InvalidAuthHeader)?;

    let scope = parse_credential_scope(credential)?;

    Ok(RequestAuthorization {
        access_key: scope.access_key,
        date: scope.date,
        region: scope.region,
        service: scope.service,
        signed_headers: split_signed_headers(signed_headers),
        signature: signature.to_owned(),
        security_token,
        source: AuthorizationSource::Header,
    })
}

/// Whether the decoded query parameters carry presigned authorization.
#[must_use]
pub fn is_presigned(query_parameters: &MultiMap) -> bool {
    query_parameters.contains_key("X-Amz-Algorithm") || query_parameters.contains_key(X_AMZ_SIGNATURE)
}

/// Parse presigned URL authorization from decoded query parameters.
///
/// # Errors
///
/// Returns [`AuthError::MissingQueryParam`] if a required parameter is absent
/// or `X-Amz-Expires` is not an integer, and the same algorithm and credential
/// errors as [`parse_authorization_header`].
pub fn parse_presigned_query(
    query_parameters: &MultiMap,
) -> Result<PresignedAuthorization, AuthError> {
    let algorithm = required_param(query_parameters, "X-Amz-Algorithm")?;
    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    let credential = required_param(query_parameters, "X-Amz-Credential")?;
    let amz_date = required_param(query_parameters, "X-Amz-Date")?;
    let expires = required_param(query_parameters, "X-Amz-Expires")?;
    let signed_headers = required_param(query_parameters, "X-Amz-SignedHeaders")?;
    let signature = required_param(query_parameters, X_AMZ_SIGNATURE)?;

    let expires_seconds: u64 = expires
        .parse()
        .map_err(|_| AuthError::MissingQueryParam("X-Amz-Expires (invalid integer)".to_owned()))?;

    let scope = parse_credential_scope(credential)?;

    Ok(PresignedAuthorization {
        authorization: RequestAuthorization {
            access_key: scope.access_key,
            date: scope.date,
            region: scope.region,
            service: scope.service,
            signed_headers: split_signed_headers(signed_headers),
            signature: signature.to_owned(),
            security_token: query_parameters
                .get_first("X-Amz-Security-Token")
                .map(ToOwned::to_owned),
            source: AuthorizationSource::QueryString { expires_seconds },
        },
        amz_date: amz_date.to_owned(),
    })
}

struct CredentialScope {
    access_key: String,
    date: String,
    region: String,
    service: String,
}

/// `AKID/date/region/service/aws4_request`
fn parse_credential_scope(credential: &str) -> Result<CredentialScope, AuthError> {
    let parts: Vec<&str> = credential.splitn(5, '/').collect();
    if parts.len() != 5 || parts[4] != "aws4_request" || parts[0].is_empty() {
        return Err(AuthError::InvalidCredential);
    }
    Ok(CredentialScope {
        access_key: parts[0].to_owned(),
        date: parts[1].to_owned(),
        region: parts[2].to_owned(),
        service: parts[3].to_owned(),
    })
}

fn split_signed_headers(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter(|h| !h.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn required_param<'a>(query_parameters: &'a MultiMap, name: &str) -> Result<&'a str, AuthError> {
    query_parameters
        .get_first(name)
        .ok_or_else(|| AuthError::MissingQueryParam(name.to_owned()))
}
