//! AWS Signature Version 4 signing and verification.
//!
//! The same computation serves two directions:
//!
//! 1. Inbound requests are verified by recomputing the signature over the
//!    headers the client listed in `SignedHeaders`, with the emulated secret.
//! 2. Outbound requests are re-signed over every forwarded header (minus a
//!    small ignore list) with the resolved remote secret.
//!
//! Both directions enforce the configured maximum clock drift against the
//! request's `X-Amz-Date`. Presigned URLs are bounded by `X-Amz-Expires`
//! instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use s3proxy_core::{
    AuthorizationSource, CredentialSelector, MultiMap, ParsedS3Request, SigningMetadata,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::authorization::{SUPPORTED_ALGORITHM, X_AMZ_SIGNATURE};
use crate::canonical::{build_canonical_request, build_signed_headers_string};
use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Payload hash used by presigned URLs.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// `X-Amz-Date` format.
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Headers never included when signing outbound requests.
pub const IGNORED_SIGNING_HEADERS: &[&str] = &[
    "authorization",
    "connection",
    "expect",
    "user-agent",
    "x-amzn-trace-id",
];

/// The output of [`SigningController::sign_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningResult {
    /// The full `Authorization` header value.
    pub authorization: String,
    /// The hex-encoded signature.
    pub signature: String,
    /// The signed header names, sorted.
    pub signed_headers: Vec<String>,
}

/// Signs and verifies requests, enforcing clock drift.
#[derive(Debug, Clone)]
pub struct SigningController {
    max_clock_drift: Duration,
    clock: Arc<dyn Clock>,
}

impl SigningController {
    /// A controller using the system clock.
    #[must_use]
    pub fn new(max_clock_drift: Duration) -> Self {
        Self::with_clock(max_clock_drift, Arc::new(SystemClock))
    }

    /// A controller using the given clock.
    #[must_use]
    pub fn with_clock(max_clock_drift: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_clock_drift,
            clock,
        }
    }

    /// The configured maximum clock drift.
    #[must_use]
    pub fn max_clock_drift(&self) -> Duration {
        self.max_clock_drift
    }

    /// The current time formatted as an `X-Amz-Date` value.
    #[must_use]
    pub fn current_amz_date(&self) -> String {
        self.clock.now().format(AMZ_DATE_FORMAT).to_string()
    }

    /// Sign a request, producing its `Authorization` header.
    ///
    /// Every header in `headers` is signed except [`IGNORED_SIGNING_HEADERS`].
    /// The payload hash is taken from `x-amz-content-sha256` when present and
    /// defaults to the empty-body hash.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::InvalidDate`] if `request_date` is malformed,
    /// [`AuthError::ClockDrift`] if it is too far from the current time, and
    /// [`AuthError::NoRemoteCredential`] if `selector` picks a credential that
    /// is not bound.
    #[allow(clippy::too_many_arguments)]
    pub fn sign_request(
        &self,
        metadata: &SigningMetadata,
        region: &str,
        request_date: &str,
        selector: CredentialSelector,
        path: &str,
        headers: &MultiMap,
        query_parameters: &MultiMap,
        http_verb: &str,
    ) -> Result<SigningResult, AuthError> {
        self.check_clock_drift(request_date)?;

        let credential = metadata.credentials.select(selector).map_err(|_| {
            AuthError::NoRemoteCredential(metadata.credentials.emulated.access_key.clone())
        })?;

        let signed: Vec<&str> = headers
            .key_set()
            .filter(|name| !IGNORED_SIGNING_HEADERS.contains(name))
            .collect();
        let header_pairs: Vec<(&str, &str)> = headers
            .iter()
            .filter(|(name, _)| signed.contains(name))
            .collect();
        let payload_hash = headers
            .get_first("x-amz-content-sha256")
            .unwrap_or(EMPTY_PAYLOAD_HASH);

        let scope = Scope::new(request_date, region, metadata.service_type.service_name())?;
        let canonical_request = build_canonical_request(
            http_verb,
            path,
            query_parameters.iter(),
            &header_pairs,
            &signed,
            payload_hash,
        );
        let signature = sign_canonical_request(
            &credential.secret_key,
            request_date,
            &scope,
            &canonical_request,
        );

        let signed_headers_str = build_signed_headers_string(&signed);
        let authorization = format!(
            "{SUPPORTED_ALGORITHM} Credential={}/{}, SignedHeaders={signed_headers_str}, Signature={signature}",
            credential.access_key,
            scope.credential_scope(),
        );

        debug!(
            access_key = %credential.access_key,
            region,
            service = %metadata.service_type,
            signed_headers = %signed_headers_str,
            "Signed request"
        );

        let mut signed_headers: Vec<String> = signed.iter().map(|s| (*s).to_owned()).collect();
        signed_headers.sort_unstable();

        Ok(SigningResult {
            authorization,
            signature,
            signed_headers,
        })
    }

    /// Verify an inbound request against the emulated secret in `metadata`.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::SignatureDoesNotMatch`] on mismatch,
    /// [`AuthError::MissingHeader`] when a signed header is absent or when
    /// `host` or a present `x-amz-*` header is left unsigned, and the
    /// date, drift, and expiry errors described on [`SigningController::sign_request`].
    pub fn validate_request(
        &self,
        metadata: &SigningMetadata,
        request: &ParsedS3Request,
    ) -> Result<(), AuthError> {
        let auth = &request.request_authorization;

        let (query, payload_hash): (Vec<(&str, &str)>, String) = match auth.source {
            AuthorizationSource::Header => {
                self.check_clock_drift(&request.request_date)?;
                (
                    request.query_parameters.iter().collect(),
                    request
                        .headers
                        .get_first("x-amz-content-sha256")
                        .map_or_else(
                            || hash_payload(&request.request_content.bytes()),
                            str::to_owned,
                        ),
                )
            }
            AuthorizationSource::QueryString { expires_seconds } => {
                self.check_expiration(&request.request_date, expires_seconds)?;
                (
                    request
                        .query_parameters
                        .iter()
                        .filter(|(k, _)| *k != X_AMZ_SIGNATURE)
                        .collect(),
                    UNSIGNED_PAYLOAD.to_owned(),
                )
            }
        };

        check_required_signed_headers(&auth.signed_headers, &request.headers)?;

        let signed: Vec<&str> = auth.signed_headers.iter().map(String::as_str).collect();
        let mut header_pairs = Vec::with_capacity(signed.len());
        for &name in &signed {
            let values = request.headers.get(name);
            if values.is_empty() {
                return Err(AuthError::MissingHeader(name.to_owned()));
            }
            header_pairs.extend(values.iter().map(|v| (name, v.as_str())));
        }

        let scope = Scope {
            date: auth.date.clone(),
            region: auth.region.clone(),
            service: auth.service.clone(),
        };
        let canonical_request = build_canonical_request(
            &request.http_verb,
            &request.raw_path,
            query,
            &header_pairs,
            &signed,
            &payload_hash,
        );
        let expected = sign_canonical_request(
            &metadata.credentials.emulated.secret_key,
            &request.request_date,
            &scope,
            &canonical_request,
        );

        if auth.signature.as_bytes().ct_eq(expected.as_bytes()).into() {
            debug!(access_key = %auth.access_key, "Signature verification succeeded");
            Ok(())
        } else {
            debug!(
                access_key = %auth.access_key,
                canonical_request,
                "Signature mismatch"
            );
            Err(AuthError::SignatureDoesNotMatch)
        }
    }

    /// Fail when `|now - request_date|` exceeds the configured maximum.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidDate`] or [`AuthError::ClockDrift`].
    pub fn check_clock_drift(&self, request_date: &str) -> Result<(), AuthError> {
        let request_time = parse_amz_date(request_date)?;
        let drift_seconds = (self.clock.now() - request_time).num_seconds().abs();
        let max_drift_seconds = self.max_clock_drift.as_secs();

        if u64::try_from(drift_seconds).unwrap_or(u64::MAX) > max_drift_seconds {
            debug!(request_date, drift_seconds, max_drift_seconds, "Clock drift exceeded");
            return Err(AuthError::ClockDrift {
                drift_seconds,
                max_drift_seconds,
            });
        }
        Ok(())
    }

    fn check_expiration(&self, request_date: &str, expires_seconds: u64) -> Result<(), AuthError> {
        let request_time = parse_amz_date(request_date)?;
        let expires = i64::try_from(expires_seconds).map_err(|_| AuthError::RequestExpired)?;
        let expiry_time = request_time + chrono::Duration::seconds(expires);

        if self.clock.now() > expiry_time {
            return Err(AuthError::RequestExpired);
        }
        Ok(())
    }
}

/// `host` and every `x-amz-*` header on the request must be in `SignedHeaders`.
fn check_required_signed_headers(signed: &[String], headers: &MultiMap) -> Result<(), AuthError> {
    let is_signed = |name: &str| signed.iter().any(|s| s == name);
    if !is_signed("host") {
        return Err(AuthError::MissingHeader("host".to_owned()));
    }
    match headers
        .key_set()
        .find(|name| name.starts_with("x-amz-") && !is_signed(name))
    {
        Some(unsigned) => Err(AuthError::MissingHeader(unsigned.to_owned())),
        None => Ok(()),
    }
}

/// Verify a concrete `x-amz-content-sha256` value against the body.
///
/// Sentinel values (`UNSIGNED-PAYLOAD`, `STREAMING-*`) and absent headers pass.
///
/// # Errors
///
/// [`AuthError::ContentHashMismatch`] when a concrete hash does not match.
pub fn verify_payload_hash(headers: &MultiMap, body: &[u8]) -> Result<(), AuthError> {
    match headers.get_first("x-amz-content-sha256") {
        Some(declared) if is_concrete_hash(declared) => {
            if declared.eq_ignore_ascii_case(&hash_payload(body)) {
                Ok(())
            } else {
                Err(AuthError::ContentHashMismatch)
            }
        }
        _ => Ok(()),
    }
}

fn is_concrete_hash(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse an `X-Amz-Date` value.
///
/// # Errors
///
/// [`AuthError::InvalidDate`] when the value is not `yyyyMMdd'T'HHmmss'Z'`.
pub fn parse_amz_date(value: &str) -> Result<DateTime<Utc>, AuthError> {
    NaiveDateTime::parse_from_str(value, AMZ_DATE_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|_| AuthError::InvalidDate(value.to_owned()))
}

struct Scope {
    date: String,
    region: String,
    service: String,
}

impl Scope {
    fn new(request_date: &str, region: &str, service: &str) -> Result<Self, AuthError> {
        let date = request_date
            .get(..8)
            .ok_or_else(|| AuthError::InvalidDate(request_date.to_owned()))?;
        Ok(Self {
            date: date.to_owned(),
            region: region.to_owned(),
            service: service.to_owned(),
        })
    }

    fn credential_scope(&self) -> String {
        format!("{}/{}/{}/aws4_request", self.date, self.region, self.service)
    }
}

fn sign_canonical_request(
    secret_key: &str,
    amz_date: &str,
    scope: &Scope,
    canonical_request: &str,
) -> String {
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign =
        build_string_to_sign(amz_date, &scope.credential_scope(), &canonical_hash);
    let signing_key = derive_signing_key(secret_key, &scope.date, &scope.region, &scope.service);
    compute_signature(&signing_key, &string_to_sign)
}

/// Build the SigV4 string to sign.
///
/// ```
/// use s3proxy_auth::signing::build_string_to_sign;
///
/// let sts = build_string_to_sign(
///     "20130524T000000Z",
///     "20130524/us-east-1/s3/aws4_request",
///     "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972",
/// );
/// assert!(sts.starts_with("AWS4-HMAC-SHA256\n20130524T000000Z\n"));
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using the HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Hex-encoded HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Lowercase hex SHA-256 of `payload`.
///
/// ```
/// use s3proxy_auth::signing::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
