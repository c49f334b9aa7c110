//! The proxy request pipeline.
//!
//! ```text
//! Parse -> Authenticate -> ResolveCredentials -> Authorize -> Rewrite
//!       -> ResolveRemoteConnection -> BuildEndpoint -> Re-sign
//! ```
//!
//! Parsing happens in [`crate::request`]; [`ProxyPipeline`] runs every later
//! stage and produces an [`UpstreamRequest`] signed with the remote
//! credential. Any stage failure short-circuits.

use std::borrow::Cow;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use s3proxy_auth::canonical::uri_encode;
use s3proxy_auth::{SigningController, hash_payload, verify_payload_hash};
use s3proxy_core::{
    CredentialSelector, Credentials, MultiMap, ParsedS3Request, ProxyError, ProxyResult,
    RemoteSessionRole, S3ErrorCode, SigningMetadata, SigningServiceType,
};
use s3proxy_credentials::CredentialsController;
use s3proxy_remote::{
    CredentialsRemoteS3ConnectionProvider, RemoteS3Connection, RemoteS3ConnectionProvider,
    RemoteS3Facade, RemoteS3FacadeConfiguration, build_remote_s3_facade,
};
use s3proxy_security::{RequestLoggingSession, SecurityController};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::codec::{decode_aws_chunked, is_aws_chunked, strip_aws_chunked_encoding};
use crate::rewriter::{NoopS3RequestRewriter, S3RequestRewriter};

/// Presigned authorization parameters; never forwarded upstream.
const PRESIGNED_QUERY_PARAMETERS: &[&str] = &[
    "X-Amz-Algorithm",
    "X-Amz-Credential",
    "X-Amz-Date",
    "X-Amz-Expires",
    "X-Amz-SignedHeaders",
    "X-Amz-Signature",
    "X-Amz-Security-Token",
];

/// Inbound headers replaced or dropped before re-signing.
const DROPPED_HEADERS: &[&str] = &[
    "authorization",
    "host",
    "x-amz-date",
    "x-amz-security-token",
    "content-length",
    "expect",
    "connection",
    "keep-alive",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request ready to be dispatched to the upstream store.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// HTTP method.
    pub method: http::Method,
    /// Full upstream URI.
    pub uri: http::Uri,
    /// Signed headers, `Authorization` included.
    pub headers: http::HeaderMap,
    /// Payload.
    pub body: Bytes,
    /// Role to assume upstream, threaded from the connection.
    pub remote_session_role: Option<RemoteSessionRole>,
    /// Bucket after rewriting.
    pub bucket: String,
    /// Key after rewriting.
    pub key: String,
}

/// Runs authentication, authorization, rewriting, routing, and re-signing.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ProxyPipeline {
    signing: SigningController,
    credentials: CredentialsController,
    #[builder(default)]
    security: SecurityController,
    #[builder(default = noop_rewriter())]
    rewriter: Arc<dyn S3RequestRewriter>,
    #[builder(default = credentials_connections())]
    connections: Arc<dyn RemoteS3ConnectionProvider>,
    #[builder(default = build_remote_s3_facade(&RemoteS3FacadeConfiguration::default()))]
    facade: Arc<dyn RemoteS3Facade>,
}

fn noop_rewriter() -> Arc<dyn S3RequestRewriter> {
    Arc::new(NoopS3RequestRewriter)
}

fn credentials_connections() -> Arc<dyn RemoteS3ConnectionProvider> {
    Arc::new(CredentialsRemoteS3ConnectionProvider)
}

impl ProxyPipeline {
    /// The credentials controller, shared with the STS endpoint.
    #[must_use]
    pub fn credentials(&self) -> &CredentialsController {
        &self.credentials
    }

    /// Authenticate and route an S3 request.
    pub async fn process(
        &self,
        request: &ParsedS3Request,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<UpstreamRequest> {
        let metadata = self.authenticate(request).await?;
        if metadata.service_type != SigningServiceType::S3 {
            return Err(ProxyError::malformed(
                S3ErrorCode::InvalidRequest,
                format!("{} requests are not proxied", metadata.service_type),
            ));
        }
        self.route(request, &metadata, session).await
    }

    /// Resolve the caller's credentials and verify the request signature.
    pub async fn authenticate(&self, request: &ParsedS3Request) -> ProxyResult<SigningMetadata> {
        let auth = &request.request_authorization;
        let service_type = SigningServiceType::from_service_name(&auth.service).ok_or_else(|| {
            ProxyError::authentication(
                S3ErrorCode::AuthorizationHeaderMalformed,
                format!("unsupported service in credential scope: {}", auth.service),
            )
        })?;

        let credentials = self
            .credentials
            .credentials(&auth.access_key, auth.security_token.as_deref())
            .await?
            .ok_or_else(|| ProxyError::NotFound {
                code: S3ErrorCode::InvalidAccessKeyId,
                message: "The AWS Access Key Id you provided does not exist in our records."
                    .to_owned(),
            })?;

        let metadata = SigningMetadata::new(service_type, credentials, Some(auth.region.clone()));
        self.signing.validate_request(&metadata, request)?;
        verify_payload_hash(&request.headers, &request.request_content.bytes())?;

        debug!(
            request_id = %request.request_id,
            access_key = %auth.access_key,
            service = %service_type,
            "Request authenticated"
        );
        Ok(metadata)
    }

    /// Authorize, rewrite, resolve the upstream connection, and re-sign.
    pub async fn route(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<UpstreamRequest> {
        self.security
            .apply(request, metadata, Arc::clone(&session))
            .await?
            .into_result()?;

        let request = match self.rewriter.rewrite(&metadata.credentials, request) {
            Some(rewrite) => {
                debug!(
                    request_id = %request.request_id,
                    from_bucket = %request.bucket_name,
                    to_bucket = %rewrite.final_bucket,
                    "Request rewritten"
                );
                let mut derived =
                    request.with_bucket_and_key(rewrite.final_bucket, rewrite.final_key);
                if let Some(prefix) = rewrite.final_list_prefix {
                    derived.query_parameters = derived
                        .query_parameters
                        .to_builder()
                        .put_or_replace_single("prefix", prefix)
                        .build();
                }
                Cow::Owned(derived)
            }
            None => Cow::Borrowed(request),
        };
        session.log_property("bucket", &request.bucket_name);
        session.log_property("key", &request.key_in_bucket);

        let connection = self
            .connections
            .remote_connection(metadata, metadata.credentials.identity.as_ref(), &request)
            .await?
            .ok_or_else(|| ProxyError::NotFound {
                code: S3ErrorCode::NoSuchBucket,
                message: format!(
                    "no remote connection is registered for bucket {}",
                    request.bucket_name
                ),
            })?;
        let facade = connection
            .remote_s3_facade
            .as_deref()
            .unwrap_or(self.facade.as_ref());

        let upstream = self.sign_upstream(&request, metadata, &connection, facade)?;
        session.log_property("upstream", &upstream.uri.to_string());
        Ok(upstream)
    }

    fn sign_upstream(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        connection: &RemoteS3Connection,
        facade: &dyn RemoteS3Facade,
    ) -> ProxyResult<UpstreamRequest> {
        let region = request.request_authorization.region.as_str();

        let mut query = MultiMap::case_sensitive_builder();
        for (name, value) in request.query_parameters.iter() {
            if !PRESIGNED_QUERY_PARAMETERS.contains(&name) {
                query.add_mut(name, value);
            }
        }
        let query = query.build();
        let uri = facade.build_endpoint(
            &request.key_in_bucket,
            &request.bucket_name,
            region,
            encode_query(&query).as_deref(),
        )?;
        let host = uri
            .authority()
            .ok_or_else(|| ProxyError::Configuration(format!("upstream URI {uri} has no host")))?
            .to_string();

        let mut headers = MultiMap::case_insensitive_builder();
        for (name, value) in request.headers.iter() {
            if !DROPPED_HEADERS.contains(&name) {
                headers.add_mut(name, value);
            }
        }

        let mut body = request.request_content.bytes();
        if is_aws_chunked(&request.headers) {
            body = decode_aws_chunked(&body)?;
            headers = headers
                .remove("content-encoding")
                .remove("x-amz-decoded-content-length");
            if let Some(encoding) = request
                .headers
                .get_first("content-encoding")
                .and_then(strip_aws_chunked_encoding)
            {
                headers.put_or_replace_single_mut("content-encoding", encoding);
            }
            headers.put_or_replace_single_mut("x-amz-content-sha256", hash_payload(&body));
        } else if !request.headers.contains_key("x-amz-content-sha256") {
            headers.put_or_replace_single_mut("x-amz-content-sha256", hash_payload(&body));
        }

        let date = if request.request_authorization.is_presigned() {
            self.signing.current_amz_date()
        } else {
            request.request_date.clone()
        };
        headers.put_or_replace_single_mut("host", host);
        headers.put_or_replace_single_mut("x-amz-date", &date);
        if let Some(token) = &connection.remote_credential.session {
            headers.put_or_replace_single_mut("x-amz-security-token", token);
        }
        let headers = headers.build();

        let remote_metadata = SigningMetadata::new(
            SigningServiceType::S3,
            Credentials {
                emulated: metadata.credentials.emulated.clone(),
                remote: Some(connection.remote_credential.clone()),
                remote_session_role: connection.remote_session_role.clone(),
                identity: metadata.credentials.identity.clone(),
            },
            Some(region.to_owned()),
        );
        let signed = self.signing.sign_request(
            &remote_metadata,
            region,
            &date,
            CredentialSelector::Remote,
            uri.path(),
            &headers,
            &query,
            &request.http_verb,
        )?;

        let mut header_map = to_header_map(&headers)?;
        header_map.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(&signed.authorization).map_err(|e| {
                ProxyError::Configuration(format!("invalid upstream authorization: {e}"))
            })?,
        );

        let method = http::Method::from_bytes(request.http_verb.as_bytes()).map_err(|_| {
            ProxyError::malformed(
                S3ErrorCode::InvalidRequest,
                format!("invalid method {}", request.http_verb),
            )
        })?;

        debug!(
            request_id = %request.request_id,
            %uri,
            remote_access_key = %connection.remote_credential.access_key,
            "Prepared upstream request"
        );

        Ok(UpstreamRequest {
            method,
            uri,
            headers: header_map,
            body,
            remote_session_role: connection.remote_session_role.clone(),
            bucket: request.bucket_name.clone(),
            key: request.key_in_bucket.clone(),
        })
    }
}

/// Encode decoded query parameters for the upstream URI.
fn encode_query(query: &MultiMap) -> Option<String> {
    if query.is_empty() {
        return None;
    }
    let encoded: Vec<String> = query
        .iter()
        .map(|(name, value)| {
            if value.is_empty() {
                uri_encode(name)
            } else {
                format!("{}={}", uri_encode(name), uri_encode(value))
            }
        })
        .collect();
    Some(encoded.join("&"))
}

fn to_header_map(headers: &MultiMap) -> ProxyResult<http::HeaderMap> {
    let mut map = http::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ProxyError::malformed(S3ErrorCode::InvalidArgument, format!("invalid header name {name}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            ProxyError::malformed(S3ErrorCode::InvalidArgument, format!("invalid value for header {name}"))
        })?;
        map.append(name, value);
    }
    Ok(map)
}
