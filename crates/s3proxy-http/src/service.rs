//! The proxy HTTP service implementing hyper's `Service` trait.
//!
//! [`ProxyHttpService`] handles:
//!
//! 1. Health check interception (`GET /health`, `GET /_health`)
//! 2. Request body collection, bounded by `max_body_bytes`
//! 3. Parsing into a [`ParsedS3Request`]
//! 4. STS `AssumeRole` or the S3 [`ProxyPipeline`]
//! 5. Upstream dispatch with the re-signed request
//! 6. Common response headers (`x-amz-request-id`, `Server`)
//! 7. Error response formatting

use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::Service;
use s3proxy_core::{ParsedS3Request, ProxyConfig, ProxyError, ProxyResult, S3ErrorCode};
use s3proxy_security::{RequestLoggingSession, TracingLoggingSession};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::{ProxyPipeline, UpstreamRequest};
use crate::request::parse_request;
use crate::response::{ProxyResponseBody, error_to_response};
use crate::sts::handle_sts_request;

/// Upstream response headers not relayed to the client.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

struct Inner {
    pipeline: ProxyPipeline,
    client: reqwest::Client,
    path_prefix: Option<String>,
    max_body_bytes: usize,
}

/// The proxy HTTP service.
#[derive(Clone)]
pub struct ProxyHttpService {
    inner: Arc<Inner>,
}

impl fmt::Debug for ProxyHttpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHttpService")
            .field("pipeline", &self.inner.pipeline)
            .field("path_prefix", &self.inner.path_prefix)
            .field("max_body_bytes", &self.inner.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl ProxyHttpService {
    /// Create a service dispatching through `pipeline`.
    pub fn new(pipeline: ProxyPipeline, config: &ProxyConfig) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .build()
            .map_err(|e| ProxyError::Configuration(format!("cannot build upstream client: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner {
                pipeline,
                client,
                path_prefix: config.path_prefix.clone(),
                max_body_bytes: usize::try_from(config.max_body_bytes).unwrap_or(usize::MAX),
            }),
        })
    }

    /// Handle one request end to end. Failures are rendered as S3 errors.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<ProxyResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let request_id = Uuid::new_v4().to_string();
        let response = self.process(req, &request_id).await;
        add_common_headers(response, &request_id)
    }

    async fn process<B>(&self, req: http::Request<B>, request_id: &str) -> http::Response<ProxyResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        let uri = req.uri().clone();
        debug!(%method, %uri, request_id, "processing proxy request");

        if is_health_check(&method, uri.path()) {
            return health_check_response();
        }

        let (parts, body) = req.into_parts();
        let limit = self.inner.max_body_bytes;
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                    warn!(limit, request_id, "request body exceeds limit");
                    ProxyError::malformed(
                        S3ErrorCode::EntityTooLarge,
                        "Your proposed upload exceeds the maximum allowed size",
                    )
                } else {
                    warn!(error = %e, request_id, "failed to collect request body");
                    ProxyError::malformed(S3ErrorCode::InvalidRequest, "failed to read request body")
                };
                return error_to_response(&err, Some(uri.path()), request_id);
            }
        };

        let request = match parse_request(&parts, body, self.inner.path_prefix.as_deref(), request_id) {
            Ok(request) => request,
            Err(err) => {
                warn!(%method, %uri, error = %err, request_id, "rejected request");
                return error_to_response(&err, Some(uri.path()), request_id);
            }
        };

        let session = Arc::new(TracingLoggingSession::new(request_id));
        session.log_property("method", method.as_str());
        session.log_property("access_key", &request.request_authorization.access_key);

        match self.dispatch(&request, Arc::clone(&session) as Arc<dyn RequestLoggingSession>).await {
            Ok(response) => {
                session.log_property("status", response.status().as_str());
                response
            }
            Err(err) => {
                session.log_property("status", err.status_code().as_str());
                session.log_error("pipeline", &err.to_string());
                warn!(error = %err, request_id, "proxy request failed");
                error_to_response(&err, Some(&request.raw_path), request_id)
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ParsedS3Request,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<http::Response<ProxyResponseBody>> {
        let pipeline = &self.inner.pipeline;
        if request.request_authorization.service == "sts" {
            let metadata = pipeline.authenticate(request).await?;
            return handle_sts_request(pipeline.credentials(), request, &metadata).await;
        }

        let upstream = pipeline.process(request, session).await?;
        self.forward(upstream).await
    }

    async fn forward(&self, upstream: UpstreamRequest) -> ProxyResult<http::Response<ProxyResponseBody>> {
        info!(
            method = %upstream.method,
            uri = %upstream.uri,
            bucket = %upstream.bucket,
            key = %upstream.key,
            "forwarding request upstream"
        );

        let response = self
            .inner
            .client
            .request(upstream.method, upstream.uri.to_string())
            .headers(upstream.headers)
            .body(upstream.body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, uri = %upstream.uri, "upstream request failed");
                ProxyError::Upstream {
                    status: Some(http::StatusCode::BAD_GATEWAY),
                    message: "upstream request failed".to_owned(),
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            warn!(error = %e, "failed to read upstream response body");
            ProxyError::Upstream {
                status: Some(http::StatusCode::BAD_GATEWAY),
                message: "upstream response was truncated".to_owned(),
            }
        })?;
        debug!(%status, bytes = body.len(), "upstream responded");

        let mut proxied = http::Response::new(Full::new(body));
        *proxied.status_mut() = status;
        for (name, value) in &headers {
            if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                proxied.headers_mut().append(name.clone(), value.clone());
            }
        }
        Ok(proxied)
    }
}

impl Service<http::Request<Incoming>> for ProxyHttpService {
    type Response = http::Response<ProxyResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET && (path == "/health" || path == "/_health")
}

fn health_check_response() -> http::Response<ProxyResponseBody> {
    let mut response = http::Response::new(Full::from(
        r#"{"status":"running","service":"s3proxy"}"#,
    ));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

fn add_common_headers(
    mut response: http::Response<ProxyResponseBody>,
    request_id: &str,
) -> http::Response<ProxyResponseBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(http::header::SERVER, http::HeaderValue::from_static("s3proxy"));
    response
}
