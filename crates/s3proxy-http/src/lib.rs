//! HTTP layer for s3proxy: request parsing, the proxy pipeline, STS role
//! assumption, error rendering, and the hyper service.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> ProxyHttpService (hyper Service)
//!     -> Health check interception
//!     -> Body collection
//!     -> parse_request (path-style bucket/key, SigV4 header or presigned query)
//!     -> STS AssumeRole  |  ProxyPipeline
//!          authenticate -> authorize -> rewrite -> remote connection
//!          -> endpoint -> re-sign
//!     -> Upstream dispatch (reqwest)
//!     -> Common response headers (x-amz-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use s3proxy_auth::SigningController;
//! use s3proxy_core::ProxyConfig;
//! use s3proxy_credentials::{CredentialsController, FileCredentialsProvider};
//! use s3proxy_http::{ProxyHttpService, ProxyPipeline};
//!
//! let pipeline = ProxyPipeline::builder()
//!     .signing(SigningController::new(Duration::from_secs(900)))
//!     .credentials(CredentialsController::with_provider(Arc::new(
//!         FileCredentialsProvider::from_path("credentials.json").unwrap(),
//!     )))
//!     .build();
//! let service = ProxyHttpService::new(pipeline, &ProxyConfig::default()).unwrap();
//! // Use `service` with a hyper server.
//! # let _ = service;
//! ```

// ProxyError carries owned messages and is returned on every stage; boxing it
// would add an allocation to the hot path.
#![allow(clippy::result_large_err)]

pub mod codec;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod rewriter;
pub mod service;
pub mod sts;

pub use pipeline::{ProxyPipeline, UpstreamRequest};
pub use request::{parse_query, parse_request};
pub use response::{ProxyResponseBody, error_to_response, error_to_xml};
pub use rewriter::{
    BucketMapping, BucketMappingRewriter, NoopS3RequestRewriter, RewriterConfig, S3RequestRewriter,
    S3RewriteResult, build_rewriter,
};
pub use service::ProxyHttpService;
