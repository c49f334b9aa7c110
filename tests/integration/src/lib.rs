//! End-to-end tests for s3proxy.
//!
//! Each test starts an in-process proxy on an ephemeral port in front of a
//! `mockito` upstream and drives it with the AWS SDK, so the full path
//! (SDK signing, verification, rewriting, re-signing, dispatch) is exercised
//! without external services.

use std::sync::{Arc, Once};
use std::time::Duration;

use aws_sdk_s3::config::{
    BehaviorVersion, Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use s3proxy_auth::SigningController;
use s3proxy_core::{Credential, ProxyConfig};
use s3proxy_credentials::{
    AssumedRoleCredentialsProvider, AssumedRoleSessions, CredentialsController,
    CredentialsProvider, FileCredentialsProvider, InMemoryAssumedRoleProvider,
};
use s3proxy_http::{
    BucketMapping, BucketMappingRewriter, NoopS3RequestRewriter, ProxyHttpService, ProxyPipeline,
    S3RequestRewriter,
};
use s3proxy_remote::{RemoteS3FacadeConfiguration, RemoteS3FacadeStyle, build_remote_s3_facade};
use tokio::net::TcpListener;

/// Emulated access key known to the proxy.
pub const EMULATED_ACCESS_KEY: &str = "EMULATEDKEY";
/// Secret of [`EMULATED_ACCESS_KEY`].
pub const EMULATED_SECRET_KEY: &str = "emulated-secret";
/// Remote access key the proxy re-signs with.
pub const REMOTE_ACCESS_KEY: &str = "REMOTEKEY";

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A running proxy and the mock upstream behind it.
pub struct TestProxy {
    /// Base URL of the proxy.
    pub endpoint: String,
    /// The mock upstream store.
    pub upstream: mockito::ServerGuard,
}

impl std::fmt::Debug for TestProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestProxy")
            .field("endpoint", &self.endpoint)
            .field("upstream", &self.upstream.host_with_port())
            .finish()
    }
}

/// Start a proxy without bucket rewriting.
pub async fn start_proxy() -> TestProxy {
    start_proxy_with_rewriter(Arc::new(NoopS3RequestRewriter)).await
}

/// Start a proxy mapping `alias` to `target` (`bucket[/prefix]`).
pub async fn start_proxy_with_mapping(alias: &str, target: &str) -> TestProxy {
    start_proxy_with_rewriter(Arc::new(BucketMappingRewriter::new([(
        alias,
        BucketMapping::parse(target),
    )])))
    .await
}

async fn start_proxy_with_rewriter(rewriter: Arc<dyn S3RequestRewriter>) -> TestProxy {
    init_tracing();

    let upstream = mockito::Server::new_async().await;
    let upstream_address = upstream.socket_address();

    let base: Arc<dyn CredentialsProvider> =
        Arc::new(FileCredentialsProvider::new([s3proxy_core::Credentials::with_remote(
            Credential::new(EMULATED_ACCESS_KEY, EMULATED_SECRET_KEY),
            Credential::new(REMOTE_ACCESS_KEY, "remote-secret"),
        )]));
    let sessions = Arc::new(AssumedRoleSessions::new());
    let credentials = CredentialsController::new(
        Arc::new(AssumedRoleCredentialsProvider::new(
            Arc::clone(&base),
            Arc::clone(&sessions),
        )),
        Arc::new(InMemoryAssumedRoleProvider::new(base, sessions)),
    );

    let pipeline = ProxyPipeline::builder()
        .signing(SigningController::new(Duration::from_secs(900)))
        .credentials(credentials)
        .rewriter(rewriter)
        .facade(build_remote_s3_facade(&RemoteS3FacadeConfiguration {
            style: RemoteS3FacadeStyle::Path,
            domain: "localhost".to_owned(),
            https: false,
            port: Some(upstream_address.port()),
            hostname_template: Some(upstream_address.ip().to_string()),
        }))
        .build();
    let service = ProxyHttpService::new(pipeline, &ProxyConfig::default())
        .unwrap_or_else(|e| panic!("failed to build proxy service: {e}"));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|e| panic!("failed to bind proxy listener: {e}"));
    let address = listener
        .local_addr()
        .unwrap_or_else(|e| panic!("proxy listener has no address: {e}"));

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let svc = service.clone();
            tokio::spawn(async move {
                let _ = HttpConnBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    TestProxy {
        endpoint: format!("http://{address}"),
        upstream,
    }
}

/// An S3 client signing with the given credentials against `endpoint`.
#[must_use]
pub fn s3_client(
    endpoint: &str,
    access_key: &str,
    secret_key: &str,
    session_token: Option<String>,
) -> aws_sdk_s3::Client {
    let creds = Credentials::new(access_key, secret_key, session_token, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint)
        .force_path_style(true)
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// An S3 client using the emulated credential.
#[must_use]
pub fn emulated_s3_client(proxy: &TestProxy) -> aws_sdk_s3::Client {
    s3_client(&proxy.endpoint, EMULATED_ACCESS_KEY, EMULATED_SECRET_KEY, None)
}

/// An STS client using the emulated credential.
#[must_use]
pub fn sts_client(proxy: &TestProxy) -> aws_sdk_sts::Client {
    let creds = aws_sdk_sts::config::Credentials::new(
        EMULATED_ACCESS_KEY,
        EMULATED_SECRET_KEY,
        None,
        None,
        "integration-test",
    );

    let config = aws_sdk_sts::config::Builder::new()
        .behavior_version(aws_sdk_sts::config::BehaviorVersion::latest())
        .region(aws_sdk_sts::config::Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(&proxy.endpoint)
        .build();

    aws_sdk_sts::Client::from_conf(config)
}

/// Matches an `Authorization` header signed with the remote credential.
#[must_use]
pub fn signed_by_remote() -> mockito::Matcher {
    mockito::Matcher::Regex(format!(
        "^AWS4-HMAC-SHA256 Credential={REMOTE_ACCESS_KEY}/\\d{{8}}/us-east-1/s3/aws4_request"
    ))
}

/// Matches `path` with or without a query string. `path` is a regex fragment.
#[must_use]
pub fn upstream_path(path: &str) -> mockito::Matcher {
    mockito::Matcher::Regex(format!("^{path}(\\?|$)"))
}

mod test_error;
mod test_object;
mod test_rewrite;
mod test_sts;
