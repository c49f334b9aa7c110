//! s3proxy server - an S3 proxy that swaps emulated credentials for real ones.
//!
//! Clients sign requests with emulated credentials. The proxy verifies them,
//! applies the configured security policy and bucket rewrites, resolves the
//! upstream store, and forwards the request re-signed with the remote
//! credential.
//!
//! # Usage
//!
//! ```text
//! S3PROXY_CREDENTIALS_FILE=credentials.json s3proxy-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `S3PROXY_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `S3PROXY_CREDENTIALS_PROVIDER` | `file` | `file` or `http` |
//! | `S3PROXY_SECURITY_PROVIDER` | `open` | `open` or `opa` |
//! | `S3PROXY_REMOTE_CONNECTION_PROVIDER` | `credentials` | `credentials`, `static` or `file` |
//! | `S3PROXY_MAX_BODY_BYTES` | `268435456` | Largest buffered request body |
//! | `S3PROXY_BUCKET_MAPPINGS` | *(unset)* | `alias=bucket[/prefix],...` |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | `text` | `text` or `json` |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use s3proxy_auth::SigningController;
use s3proxy_core::ProxyConfig;
use s3proxy_credentials::{CredentialsConfig, build_credentials_controller};
use s3proxy_http::{ProxyHttpService, ProxyPipeline, RewriterConfig, build_rewriter};
use s3proxy_remote::{RemoteConfig, build_connection_provider, build_global_facade};
use s3proxy_security::{SecurityConfig, build_security_controller};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to `LOG_LEVEL`.
fn init_tracing(log_level: &str, log_format: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if log_format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

/// Assemble the pipeline from each subsystem's environment configuration.
fn build_pipeline(config: &ProxyConfig) -> Result<ProxyPipeline> {
    let credentials_config =
        CredentialsConfig::from_env().context("invalid credentials configuration")?;
    let security_config = SecurityConfig::from_env().context("invalid security configuration")?;
    let remote_config = RemoteConfig::from_env().context("invalid remote configuration")?;
    let rewriter_config = RewriterConfig::from_env().context("invalid rewriter configuration")?;

    let credentials = build_credentials_controller(&credentials_config)
        .context("failed to build credentials provider")?;
    let security = build_security_controller(&security_config)
        .context("failed to build security provider")?;
    let connections = build_connection_provider(&remote_config)
        .context("failed to build remote connection provider")?;

    info!(
        credentials_provider = ?credentials_config.provider,
        security_provider = ?security_config.provider,
        connection_provider = ?remote_config.connection_provider,
        remote_style = ?remote_config.facade.style,
        bucket_mappings = rewriter_config.bucket_mappings.len(),
        "configured proxy pipeline",
    );

    Ok(ProxyPipeline::builder()
        .signing(SigningController::new(Duration::from_secs(
            config.max_clock_drift_seconds,
        )))
        .credentials(credentials)
        .security(security)
        .rewriter(build_rewriter(&rewriter_config))
        .connections(connections)
        .facade(build_global_facade(&remote_config))
        .build())
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: ProxyHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Check the health endpoint of a running proxy.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ProxyConfig::from_env();

    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level, &config.log_format)?;

    info!(
        listen = %config.listen,
        path_prefix = ?config.path_prefix,
        max_clock_drift_seconds = config.max_clock_drift_seconds,
        upstream_timeout_seconds = config.upstream_timeout_seconds,
        max_body_bytes = config.max_body_bytes,
        version = VERSION,
        "starting s3proxy",
    );

    let pipeline = build_pipeline(&config)?;
    let service =
        ProxyHttpService::new(pipeline, &config).context("failed to build proxy service")?;

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await
}
