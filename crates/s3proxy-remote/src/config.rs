//! Remote configuration and factories.

use std::path::PathBuf;
use std::sync::Arc;

use s3proxy_core::{Credential, ProxyError, ProxyResult, parse_bool};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::connection::{
    CredentialsRemoteS3ConnectionProvider, FileRemoteS3ConnectionProvider, RemoteS3Connection,
    RemoteS3ConnectionProvider, StaticRemoteS3ConnectionProvider,
};
use crate::facade::{RemoteS3Facade, RemoteS3FacadeConfiguration, build_remote_s3_facade};

/// Which connection provider is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteConnectionProviderKind {
    /// [`CredentialsRemoteS3ConnectionProvider`].
    #[default]
    Credentials,
    /// [`StaticRemoteS3ConnectionProvider`].
    Static,
    /// [`FileRemoteS3ConnectionProvider`].
    File,
}

impl std::str::FromStr for RemoteConnectionProviderKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credentials" => Ok(Self::Credentials),
            "static" => Ok(Self::Static),
            "file" => Ok(Self::File),
            other => Err(ProxyError::Configuration(format!(
                "unknown remote connection provider: {other}"
            ))),
        }
    }
}

/// Remote subsystem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Active connection provider.
    pub connection_provider: RemoteConnectionProviderKind,
    /// Credential for the static provider.
    pub static_credential: Option<Credential>,
    /// JSON connections file for the file provider.
    pub connection_file: Option<PathBuf>,
    /// Global endpoint facade settings.
    pub facade: RemoteS3FacadeConfiguration,
}

impl RemoteConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3PROXY_REMOTE_CONNECTION_PROVIDER` | `credentials` |
    /// | `S3PROXY_REMOTE_ACCESS_KEY` | unset |
    /// | `S3PROXY_REMOTE_SECRET_KEY` | unset |
    /// | `S3PROXY_REMOTE_SESSION_TOKEN` | unset |
    /// | `S3PROXY_REMOTE_CONNECTION_FILE` | unset |
    /// | `S3PROXY_REMOTE_STYLE` | `path` |
    /// | `S3PROXY_REMOTE_DOMAIN` | `amazonaws.com` |
    /// | `S3PROXY_REMOTE_HTTPS` | `true` |
    /// | `S3PROXY_REMOTE_PORT` | unset |
    /// | `S3PROXY_REMOTE_HOSTNAME_TEMPLATE` | style default |
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("S3PROXY_REMOTE_CONNECTION_PROVIDER") {
            config.connection_provider = v.parse()?;
        }
        if let (Ok(access_key), Ok(secret_key)) = (
            std::env::var("S3PROXY_REMOTE_ACCESS_KEY"),
            std::env::var("S3PROXY_REMOTE_SECRET_KEY"),
        ) {
            let mut credential = Credential::new(access_key, secret_key);
            credential.session = std::env::var("S3PROXY_REMOTE_SESSION_TOKEN").ok();
            config.static_credential = Some(credential);
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_CONNECTION_FILE") {
            config.connection_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_STYLE") {
            config.facade.style = v.parse()?;
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_DOMAIN") {
            config.facade.domain = v;
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_HTTPS") {
            config.facade.https = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_PORT") {
            let port = v
                .parse::<u16>()
                .map_err(|e| ProxyError::Configuration(format!("invalid S3PROXY_REMOTE_PORT: {e}")))?;
            config.facade.port = Some(port);
        }
        if let Ok(v) = std::env::var("S3PROXY_REMOTE_HOSTNAME_TEMPLATE") {
            config.facade.hostname_template = Some(v);
        }

        Ok(config)
    }
}

/// Build the global endpoint facade described by `config`.
#[must_use]
pub fn build_global_facade(config: &RemoteConfig) -> Arc<dyn RemoteS3Facade> {
    build_remote_s3_facade(&config.facade)
}

/// Build the connection provider described by `config`.
pub fn build_connection_provider(
    config: &RemoteConfig,
) -> ProxyResult<Arc<dyn RemoteS3ConnectionProvider>> {
    let provider: Arc<dyn RemoteS3ConnectionProvider> = match config.connection_provider {
        RemoteConnectionProviderKind::Credentials => Arc::new(CredentialsRemoteS3ConnectionProvider),
        RemoteConnectionProviderKind::Static => {
            let credential = config.static_credential.clone().ok_or_else(|| {
                ProxyError::Configuration(
                    "S3PROXY_REMOTE_ACCESS_KEY and S3PROXY_REMOTE_SECRET_KEY are required for the static provider"
                        .to_owned(),
                )
            })?;
            Arc::new(StaticRemoteS3ConnectionProvider::new(RemoteS3Connection::new(
                credential,
            )))
        }
        RemoteConnectionProviderKind::File => {
            let path = config.connection_file.as_ref().ok_or_else(|| {
                ProxyError::Configuration(
                    "S3PROXY_REMOTE_CONNECTION_FILE is required for the file provider".to_owned(),
                )
            })?;
            Arc::new(FileRemoteS3ConnectionProvider::from_path(path)?)
        }
    };

    info!(
        provider = ?config.connection_provider,
        style = ?config.facade.style,
        domain = %config.facade.domain,
        "Configured remote connection provider"
    );
    Ok(provider)
}
