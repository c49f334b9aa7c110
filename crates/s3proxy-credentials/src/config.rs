//! Credentials configuration and controller factory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use s3proxy_core::{ProxyError, ProxyResult, parse_bool, parse_key_value_list};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assumed_role::{
    AssumedRoleCredentialsProvider, AssumedRoleSessions, InMemoryAssumedRoleProvider,
};
use crate::controller::CredentialsController;
use crate::file::FileCredentialsProvider;
use crate::http::{HttpCredentialsProvider, HttpCredentialsSettings};
use crate::provider::{AssumedRoleProvider, CredentialsProvider, NoopAssumedRoleProvider};

/// Which credentials provider is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialsProviderKind {
    /// [`FileCredentialsProvider`].
    #[default]
    File,
    /// [`HttpCredentialsProvider`].
    Http,
}

impl std::str::FromStr for CredentialsProviderKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "http" => Ok(Self::Http),
            other => Err(ProxyError::Configuration(format!(
                "unknown credentials provider: {other}"
            ))),
        }
    }
}

/// Credentials subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    /// Active provider.
    pub provider: CredentialsProviderKind,
    /// JSON credentials file for the file provider.
    pub file_path: Option<PathBuf>,
    /// Base URL for the HTTP provider.
    pub http_endpoint: Option<String>,
    /// Extra headers sent to the HTTP provider.
    pub http_headers: Vec<(String, String)>,
    /// HTTP provider cache size; `0` disables caching.
    pub http_cache_size: u64,
    /// HTTP provider cache entry lifetime.
    pub http_cache_ttl_seconds: u64,
    /// HTTP provider request timeout.
    pub http_timeout_seconds: u64,
    /// Enable in-memory role assumption.
    pub assumed_roles: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            provider: CredentialsProviderKind::File,
            file_path: None,
            http_endpoint: None,
            http_headers: Vec::new(),
            http_cache_size: 0,
            http_cache_ttl_seconds: 300,
            http_timeout_seconds: 10,
            assumed_roles: false,
        }
    }
}

impl CredentialsConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3PROXY_CREDENTIALS_PROVIDER` | `file` |
    /// | `S3PROXY_CREDENTIALS_FILE` | unset |
    /// | `S3PROXY_CREDENTIALS_HTTP_ENDPOINT` | unset |
    /// | `S3PROXY_CREDENTIALS_HTTP_HEADERS` | empty (`name:value,...`) |
    /// | `S3PROXY_CREDENTIALS_HTTP_CACHE_SIZE` | `0` |
    /// | `S3PROXY_CREDENTIALS_HTTP_CACHE_TTL_SECONDS` | `300` |
    /// | `S3PROXY_CREDENTIALS_HTTP_TIMEOUT_SECONDS` | `10` |
    /// | `S3PROXY_ASSUMED_ROLES` | `false` |
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_PROVIDER") {
            config.provider = v.parse()?;
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_FILE") {
            config.file_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_HTTP_ENDPOINT") {
            config.http_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_HTTP_HEADERS") {
            config.http_headers = parse_key_value_list(&v, ':');
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_HTTP_CACHE_SIZE") {
            if let Ok(n) = v.parse::<u64>() {
                config.http_cache_size = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_HTTP_CACHE_TTL_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                config.http_cache_ttl_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_CREDENTIALS_HTTP_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                config.http_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_ASSUMED_ROLES") {
            config.assumed_roles = parse_bool(&v);
        }

        Ok(config)
    }
}

/// Build the [`CredentialsController`] described by `config`.
pub fn build_credentials_controller(config: &CredentialsConfig) -> ProxyResult<CredentialsController> {
    let base: Arc<dyn CredentialsProvider> = match config.provider {
        CredentialsProviderKind::File => {
            let path = config.file_path.as_ref().ok_or_else(|| {
                ProxyError::Configuration(
                    "S3PROXY_CREDENTIALS_FILE is required for the file provider".to_owned(),
                )
            })?;
            Arc::new(FileCredentialsProvider::from_path(path)?)
        }
        CredentialsProviderKind::Http => {
            let endpoint = config.http_endpoint.clone().ok_or_else(|| {
                ProxyError::Configuration(
                    "S3PROXY_CREDENTIALS_HTTP_ENDPOINT is required for the http provider"
                        .to_owned(),
                )
            })?;
            Arc::new(HttpCredentialsProvider::new(&HttpCredentialsSettings {
                endpoint,
                headers: config.http_headers.clone(),
                timeout: Duration::from_secs(config.http_timeout_seconds),
                cache_size: config.http_cache_size,
                cache_ttl: Duration::from_secs(config.http_cache_ttl_seconds),
            })?)
        }
    };

    info!(
        provider = ?config.provider,
        assumed_roles = config.assumed_roles,
        "Configured credentials provider"
    );

    if !config.assumed_roles {
        let assumed: Arc<dyn AssumedRoleProvider> = Arc::new(NoopAssumedRoleProvider);
        return Ok(CredentialsController::new(base, assumed));
    }

    let sessions = Arc::new(AssumedRoleSessions::new());
    let provider = Arc::new(AssumedRoleCredentialsProvider::new(
        Arc::clone(&base),
        Arc::clone(&sessions),
    ));
    let assumed = Arc::new(InMemoryAssumedRoleProvider::new(base, sessions));
    Ok(CredentialsController::new(provider, assumed))
}
