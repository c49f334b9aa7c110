//! Security configuration and controller factory.

use std::sync::Arc;
use std::time::Duration;

use s3proxy_core::{ProxyError, ProxyResult, parse_key_value_list};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::facade::{OpenS3SecurityFacadeProvider, S3SecurityFacadeProvider, SecurityController};
use crate::opa::{DefaultOpaS3SecurityMapper, OpaClient, OpaS3SecurityFacadeProvider};

/// Which security provider is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProviderKind {
    /// Allow every authenticated request.
    #[default]
    Open,
    /// Ask a policy server.
    Opa,
}

impl std::str::FromStr for SecurityProviderKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "opa" => Ok(Self::Opa),
            other => Err(ProxyError::Configuration(format!(
                "unknown security provider: {other}"
            ))),
        }
    }
}

/// Security subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Active provider.
    pub provider: SecurityProviderKind,
    /// Policy decision endpoint for the OPA provider.
    pub opa_server_uri: Option<String>,
    /// Extra headers sent with each policy query.
    pub opa_headers: Vec<(String, String)>,
    /// Policy query timeout.
    pub opa_timeout_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            provider: SecurityProviderKind::Open,
            opa_server_uri: None,
            opa_headers: Vec::new(),
            opa_timeout_seconds: 5,
        }
    }
}

impl SecurityConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3PROXY_SECURITY_PROVIDER` | `open` |
    /// | `S3PROXY_OPA_SERVER_URI` | unset |
    /// | `S3PROXY_OPA_HEADERS` | empty (`name:value,...`) |
    /// | `S3PROXY_OPA_TIMEOUT_SECONDS` | `5` |
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("S3PROXY_SECURITY_PROVIDER") {
            config.provider = v.parse()?;
        }
        if let Ok(v) = std::env::var("S3PROXY_OPA_SERVER_URI") {
            config.opa_server_uri = Some(v);
        }
        if let Ok(v) = std::env::var("S3PROXY_OPA_HEADERS") {
            config.opa_headers = parse_key_value_list(&v, ':');
        }
        if let Ok(v) = std::env::var("S3PROXY_OPA_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                config.opa_timeout_seconds = n;
            }
        }

        Ok(config)
    }
}

/// Build the [`SecurityController`] described by `config`.
pub fn build_security_controller(config: &SecurityConfig) -> ProxyResult<SecurityController> {
    let provider: Arc<dyn S3SecurityFacadeProvider> = match config.provider {
        SecurityProviderKind::Open => Arc::new(OpenS3SecurityFacadeProvider),
        SecurityProviderKind::Opa => {
            let server_uri = config.opa_server_uri.clone().ok_or_else(|| {
                ProxyError::Configuration(
                    "S3PROXY_OPA_SERVER_URI is required for the opa provider".to_owned(),
                )
            })?;
            let mapper = Arc::new(DefaultOpaS3SecurityMapper::new(config.opa_headers.clone()));
            let client = OpaClient::new(mapper, Duration::from_secs(config.opa_timeout_seconds))?;
            Arc::new(OpaS3SecurityFacadeProvider::new(client, server_uri))
        }
    };

    info!(provider = ?config.provider, "Configured security provider");
    Ok(SecurityController::new(provider))
}
