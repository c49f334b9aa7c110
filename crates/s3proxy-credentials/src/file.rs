//! Credentials loaded once from a JSON file.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use s3proxy_core::{Credentials, ProxyError, ProxyResult};
use tracing::info;

use crate::provider::CredentialsProvider;

/// A read-only snapshot of credentials keyed by emulated access key.
///
/// The file holds a JSON array of [`Credentials`]:
///
/// ```json
/// [{"emulated": {"accessKey": "EMU", "secretKey": "secret"},
///   "remote": {"accessKey": "REM", "secretKey": "remote-secret"},
///   "identity": {"user": "alice"}}]
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileCredentialsProvider {
    credentials: HashMap<String, Credentials>,
}

impl FileCredentialsProvider {
    /// Index `credentials` by emulated access key. Later duplicates win.
    #[must_use]
    pub fn new(credentials: impl IntoIterator<Item = Credentials>) -> Self {
        Self {
            credentials: credentials
                .into_iter()
                .map(|c| (c.emulated.access_key.clone(), c))
                .collect(),
        }
    }

    /// Parse a JSON array of credentials.
    pub fn from_json(json: &str) -> ProxyResult<Self> {
        let list: Vec<Credentials> = serde_json::from_str(json)
            .map_err(|e| ProxyError::Configuration(format!("invalid credentials JSON: {e}")))?;
        Ok(Self::new(list))
    }

    /// Load the JSON array at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Configuration(format!(
                "cannot read credentials file {}: {e}",
                path.display()
            ))
        })?;
        let provider = Self::from_json(&json)?;
        info!(path = %path.display(), count = provider.len(), "Loaded credentials file");
        Ok(provider)
    }

    /// Number of loaded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether no entries were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialsProvider for FileCredentialsProvider {
    async fn credentials(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>> {
        let found = self
            .credentials
            .get(emulated_access_key)
            .filter(|c| c.emulated.session.as_deref() == session);
        Ok(found.cloned())
    }
}
