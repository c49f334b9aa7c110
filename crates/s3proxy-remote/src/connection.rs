//! Upstream connection resolution.
//!
//! A [`RemoteS3Connection`] names the credential, optional session role, and
//! optional endpoint facade used to reach the upstream store for one
//! request. Providers return `None` when nothing backs the request; callers
//! must reject such requests rather than fall back to another store.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use s3proxy_core::{
    Credential, Identity, ParsedS3Request, ProxyError, ProxyResult, RemoteSessionRole,
    SigningMetadata,
};
use serde::Deserialize;
use tracing::info;

use crate::facade::{RemoteS3Facade, RemoteS3FacadeConfiguration, build_remote_s3_facade};

/// How to reach the upstream store for one request.
#[derive(Debug, Clone)]
pub struct RemoteS3Connection {
    /// Credential used to sign the upstream request.
    pub remote_credential: Credential,
    /// Role to assume upstream before dispatch.
    pub remote_session_role: Option<RemoteSessionRole>,
    /// Connection-specific endpoint facade.
    pub remote_s3_facade: Option<Arc<dyn RemoteS3Facade>>,
}

impl RemoteS3Connection {
    /// A connection with only a credential.
    #[must_use]
    pub fn new(remote_credential: Credential) -> Self {
        Self {
            remote_credential,
            remote_session_role: None,
            remote_s3_facade: None,
        }
    }
}

/// Resolves the upstream connection for an authenticated request.
#[async_trait]
pub trait RemoteS3ConnectionProvider: Send + Sync + fmt::Debug {
    /// The connection for `request`, or `None` if nothing backs it.
    async fn remote_connection(
        &self,
        metadata: &SigningMetadata,
        identity: Option<&Identity>,
        request: &ParsedS3Request,
    ) -> ProxyResult<Option<RemoteS3Connection>>;
}

/// Uses the remote half of the caller's resolved credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialsRemoteS3ConnectionProvider;

#[async_trait]
impl RemoteS3ConnectionProvider for CredentialsRemoteS3ConnectionProvider {
    async fn remote_connection(
        &self,
        metadata: &SigningMetadata,
        _identity: Option<&Identity>,
        _request: &ParsedS3Request,
    ) -> ProxyResult<Option<RemoteS3Connection>> {
        let credentials = &metadata.credentials;
        Ok(credentials.remote.clone().map(|remote| RemoteS3Connection {
            remote_credential: remote,
            remote_session_role: credentials.remote_session_role.clone(),
            remote_s3_facade: None,
        }))
    }
}

/// Returns one configured connection for every request.
#[derive(Debug, Clone)]
pub struct StaticRemoteS3ConnectionProvider {
    connection: RemoteS3Connection,
}

impl StaticRemoteS3ConnectionProvider {
    /// Always answer with `connection`.
    #[must_use]
    pub fn new(connection: RemoteS3Connection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl RemoteS3ConnectionProvider for StaticRemoteS3ConnectionProvider {
    async fn remote_connection(
        &self,
        _metadata: &SigningMetadata,
        _identity: Option<&Identity>,
        _request: &ParsedS3Request,
    ) -> ProxyResult<Option<RemoteS3Connection>> {
        Ok(Some(self.connection.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionEntry {
    remote_credential: Credential,
    #[serde(default)]
    remote_session_role: Option<RemoteSessionRole>,
    #[serde(default)]
    remote_s3_facade_configuration: Option<RemoteS3FacadeConfiguration>,
}

/// Connections keyed by emulated access key, loaded from JSON.
///
/// ```json
/// {
///   "AKEXAMPLE": {
///     "remoteCredential": {"accessKey": "...", "secretKey": "..."},
///     "remoteS3FacadeConfiguration": {"style": "virtual-host"}
///   }
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileRemoteS3ConnectionProvider {
    connections: HashMap<String, RemoteS3Connection>,
}

impl FileRemoteS3ConnectionProvider {
    /// Parse connections from a JSON document.
    pub fn from_json(json: &str) -> ProxyResult<Self> {
        let entries: HashMap<String, ConnectionEntry> = serde_json::from_str(json)
            .map_err(|e| ProxyError::Configuration(format!("invalid connections file: {e}")))?;

        let connections = entries
            .into_iter()
            .map(|(access_key, entry)| {
                let connection = RemoteS3Connection {
                    remote_credential: entry.remote_credential,
                    remote_session_role: entry.remote_session_role,
                    remote_s3_facade: entry
                        .remote_s3_facade_configuration
                        .as_ref()
                        .map(build_remote_s3_facade),
                };
                (access_key, connection)
            })
            .collect();

        Ok(Self { connections })
    }

    /// Load connections from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Configuration(format!(
                "failed to read connections file {}: {e}",
                path.display()
            ))
        })?;
        let provider = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            connections = provider.connections.len(),
            "Loaded remote connections"
        );
        Ok(provider)
    }

    /// Number of configured connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[async_trait]
impl RemoteS3ConnectionProvider for FileRemoteS3ConnectionProvider {
    async fn remote_connection(
        &self,
        metadata: &SigningMetadata,
        _identity: Option<&Identity>,
        _request: &ParsedS3Request,
    ) -> ProxyResult<Option<RemoteS3Connection>> {
        Ok(self
            .connections
            .get(&metadata.credentials.emulated.access_key)
            .cloned())
    }
}

type ConnectionFn = dyn Fn(&SigningMetadata, Option<&Identity>, &ParsedS3Request) -> ProxyResult<Option<RemoteS3Connection>>
    + Send
    + Sync;

/// Resolves connections through a closure.
#[derive(Clone)]
pub struct DelegatingRemoteS3ConnectionProvider {
    delegate: Arc<ConnectionFn>,
}

impl DelegatingRemoteS3ConnectionProvider {
    /// Resolve every connection by calling `delegate`.
    pub fn new<F>(delegate: F) -> Self
    where
        F: Fn(&SigningMetadata, Option<&Identity>, &ParsedS3Request) -> ProxyResult<Option<RemoteS3Connection>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            delegate: Arc::new(delegate),
        }
    }
}

impl fmt::Debug for DelegatingRemoteS3ConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatingRemoteS3ConnectionProvider")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteS3ConnectionProvider for DelegatingRemoteS3ConnectionProvider {
    async fn remote_connection(
        &self,
        metadata: &SigningMetadata,
        identity: Option<&Identity>,
        request: &ParsedS3Request,
    ) -> ProxyResult<Option<RemoteS3Connection>> {
        (self.delegate)(metadata, identity, request)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use s3proxy_core::{
        AuthorizationSource, Credentials, MultiMap, RequestAuthorization, RequestContent,
        SigningServiceType,
    };

    use super::*;

    pub(crate) fn request(bucket: &str, key: &str) -> ParsedS3Request {
        ParsedS3Request {
            request_id: "req-1".to_owned(),
            request_authorization: RequestAuthorization {
                access_key: "EMU".to_owned(),
                date: "20240101".to_owned(),
                region: "us-east-1".to_owned(),
                service: "s3".to_owned(),
                signed_headers: vec!["host".to_owned()],
                signature: "sig".to_owned(),
                security_token: None,
                source: AuthorizationSource::Header,
            },
            request_date: "20240101T000000Z".to_owned(),
            bucket_name: bucket.to_owned(),
            key_in_bucket: key.to_owned(),
            headers: MultiMap::empty(),
            query_parameters: MultiMap::empty(),
            http_verb: "GET".to_owned(),
            raw_path: format!("/{bucket}/{key}"),
            raw_query: None,
            request_content: RequestContent::Empty,
        }
    }

    pub(crate) fn metadata(credentials: Credentials) -> SigningMetadata {
        SigningMetadata::new(
            SigningServiceType::S3,
            credentials,
            Some("us-east-1".to_owned()),
        )
    }

    #[tokio::test]
    async fn test_should_use_remote_half_of_credentials() {
        let mut credentials =
            Credentials::with_remote(Credential::new("EMU", "s"), Credential::new("REM", "r"));
        credentials.remote_session_role = Some(RemoteSessionRole {
            region: "us-east-1".to_owned(),
            role_arn: "arn:aws:iam::1:role/r".to_owned(),
            external_id: None,
            sts_endpoint: None,
        });

        let connection = CredentialsRemoteS3ConnectionProvider
            .remote_connection(&metadata(credentials), None, &request("b", "k"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(connection.remote_credential.access_key, "REM");
        assert!(connection.remote_session_role.is_some());
        assert!(connection.remote_s3_facade.is_none());
    }

    #[tokio::test]
    async fn test_should_return_none_without_remote_credential() {
        let connection = CredentialsRemoteS3ConnectionProvider
            .remote_connection(
                &metadata(Credentials::emulated_only(Credential::new("EMU", "s"))),
                None,
                &request("b", "k"),
            )
            .await
            .unwrap();
        assert!(connection.is_none());
    }

    #[tokio::test]
    async fn test_should_load_connections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "EMU": {
                    "remoteCredential": {"accessKey": "REM", "secretKey": "r"},
                    "remoteS3FacadeConfiguration": {"style": "virtual-host", "domain": "example.com"}
                },
                "OTHER": {"remoteCredential": {"accessKey": "REM2", "secretKey": "r2"}}
            }"#,
        )
        .unwrap();

        let provider = FileRemoteS3ConnectionProvider::from_path(file.path()).unwrap();
        assert_eq!(provider.len(), 2);

        let connection = provider
            .remote_connection(
                &metadata(Credentials::emulated_only(Credential::new("EMU", "s"))),
                None,
                &request("b", "k"),
            )
            .await
            .unwrap()
            .unwrap();
        let uri = connection
            .remote_s3_facade
            .unwrap()
            .build_endpoint("k", "b", "us-east-1", None)
            .unwrap();
        assert_eq!(uri.to_string(), "https://b.s3.us-east-1.example.com/k");

        let missing = provider
            .remote_connection(
                &metadata(Credentials::emulated_only(Credential::new("NOPE", "s"))),
                None,
                &request("b", "k"),
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_should_reject_invalid_connections_file() {
        let err = FileRemoteS3ConnectionProvider::from_json("[]").unwrap_err();
        assert!(matches!(err, ProxyError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_should_delegate_to_closure() {
        let provider = DelegatingRemoteS3ConnectionProvider::new(|_, _, request| {
            Ok((request.bucket_name == "mapped")
                .then(|| RemoteS3Connection::new(Credential::new("REM", "r"))))
        });
        let md = metadata(Credentials::emulated_only(Credential::new("EMU", "s")));

        assert!(
            provider
                .remote_connection(&md, None, &request("mapped", "k"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            provider
                .remote_connection(&md, None, &request("other", "k"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
