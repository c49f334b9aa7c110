//! Credential and identity types shared across the proxy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, S3ErrorCode};

/// An access key / secret key pair with an optional session token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// The access key ID.
    pub access_key: String,
    /// The secret access key.
    pub secret_key: String,
    /// Session token for temporary credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Credential {
    /// Create a credential without a session token.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session: None,
        }
    }

    /// Create a credential bound to a session token.
    #[must_use]
    pub fn with_session(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session: Some(session.into()),
        }
    }
}

// Secrets stay out of debug output and therefore out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("session", &self.session.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Parameters for assuming a role against the upstream store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSessionRole {
    /// Region of the upstream STS service.
    pub region: String,
    /// ARN of the role to assume.
    pub role_arn: String,
    /// External ID presented when assuming the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Override for the upstream STS endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sts_endpoint: Option<String>,
}

/// The identity a credential set belongs to.
///
/// The proxy treats identities as opaque JSON objects; only `user` is
/// surfaced for logging and policy documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// User name, if the identity carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Every other attribute of the identity.
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Identity {
    /// Identity with only a user name.
    #[must_use]
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            attributes: serde_json::Map::new(),
        }
    }
}

/// A full credential record resolved from an emulated access key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// The credential clients sign their requests with.
    pub emulated: Credential,
    /// The credential used to reach the upstream store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<Credential>,
    /// Role to assume against the upstream store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_session_role: Option<RemoteSessionRole>,
    /// The identity the credentials belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl Credentials {
    /// Credentials that can only authenticate clients, not reach upstream.
    #[must_use]
    pub fn emulated_only(emulated: Credential) -> Self {
        Self {
            emulated,
            remote: None,
            remote_session_role: None,
            identity: None,
        }
    }

    /// Credentials with both an emulated and a remote credential.
    #[must_use]
    pub fn with_remote(emulated: Credential, remote: Credential) -> Self {
        Self {
            emulated,
            remote: Some(remote),
            remote_session_role: None,
            identity: None,
        }
    }

    /// The remote credential.
    ///
    /// # Errors
    ///
    /// Fails with [`ProxyError::NotFound`] when no remote credential is bound;
    /// the emulated credential is never used in its place.
    pub fn remote_credential(&self) -> Result<&Credential, ProxyError> {
        self.remote.as_ref().ok_or_else(|| ProxyError::NotFound {
            code: S3ErrorCode::NoSuchBucket,
            message: format!(
                "no remote credential is bound to access key {}",
                self.emulated.access_key
            ),
        })
    }

    /// Pick the credential identified by `selector`.
    ///
    /// # Errors
    ///
    /// See [`Credentials::remote_credential`].
    pub fn select(&self, selector: CredentialSelector) -> Result<&Credential, ProxyError> {
        match selector {
            CredentialSelector::Emulated => Ok(&self.emulated),
            CredentialSelector::Remote => self.remote_credential(),
        }
    }
}

/// Which credential of a [`Credentials`] record signs a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSelector {
    /// Verify or sign with the client-facing credential.
    Emulated,
    /// Sign with the upstream credential.
    Remote,
}
