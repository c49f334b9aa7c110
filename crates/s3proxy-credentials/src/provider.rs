//! Provider traits for credential lookup and role assumption.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3proxy_core::{Credential, Credentials, ProxyResult};

/// Resolves an emulated access key to its full credential record.
#[async_trait]
pub trait CredentialsProvider: Send + Sync + fmt::Debug {
    /// Look up `emulated_access_key`, optionally bound to `session`.
    ///
    /// `Ok(None)` means the key is unknown. Errors are reserved for failures
    /// of the backing store itself.
    async fn credentials(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>>;
}

/// Parameters of an `AssumeRole` call made with emulated credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// The caller's authenticated emulated credential.
    pub emulated: Credential,
    /// Region the call was scoped to.
    pub region: String,
    /// ARN of the role to assume.
    pub role_arn: String,
    /// External ID presented by the caller.
    pub external_id: Option<String>,
    /// Session name requested by the caller.
    pub role_session_name: Option<String>,
    /// Requested session lifetime.
    pub duration_seconds: Option<u64>,
}

/// A freshly minted emulated session for an assumed role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatedAssumedRole {
    /// The minted access key, secret key, and session token.
    pub emulated: Credential,
    /// ARN of the assumed-role session.
    pub arn: String,
    /// Opaque identifier of the session, `<role id>:<session name>`.
    pub role_id: String,
    /// When the session stops resolving.
    pub expiration: DateTime<Utc>,
}

/// Mints emulated sessions for role assumption.
#[async_trait]
pub trait AssumedRoleProvider: Send + Sync + fmt::Debug {
    /// Assume a role, or `Ok(None)` when the caller may not assume it.
    async fn assume_emulated_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> ProxyResult<Option<EmulatedAssumedRole>>;
}

/// The default: role assumption is unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAssumedRoleProvider;

#[async_trait]
impl AssumedRoleProvider for NoopAssumedRoleProvider {
    async fn assume_emulated_role(
        &self,
        _request: &AssumeRoleRequest,
    ) -> ProxyResult<Option<EmulatedAssumedRole>> {
        Ok(None)
    }
}
