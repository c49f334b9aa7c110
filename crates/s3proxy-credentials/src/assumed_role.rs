//! In-memory role assumption.
//!
//! [`InMemoryAssumedRoleProvider`] mints an emulated session for a caller whose
//! emulated secret checks out against the base provider. The minted session
//! keeps the caller's remote credential and identity and records the requested
//! role as a [`RemoteSessionRole`]. [`AssumedRoleCredentialsProvider`] makes
//! those sessions resolvable through the ordinary credentials lookup until
//! they expire.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use s3proxy_core::{Credential, Credentials, ProxyResult, RemoteSessionRole};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use crate::provider::{
    AssumeRoleRequest, AssumedRoleProvider, CredentialsProvider, EmulatedAssumedRole,
};

/// Default session lifetime.
pub const DEFAULT_DURATION_SECONDS: u64 = 3600;
/// Shortest session lifetime accepted.
pub const MIN_DURATION_SECONDS: u64 = 900;
/// Longest session lifetime accepted.
pub const MAX_DURATION_SECONDS: u64 = 43_200;

#[derive(Debug, Clone)]
struct AssumedSession {
    credentials: Credentials,
    expiration: DateTime<Utc>,
}

/// Minted sessions keyed by their emulated access key.
#[derive(Debug, Default)]
pub struct AssumedRoleSessions {
    sessions: DashMap<String, AssumedSession>,
}

impl AssumedRoleSessions {
    /// An empty session store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Store a session, sweeping every session expired at `now` first.
    fn insert(&self, credentials: Credentials, expiration: DateTime<Utc>, now: DateTime<Utc>) {
        self.sessions.retain(|_, s| s.expiration > now);
        self.sessions.insert(
            credentials.emulated.access_key.clone(),
            AssumedSession {
                credentials,
                expiration,
            },
        );
    }

    /// Returns `None` for unknown keys and for a session token mismatch.
    /// Expired sessions are evicted.
    fn lookup(
        &self,
        access_key: &str,
        session: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Credentials> {
        {
            let entry = self.sessions.get(access_key)?;
            if entry.expiration > now {
                return (entry.credentials.emulated.session.as_deref() == session)
                    .then(|| entry.credentials.clone());
            }
        }
        debug!(access_key, "Evicting expired assumed-role session");
        self.sessions.remove_if(access_key, |_, s| s.expiration <= now);
        None
    }
}

/// Mints emulated assumed-role sessions held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryAssumedRoleProvider {
    base: Arc<dyn CredentialsProvider>,
    sessions: Arc<AssumedRoleSessions>,
}

impl InMemoryAssumedRoleProvider {
    /// Validate callers against `base` and record sessions in `sessions`.
    #[must_use]
    pub fn new(base: Arc<dyn CredentialsProvider>, sessions: Arc<AssumedRoleSessions>) -> Self {
        Self { base, sessions }
    }
}

#[async_trait]
impl AssumedRoleProvider for InMemoryAssumedRoleProvider {
    async fn assume_emulated_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> ProxyResult<Option<EmulatedAssumedRole>> {
        let caller = &request.emulated;
        let Some(base) = self
            .base
            .credentials(&caller.access_key, caller.session.as_deref())
            .await?
        else {
            return Ok(None);
        };
        let secret_matches: bool = base
            .emulated
            .secret_key
            .as_bytes()
            .ct_eq(caller.secret_key.as_bytes())
            .into();
        if !secret_matches {
            debug!(access_key = %caller.access_key, "Assume role rejected: secret mismatch");
            return Ok(None);
        }

        let duration = request
            .duration_seconds
            .unwrap_or(DEFAULT_DURATION_SECONDS)
            .clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS);
        let now = Utc::now();
        let expiration = now + Duration::seconds(i64::try_from(duration).unwrap_or(i64::MAX));
        let session_name = request
            .role_session_name
            .clone()
            .unwrap_or_else(|| format!("session-{}", Uuid::new_v4().simple()));

        let minted = mint_credential();
        let credentials = Credentials {
            emulated: minted.clone(),
            remote: base.remote.clone(),
            remote_session_role: Some(RemoteSessionRole {
                region: request.region.clone(),
                role_arn: request.role_arn.clone(),
                external_id: request.external_id.clone(),
                sts_endpoint: None,
            }),
            identity: base.identity.clone(),
        };
        self.sessions.insert(credentials, expiration, now);

        info!(
            caller = %caller.access_key,
            assumed = %minted.access_key,
            role_arn = %request.role_arn,
            duration,
            "Assumed emulated role"
        );

        Ok(Some(EmulatedAssumedRole {
            arn: assumed_role_arn(&request.role_arn, &session_name),
            role_id: format!("{}:{session_name}", role_id()),
            emulated: minted,
            expiration,
        }))
    }
}

/// Resolves minted sessions first, then falls back to `base`.
#[derive(Debug, Clone)]
pub struct AssumedRoleCredentialsProvider {
    base: Arc<dyn CredentialsProvider>,
    sessions: Arc<AssumedRoleSessions>,
}

impl AssumedRoleCredentialsProvider {
    /// Decorate `base` with the sessions in `sessions`.
    #[must_use]
    pub fn new(base: Arc<dyn CredentialsProvider>, sessions: Arc<AssumedRoleSessions>) -> Self {
        Self { base, sessions }
    }
}

#[async_trait]
impl CredentialsProvider for AssumedRoleCredentialsProvider {
    async fn credentials(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>> {
        if let Some(found) = self.sessions.lookup(emulated_access_key, session, Utc::now()) {
            return Ok(Some(found));
        }
        self.base.credentials(emulated_access_key, session).await
    }
}

fn mint_credential() -> Credential {
    let key = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    let secret = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        &Uuid::new_v4().simple().to_string()[..8]
    );
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    Credential::with_session(format!("ASIA{}", &key[..16]), secret, token)
}

/// `arn:aws:iam::123:role/path/name` -> `arn:aws:sts::123:assumed-role/name/session`
fn assumed_role_arn(role_arn: &str, session_name: &str) -> String {
    let mut parts = role_arn.splitn(6, ':');
    let account = parts.nth(4).unwrap_or_default();
    let role_name = role_arn.rsplit('/').next().unwrap_or(role_arn);
    format!("arn:aws:sts::{account}:assumed-role/{role_name}/{session_name}")
}

fn role_id() -> String {
    let id = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    format!("AROA{}", &id[..17])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileCredentialsProvider;

    fn base() -> Arc<dyn CredentialsProvider> {
        Arc::new(FileCredentialsProvider::new([Credentials {
            emulated: Credential::new("EMU", "emu-secret"),
            remote: Some(Credential::new("REM", "rem-secret")),
            remote_session_role: None,
            identity: Some(s3proxy_core::Identity::user("alice")),
        }]))
    }

    fn request(secret: &str, duration_seconds: Option<u64>) -> AssumeRoleRequest {
        AssumeRoleRequest {
            emulated: Credential::new("EMU", secret),
            region: "us-east-1".to_owned(),
            role_arn: "arn:aws:iam::123456789012:role/reader".to_owned(),
            external_id: Some("ext".to_owned()),
            role_session_name: Some("etl".to_owned()),
            duration_seconds,
        }
    }

    #[tokio::test]
    async fn test_should_mint_session_resolvable_through_lookup() {
        let sessions = Arc::new(AssumedRoleSessions::new());
        let assumer = InMemoryAssumedRoleProvider::new(base(), Arc::clone(&sessions));
        let lookup = AssumedRoleCredentialsProvider::new(base(), Arc::clone(&sessions));

        let assumed = assumer
            .assume_emulated_role(&request("emu-secret", None))
            .await
            .unwrap()
            .unwrap();
        assert!(assumed.emulated.access_key.starts_with("ASIA"));
        assert_eq!(assumed.emulated.access_key.len(), 20);
        assert_eq!(
            assumed.arn,
            "arn:aws:sts::123456789012:assumed-role/reader/etl"
        );

        let token = assumed.emulated.session.clone();
        let resolved = lookup
            .credentials(&assumed.emulated.access_key, token.as_deref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.emulated.secret_key, assumed.emulated.secret_key);
        assert_eq!(resolved.remote.unwrap().access_key, "REM");
        assert_eq!(
            resolved.identity.and_then(|i| i.user).as_deref(),
            Some("alice")
        );
        let role = resolved.remote_session_role.unwrap();
        assert_eq!(role.role_arn, "arn:aws:iam::123456789012:role/reader");
        assert_eq!(role.external_id.as_deref(), Some("ext"));

        assert!(
            lookup
                .credentials(&assumed.emulated.access_key, Some("wrong"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(lookup.credentials("EMU", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_reject_caller_with_wrong_secret() {
        let sessions = Arc::new(AssumedRoleSessions::new());
        let assumer = InMemoryAssumedRoleProvider::new(base(), Arc::clone(&sessions));

        let result = assumer
            .assume_emulated_role(&request("wrong", None))
            .await
            .unwrap();
        assert!(result.is_none());
        let prefix = assumer
            .assume_emulated_role(&request("emu-secre", None))
            .await
            .unwrap();
        assert!(prefix.is_none());
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_should_clamp_requested_duration() {
        let sessions = Arc::new(AssumedRoleSessions::new());
        let assumer = InMemoryAssumedRoleProvider::new(base(), sessions);

        let short = assumer
            .assume_emulated_role(&request("emu-secret", Some(1)))
            .await
            .unwrap()
            .unwrap();
        let remaining = (short.expiration - Utc::now()).num_seconds();
        assert!(remaining > 800 && remaining <= 900, "{remaining}");
    }

    #[test]
    fn test_should_evict_expired_sessions_on_lookup() {
        let sessions = AssumedRoleSessions::new();
        let now = Utc::now();
        sessions.insert(
            Credentials::emulated_only(Credential::with_session("ASIAX", "s", "t")),
            now - Duration::seconds(1),
            now,
        );

        assert!(sessions.lookup("ASIAX", Some("t"), now).is_none());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_should_sweep_expired_sessions_when_minting() {
        let sessions = AssumedRoleSessions::new();
        let now = Utc::now();
        for key in ["ASIAA", "ASIAB", "ASIAC"] {
            sessions.insert(
                Credentials::emulated_only(Credential::with_session(key, "s", "t")),
                now + Duration::seconds(60),
                now,
            );
        }
        assert_eq!(sessions.len(), 3);

        let later = now + Duration::seconds(120);
        sessions.insert(
            Credentials::emulated_only(Credential::with_session("ASIAD", "s", "t")),
            later + Duration::seconds(60),
            later,
        );
        assert_eq!(sessions.len(), 1);
        assert!(sessions.lookup("ASIAD", Some("t"), later).is_some());
    }
}
