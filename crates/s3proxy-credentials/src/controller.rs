//! The credentials facade used by the pipeline.

use std::sync::Arc;

use s3proxy_core::{Credentials, ProxyResult};
use tracing::debug;

use crate::provider::{
    AssumeRoleRequest, AssumedRoleProvider, CredentialsProvider, EmulatedAssumedRole,
    NoopAssumedRoleProvider,
};

/// Combines the active [`CredentialsProvider`] and [`AssumedRoleProvider`].
#[derive(Debug, Clone)]
pub struct CredentialsController {
    provider: Arc<dyn CredentialsProvider>,
    assumed_role_provider: Arc<dyn AssumedRoleProvider>,
}

impl CredentialsController {
    /// Create a controller from its two providers.
    #[must_use]
    pub fn new(
        provider: Arc<dyn CredentialsProvider>,
        assumed_role_provider: Arc<dyn AssumedRoleProvider>,
    ) -> Self {
        Self {
            provider,
            assumed_role_provider,
        }
    }

    /// A controller that does not support role assumption.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn CredentialsProvider>) -> Self {
        Self::new(provider, Arc::new(NoopAssumedRoleProvider))
    }

    /// Resolve an emulated access key.
    pub async fn credentials(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>> {
        let found = self.provider.credentials(emulated_access_key, session).await?;
        debug!(
            access_key = emulated_access_key,
            has_session = session.is_some(),
            found = found.is_some(),
            "Resolved credentials"
        );
        Ok(found)
    }

    /// Assume a role with emulated credentials.
    pub async fn assume_emulated_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> ProxyResult<Option<EmulatedAssumedRole>> {
        let assumed = self.assumed_role_provider.assume_emulated_role(request).await?;
        debug!(
            access_key = %request.emulated.access_key,
            role_arn = %request.role_arn,
            assumed = assumed.is_some(),
            "Assume role request handled"
        );
        Ok(assumed)
    }
}
