//! The security decision chain.
//!
//! A [`S3SecurityFacadeProvider`] builds one [`S3SecurityFacade`] per request.
//! The facade then decides whether the request's action may proceed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use s3proxy_core::{ParsedS3Request, ProxyError, ProxyResult, SigningMetadata};
use tracing::debug;

use crate::action::action_from_query;
use crate::logging::RequestLoggingSession;

/// Outcome of a security decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityResponse {
    /// The request may proceed.
    Success,
    /// The request is denied, with an optional reason.
    Failure(Option<String>),
}

impl SecurityResponse {
    /// A denial with a reason.
    #[must_use]
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(Some(reason.into()))
    }

    /// Whether the request may proceed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Convert a denial into [`ProxyError::Authorization`].
    pub fn into_result(self) -> ProxyResult<()> {
        match self {
            Self::Success => Ok(()),
            Self::Failure(reason) => Err(ProxyError::authorization_denied(reason)),
        }
    }
}

/// Per-request authorization decision.
#[async_trait]
pub trait S3SecurityFacade: Send + Sync {
    /// Decide whether `action` (see [`action_from_query`]) may proceed.
    async fn apply(&self, action: Option<&str>) -> ProxyResult<SecurityResponse>;
}

/// Creates a facade for each authenticated request.
#[async_trait]
pub trait S3SecurityFacadeProvider: Send + Sync + fmt::Debug {
    /// Build the facade that decides on `request`.
    async fn facade_for_request(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<Box<dyn S3SecurityFacade>>;
}

/// Allows every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenS3SecurityFacadeProvider;

struct OpenS3SecurityFacade;

#[async_trait]
impl S3SecurityFacade for OpenS3SecurityFacade {
    async fn apply(&self, _action: Option<&str>) -> ProxyResult<SecurityResponse> {
        Ok(SecurityResponse::Success)
    }
}

#[async_trait]
impl S3SecurityFacadeProvider for OpenS3SecurityFacadeProvider {
    async fn facade_for_request(
        &self,
        _request: &ParsedS3Request,
        _metadata: &SigningMetadata,
        _session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<Box<dyn S3SecurityFacade>> {
        Ok(Box::new(OpenS3SecurityFacade))
    }
}

/// Runs the configured provider's facade against each request.
#[derive(Debug, Clone)]
pub struct SecurityController {
    provider: Arc<dyn S3SecurityFacadeProvider>,
}

impl Default for SecurityController {
    fn default() -> Self {
        Self::new(Arc::new(OpenS3SecurityFacadeProvider))
    }
}

impl SecurityController {
    /// Create a controller around `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn S3SecurityFacadeProvider>) -> Self {
        Self { provider }
    }

    /// Decide on `request`.
    ///
    /// Provider and facade errors propagate unchanged; they are never turned
    /// into a [`SecurityResponse::Failure`].
    pub async fn apply(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<SecurityResponse> {
        let action = action_from_query(request.raw_query.as_deref());
        let facade = self
            .provider
            .facade_for_request(request, metadata, Arc::clone(&session))
            .await?;
        let response = facade.apply(action.as_deref()).await?;

        debug!(
            request_id = %request.request_id,
            action = action.as_deref().unwrap_or(""),
            allowed = response.is_success(),
            "Security decision"
        );
        session.log_property("security.allowed", if response.is_success() { "true" } else { "false" });
        Ok(response)
    }
}
