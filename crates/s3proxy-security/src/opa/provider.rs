use std::sync::Arc;

use async_trait::async_trait;
use s3proxy_core::{ParsedS3Request, ProxyResult, SigningMetadata};

use super::client::OpaClient;
use crate::facade::{S3SecurityFacade, S3SecurityFacadeProvider, SecurityResponse};
use crate::logging::RequestLoggingSession;

/// Decides every request by querying a policy server.
#[derive(Debug, Clone)]
pub struct OpaS3SecurityFacadeProvider {
    client: OpaClient,
    server_uri: String,
}

impl OpaS3SecurityFacadeProvider {
    /// Query `server_uri` through `client`.
    #[must_use]
    pub fn new(client: OpaClient, server_uri: impl Into<String>) -> Self {
        Self {
            client,
            server_uri: server_uri.into(),
        }
    }
}

struct OpaS3SecurityFacade {
    client: OpaClient,
    server_uri: String,
    request: ParsedS3Request,
    metadata: SigningMetadata,
    session: Arc<dyn RequestLoggingSession>,
}

#[async_trait]
impl S3SecurityFacade for OpaS3SecurityFacade {
    async fn apply(&self, action: Option<&str>) -> ProxyResult<SecurityResponse> {
        let query = self.client.mapper().to_request(
            &self.server_uri,
            &self.request,
            &self.metadata,
            action,
        )?;

        match self.client.get_security_response(&query).await {
            Ok(response) => {
                let decision = if response.is_success() { "allow" } else { "deny" };
                self.session.log_property("opa.decision", decision);
                Ok(response)
            }
            Err(e) => {
                self.session.log_error("opa", &e.to_string());
                Err(e)
            }
        }
    }
}

#[async_trait]
impl S3SecurityFacadeProvider for OpaS3SecurityFacadeProvider {
    async fn facade_for_request(
        &self,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        session: Arc<dyn RequestLoggingSession>,
    ) -> ProxyResult<Box<dyn S3SecurityFacade>> {
        Ok(Box::new(OpaS3SecurityFacade {
            client: self.client.clone(),
            server_uri: self.server_uri.clone(),
            request: request.clone(),
            metadata: metadata.clone(),
            session,
        }))
    }
}
