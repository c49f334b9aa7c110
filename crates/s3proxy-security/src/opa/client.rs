use std::sync::Arc;
use std::time::Duration;

use s3proxy_core::{ProxyError, ProxyResult};
use serde_json::Value;
use tracing::debug;

use super::mapper::OpaS3SecurityMapper;
use crate::facade::SecurityResponse;

/// A policy query ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct OpaRequest {
    /// Full URI of the policy decision endpoint.
    pub server_uri: String,
    /// Query document, before [`OpaS3SecurityMapper::wrap_document`].
    pub document: Value,
    /// Extra headers sent with the query.
    pub additional_headers: Vec<(String, String)>,
}

/// Sends policy queries over HTTP.
#[derive(Debug, Clone)]
pub struct OpaClient {
    client: reqwest::Client,
    mapper: Arc<dyn OpaS3SecurityMapper>,
}

impl OpaClient {
    /// Create a client whose queries time out after `timeout`.
    pub fn new(mapper: Arc<dyn OpaS3SecurityMapper>, timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProxyError::Configuration(format!("failed to build OPA client: {e}")))?;
        Ok(Self { client, mapper })
    }

    /// The mapper used to shape queries and answers.
    #[must_use]
    pub fn mapper(&self) -> &Arc<dyn OpaS3SecurityMapper> {
        &self.mapper
    }

    /// POST `request` and interpret the answer.
    pub async fn get_security_response(&self, request: &OpaRequest) -> ProxyResult<SecurityResponse> {
        let body = self.mapper.wrap_document(request.document.clone());

        let mut builder = self.client.post(&request.server_uri).json(&body);
        for (name, value) in &request.additional_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProxyError::upstream(format!("policy server request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::upstream(format!(
                "policy server returned {status}"
            )));
        }

        let answer: Value = response
            .json()
            .await
            .map_err(|e| ProxyError::upstream(format!("invalid policy server response: {e}")))?;

        let decision = self.mapper.to_security_response(&answer);
        debug!(
            server_uri = %request.server_uri,
            allowed = decision.is_success(),
            "Policy server answered"
        );
        Ok(decision)
    }
}
