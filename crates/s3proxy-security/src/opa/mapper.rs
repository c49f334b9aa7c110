use std::fmt;

use s3proxy_core::{ParsedS3Request, ProxyResult, SigningMetadata};
use serde_json::{Value, json};

use super::client::OpaRequest;
use crate::facade::SecurityResponse;

/// Maps requests to policy documents and policy answers to decisions.
pub trait OpaS3SecurityMapper: Send + Sync + fmt::Debug {
    /// Build the policy query for `request`.
    fn to_request(
        &self,
        server_uri: &str,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        action: Option<&str>,
    ) -> ProxyResult<OpaRequest>;

    /// Wrap the query document into the request body.
    fn wrap_document(&self, document: Value) -> Value {
        json!({ "input": document })
    }

    /// Interpret the policy server's answer.
    ///
    /// Anything other than a boolean `true` in `result` denies.
    fn to_security_response(&self, response: &Value) -> SecurityResponse {
        match response.get("result").and_then(Value::as_bool) {
            Some(true) => SecurityResponse::Success,
            _ => SecurityResponse::Failure(None),
        }
    }
}

/// Describes the request, action, and caller identity. Secrets are never
/// included.
#[derive(Debug, Clone, Default)]
pub struct DefaultOpaS3SecurityMapper {
    additional_headers: Vec<(String, String)>,
}

impl DefaultOpaS3SecurityMapper {
    /// A mapper that sends `additional_headers` with every query.
    #[must_use]
    pub fn new(additional_headers: Vec<(String, String)>) -> Self {
        Self { additional_headers }
    }
}

impl OpaS3SecurityMapper for DefaultOpaS3SecurityMapper {
    fn to_request(
        &self,
        server_uri: &str,
        request: &ParsedS3Request,
        metadata: &SigningMetadata,
        action: Option<&str>,
    ) -> ProxyResult<OpaRequest> {
        let query: serde_json::Map<String, Value> = request
            .query_parameters
            .entry_set()
            .map(|(k, v)| (k.to_owned(), json!(v)))
            .collect();

        let document = json!({
            "request": {
                "id": request.request_id,
                "method": request.http_verb,
                "bucket": request.bucket_name,
                "key": request.key_in_bucket,
                "action": action,
                "path": request.raw_path,
                "query": query,
            },
            "accessKey": metadata.credentials.emulated.access_key,
            "identity": metadata.credentials.identity,
            "region": metadata.region,
            "service": metadata.service_type.service_name(),
        });

        Ok(OpaRequest {
            server_uri: server_uri.to_owned(),
            document,
            additional_headers: self.additional_headers.clone(),
        })
    }
}
