//! Credentials fetched from a remote HTTP service.
//!
//! Lookups issue `GET {endpoint}/{accessKey}[?sessionToken=...]`. A `404` or
//! an empty body means the key is unknown, a JSON body decodes to
//! [`Credentials`], and any other status is reported as an upstream failure
//! carrying that status.
//!
//! An optional loading cache bounds both the number of entries and their
//! lifetime. Concurrent lookups of the same `(accessKey, session)` share one
//! in-flight request; failures are not cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use percent_encoding::utf8_percent_encode;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use s3proxy_core::{Credentials, ProxyError, ProxyResult};
use tracing::{debug, warn};

use crate::provider::CredentialsProvider;

type CacheKey = (String, Option<String>);

/// Settings for [`HttpCredentialsProvider`].
#[derive(Debug, Clone)]
pub struct HttpCredentialsSettings {
    /// Base URL; the access key is appended as a path segment.
    pub endpoint: String,
    /// Extra headers sent with every lookup.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum cached entries; `0` disables caching.
    pub cache_size: u64,
    /// Lifetime of a cached entry.
    pub cache_ttl: Duration,
}

/// HTTP-backed credentials lookup.
#[derive(Debug, Clone)]
pub struct HttpCredentialsProvider {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
    cache: Option<Cache<CacheKey, Option<Credentials>>>,
}

impl HttpCredentialsProvider {
    /// Build a provider from `settings`.
    pub fn new(settings: &HttpCredentialsSettings) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProxyError::Configuration(format!("cannot build HTTP client: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &settings.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProxyError::Configuration(format!("invalid credentials header name {name}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProxyError::Configuration(format!("invalid credentials header value: {e}"))
            })?;
            headers.append(name, value);
        }

        let cache = (settings.cache_size > 0).then(|| {
            Cache::builder()
                .max_capacity(settings.cache_size)
                .time_to_live(settings.cache_ttl)
                .build()
        });

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_owned(),
            headers,
            cache,
        })
    }

    fn lookup_url(&self, emulated_access_key: &str, session: Option<&str>) -> String {
        let key = utf8_percent_encode(emulated_access_key, percent_encoding::NON_ALPHANUMERIC);
        let mut url = format!("{}/{key}", self.endpoint);
        if let Some(session) = session {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("sessionToken", session)
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    async fn fetch(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>> {
        let url = self.lookup_url(emulated_access_key, session);
        debug!(access_key = emulated_access_key, "Fetching credentials over HTTP");

        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(access_key = emulated_access_key, error = %e, "Credentials request failed");
                ProxyError::upstream(format!("credentials request failed: {e}"))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(access_key = emulated_access_key, %status, "Credentials service rejected lookup");
            return Err(ProxyError::Upstream {
                status: Some(status),
                message: format!("credentials service returned {status}"),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::upstream(format!("cannot read credentials response: {e}")))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ProxyError::upstream(format!("invalid credentials response: {e}")))
    }
}

#[async_trait]
impl CredentialsProvider for HttpCredentialsProvider {
    async fn credentials(
        &self,
        emulated_access_key: &str,
        session: Option<&str>,
    ) -> ProxyResult<Option<Credentials>> {
        let Some(cache) = &self.cache else {
            return self.fetch(emulated_access_key, session).await;
        };

        let key = (emulated_access_key.to_owned(), session.map(ToOwned::to_owned));
        cache
            .try_get_with(key, self.fetch(emulated_access_key, session))
            .await
            .map_err(Arc::unwrap_or_clone)
    }
}
