//! Bucket and key rewriting.
//!
//! A rewriter may redirect an authenticated request to a different bucket
//! and key. The pipeline derives a new request from the result; the inbound
//! request is never mutated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use s3proxy_core::{Credentials, ParsedS3Request, ProxyResult, parse_key_value_list};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Replacement bucket and key for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3RewriteResult {
    /// Bucket every later stage sees.
    pub final_bucket: String,
    /// Key every later stage sees.
    pub final_key: String,
    /// Replacement `prefix` query parameter for listing requests.
    pub final_list_prefix: Option<String>,
}

/// Decides whether a request targets a different bucket and key.
pub trait S3RequestRewriter: Send + Sync + fmt::Debug {
    /// `None` leaves the request unchanged.
    fn rewrite(&self, credentials: &Credentials, request: &ParsedS3Request) -> Option<S3RewriteResult>;
}

/// Never rewrites.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopS3RequestRewriter;

impl S3RequestRewriter for NoopS3RequestRewriter {
    fn rewrite(&self, _credentials: &Credentials, _request: &ParsedS3Request) -> Option<S3RewriteResult> {
        None
    }
}

/// Target of an alias bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketMapping {
    /// Real bucket name.
    pub bucket: String,
    /// Key prefix inside the real bucket, without slashes at either end.
    pub prefix: String,
}

impl BucketMapping {
    /// Parse `bucket[/prefix]`.
    #[must_use]
    pub fn parse(target: &str) -> Self {
        let target = target.trim().trim_matches('/');
        let (bucket, prefix) = target.split_once('/').unwrap_or((target, ""));
        Self {
            bucket: bucket.to_owned(),
            prefix: prefix.trim_matches('/').to_owned(),
        }
    }
}

/// Query parameters a bucket listing may carry.
const LISTING_PARAMETERS: &[&str] = &[
    "continuation-token",
    "delimiter",
    "encoding-type",
    "fetch-owner",
    "key-marker",
    "list-type",
    "marker",
    "max-keys",
    "max-uploads",
    "prefix",
    "start-after",
    "upload-id-marker",
    "uploads",
    "version-id-marker",
    "versions",
];

fn is_listing(request: &ParsedS3Request) -> bool {
    request.http_verb.eq_ignore_ascii_case("GET")
        && request.key_in_bucket.is_empty()
        && request.query_parameters.key_set().all(|name| {
            LISTING_PARAMETERS.contains(&name) || name.to_ascii_lowercase().starts_with("x-amz-")
        })
}

/// Maps alias buckets to real buckets, optionally under a key prefix.
///
/// Object keys are placed below the prefix. Other bucket-level requests (empty
/// key) keep an empty key so they still address the bucket itself. Listings
/// are confined to the prefix through their `prefix` parameter. Listed keys
/// come back as stored upstream, including the mapped prefix.
#[derive(Debug, Clone, Default)]
pub struct BucketMappingRewriter {
    mappings: HashMap<String, BucketMapping>,
}

impl BucketMappingRewriter {
    /// Create a rewriter from `(alias, target)` pairs.
    pub fn new<I, K>(mappings: I) -> Self
    where
        I: IntoIterator<Item = (K, BucketMapping)>,
        K: Into<String>,
    {
        Self {
            mappings: mappings.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl S3RequestRewriter for BucketMappingRewriter {
    fn rewrite(&self, _credentials: &Credentials, request: &ParsedS3Request) -> Option<S3RewriteResult> {
        let mapping = self.mappings.get(&request.bucket_name)?;
        let key = &request.key_in_bucket;
        let final_key = if key.is_empty() || mapping.prefix.is_empty() {
            key.clone()
        } else {
            format!("{}/{key}", mapping.prefix)
        };
        let final_list_prefix = (!mapping.prefix.is_empty() && is_listing(request)).then(|| {
            let requested = request.query_parameters.get_first("prefix").unwrap_or_default();
            format!("{}/{requested}", mapping.prefix)
        });
        Some(S3RewriteResult {
            final_bucket: mapping.bucket.clone(),
            final_key,
            final_list_prefix,
        })
    }
}

/// Rewriter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriterConfig {
    /// `(alias, bucket[/prefix])` pairs.
    pub bucket_mappings: Vec<(String, String)>,
}

impl RewriterConfig {
    /// Load configuration from `S3PROXY_BUCKET_MAPPINGS`
    /// (`alias=bucket[/prefix],...`).
    pub fn from_env() -> ProxyResult<Self> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("S3PROXY_BUCKET_MAPPINGS") {
            config.bucket_mappings = parse_key_value_list(&v, '=');
        }
        Ok(config)
    }
}

/// Build the rewriter described by `config`.
#[must_use]
pub fn build_rewriter(config: &RewriterConfig) -> Arc<dyn S3RequestRewriter> {
    if config.bucket_mappings.is_empty() {
        return Arc::new(NoopS3RequestRewriter);
    }
    info!(mappings = config.bucket_mappings.len(), "Configured bucket mappings");
    Arc::new(BucketMappingRewriter::new(
        config
            .bucket_mappings
            .iter()
            .map(|(alias, target)| (alias.clone(), BucketMapping::parse(target))),
    ))
}

#[cfg(test)]
mod tests {
    use s3proxy_core::Credential;

    use super::*;
    use crate::pipeline::tests::parsed_request;
    use crate::request::parse_query;

    fn credentials() -> Credentials {
        Credentials::emulated_only(Credential::new("EMU", "secret"))
    }

    #[test]
    fn test_should_never_rewrite_with_noop() {
        let request = parsed_request("bucket", "key");
        assert_eq!(NoopS3RequestRewriter.rewrite(&credentials(), &request), None);
    }

    #[test]
    fn test_should_map_alias_bucket_under_prefix() {
        let rewriter = build_rewriter(&RewriterConfig {
            bucket_mappings: vec![
                ("reports".to_owned(), "data-lake/teams/finance/".to_owned()),
                ("logs".to_owned(), "central-logs".to_owned()),
            ],
        });

        let result = rewriter
            .rewrite(&credentials(), &parsed_request("reports", "2024/q1.csv"))
            .unwrap();
        assert_eq!(result.final_bucket, "data-lake");
        assert_eq!(result.final_key, "teams/finance/2024/q1.csv");

        let result = rewriter
            .rewrite(&credentials(), &parsed_request("logs", "app.log"))
            .unwrap();
        assert_eq!(result.final_bucket, "central-logs");
        assert_eq!(result.final_key, "app.log");

        assert_eq!(rewriter.rewrite(&credentials(), &parsed_request("other", "k")), None);
    }

    #[test]
    fn test_should_keep_empty_key_for_bucket_requests() {
        let rewriter = BucketMappingRewriter::new([("alias", BucketMapping::parse("real/prefix"))]);
        let result = rewriter
            .rewrite(&credentials(), &parsed_request("alias", ""))
            .unwrap();
        assert_eq!(result.final_bucket, "real");
        assert_eq!(result.final_key, "");
    }

    #[test]
    fn test_should_confine_listing_to_mapped_prefix() {
        let rewriter = BucketMappingRewriter::new([("alias", BucketMapping::parse("real/tenant-a"))]);

        let mut listing = parsed_request("alias", "");
        listing.query_parameters = parse_query("list-type=2&prefix=2024/");
        let result = rewriter.rewrite(&credentials(), &listing).unwrap();
        assert_eq!(result.final_list_prefix.as_deref(), Some("tenant-a/2024/"));

        let mut whole = parsed_request("alias", "");
        whole.query_parameters = parse_query("list-type=2");
        let result = rewriter.rewrite(&credentials(), &whole).unwrap();
        assert_eq!(result.final_list_prefix.as_deref(), Some("tenant-a/"));

        let mut acl = parsed_request("alias", "");
        acl.query_parameters = parse_query("acl");
        assert_eq!(rewriter.rewrite(&credentials(), &acl).unwrap().final_list_prefix, None);

        let object = rewriter.rewrite(&credentials(), &parsed_request("alias", "k")).unwrap();
        assert_eq!(object.final_list_prefix, None);
    }
}
