//! Global proxy configuration.
//!
//! Provides [`ProxyConfig`] for the process-wide settings of the proxy.
//! Subsystem settings (credentials, security, remote connections, rewriting)
//! live with their crates; they share the helpers in this module for parsing
//! environment values.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default request body limit (256 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Process-wide proxy configuration.
///
/// # Examples
///
/// ```
/// use s3proxy_core::ProxyConfig;
///
/// let config = ProxyConfig::default();
/// assert_eq!(config.listen, "0.0.0.0:8080");
/// assert_eq!(config.max_clock_drift_seconds, 900);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Bind address for the proxy listener.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub listen: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Log output format, `"text"` or `"json"`.
    #[builder(default = String::from("text"))]
    pub log_format: String,

    /// Maximum tolerated difference between `X-Amz-Date` and the local clock.
    #[builder(default = 900)]
    pub max_clock_drift_seconds: u64,

    /// Path prefix stripped from inbound requests before bucket resolution.
    #[builder(default, setter(strip_option))]
    pub path_prefix: Option<String>,

    /// Timeout for a single upstream round trip.
    #[builder(default = 60)]
    pub upstream_timeout_seconds: u64,

    /// Largest request body buffered before authentication.
    #[builder(default = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: u64,

    /// Region reported when a request does not carry one.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:8080"),
            log_level: String::from("info"),
            log_format: String::from("text"),
            max_clock_drift_seconds: 900,
            path_prefix: None,
            upstream_timeout_seconds: 60,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_region: String::from("us-east-1"),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3PROXY_LISTEN` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    /// | `S3PROXY_MAX_CLOCK_DRIFT_SECONDS` | `900` |
    /// | `S3PROXY_PATH_PREFIX` | unset |
    /// | `S3PROXY_UPSTREAM_TIMEOUT_SECONDS` | `60` |
    /// | `S3PROXY_MAX_BODY_BYTES` | `268435456` |
    /// | `S3PROXY_DEFAULT_REGION` | `us-east-1` |
    ///
    /// Unparsable numbers keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("S3PROXY_LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            config.log_format = v;
        }
        if let Ok(v) = std::env::var("S3PROXY_MAX_CLOCK_DRIFT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                config.max_clock_drift_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_PATH_PREFIX") {
            let trimmed = v.trim_matches('/');
            if !trimmed.is_empty() {
                config.path_prefix = Some(format!("/{trimmed}"));
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_UPSTREAM_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                config.upstream_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_MAX_BODY_BYTES") {
            if let Ok(n) = v.parse::<u64>() {
                config.max_body_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("S3PROXY_DEFAULT_REGION") {
            config.default_region = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Parse `k<sep>v,k<sep>v` into ordered pairs.
///
/// Whitespace around keys and values is trimmed. Entries without the
/// separator or with an empty key are skipped.
#[must_use]
pub fn parse_key_value_list(value: &str, separator: char) -> Vec<(String, String)> {
    value
        .split(',')
        .filter_map(|entry| {
            let (k, v) = entry.split_once(separator)?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_owned(), v.trim().to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_clock_drift_seconds, 900);
        assert!(config.path_prefix.is_none());
    }

    #[test]
    fn test_should_build_config_with_builder() {
        let config = ProxyConfig::builder()
            .listen("127.0.0.1:9000".to_owned())
            .max_clock_drift_seconds(60)
            .path_prefix("/s3".to_owned())
            .build();

        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.max_clock_drift_seconds, 60);
        assert_eq!(config.path_prefix.as_deref(), Some("/s3"));
        assert_eq!(config.upstream_timeout_seconds, 60);
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("yes"));
    }

    #[test]
    fn test_should_parse_key_value_list() {
        let pairs = parse_key_value_list(" X-Api-Key : secret ,broken, :nokey,X-Team:data", ':');
        assert_eq!(
            pairs,
            vec![
                ("X-Api-Key".to_owned(), "secret".to_owned()),
                ("X-Team".to_owned(), "data".to_owned()),
            ]
        );
        assert!(parse_key_value_list("", '=').is_empty());
    }

    #[test]
    fn test_should_keep_value_after_first_separator() {
        let pairs = parse_key_value_list("alias=bucket/prefix=x", '=');
        assert_eq!(pairs, vec![("alias".to_owned(), "bucket/prefix=x".to_owned())]);
    }
}
