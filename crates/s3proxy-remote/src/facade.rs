//! Upstream endpoint construction.
//!
//! A [`RemoteS3Facade`] turns a bucket, key, and region into the URI of the
//! upstream store. Two addressing styles are provided:
//!
//! * [`PathStyleRemoteS3Facade`]: `https://s3.us-east-1.amazonaws.com/bucket/key`
//! * [`VirtualHostStyleRemoteS3Facade`]: `https://bucket.s3.us-east-1.amazonaws.com/key`

use std::fmt;
use std::sync::Arc;

use http::Uri;
use http::uri::{Authority, PathAndQuery, Scheme};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use s3proxy_core::{ProxyError, ProxyResult};
use serde::{Deserialize, Serialize};

/// Characters left unescaped in a key segment.
const SEGMENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Default path-style hostname template.
pub const DEFAULT_PATH_STYLE_TEMPLATE: &str = "s3.${region}.${domain}";

/// Default virtual-host-style hostname template.
pub const DEFAULT_VIRTUAL_HOST_STYLE_TEMPLATE: &str = "${bucket}.s3.${region}.${domain}";

/// Default upstream domain.
pub const DEFAULT_DOMAIN: &str = "amazonaws.com";

/// Builds upstream URIs.
pub trait RemoteS3Facade: Send + Sync + fmt::Debug {
    /// The upstream URI for `key` in `bucket`.
    ///
    /// `key` is the decoded object key; it is percent-encoded per segment.
    /// `query` is an already-encoded query string.
    fn build_endpoint(
        &self,
        key: &str,
        bucket: &str,
        region: &str,
        query: Option<&str>,
    ) -> ProxyResult<Uri>;
}

/// Addressing style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteS3FacadeStyle {
    /// Bucket in the path.
    #[default]
    Path,
    /// Bucket in the hostname.
    VirtualHost,
}

impl std::str::FromStr for RemoteS3FacadeStyle {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "virtual-host" | "virtualhost" | "virtual" => Ok(Self::VirtualHost),
            other => Err(ProxyError::Configuration(format!(
                "unknown remote addressing style: {other}"
            ))),
        }
    }
}

/// Settings for a [`RemoteS3Facade`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteS3FacadeConfiguration {
    /// Addressing style.
    pub style: RemoteS3FacadeStyle,
    /// Value substituted for `${domain}`.
    pub domain: String,
    /// Use `https` rather than `http`.
    pub https: bool,
    /// Explicit port; the scheme default otherwise.
    pub port: Option<u16>,
    /// Hostname template; the style's default when unset.
    pub hostname_template: Option<String>,
}

impl Default for RemoteS3FacadeConfiguration {
    fn default() -> Self {
        Self {
            style: RemoteS3FacadeStyle::Path,
            domain: DEFAULT_DOMAIN.to_owned(),
            https: true,
            port: None,
            hostname_template: None,
        }
    }
}

/// Build the facade described by `config`.
#[must_use]
pub fn build_remote_s3_facade(config: &RemoteS3FacadeConfiguration) -> Arc<dyn RemoteS3Facade> {
    match config.style {
        RemoteS3FacadeStyle::Path => Arc::new(PathStyleRemoteS3Facade::new(config.clone())),
        RemoteS3FacadeStyle::VirtualHost => {
            Arc::new(VirtualHostStyleRemoteS3Facade::new(config.clone()))
        }
    }
}

/// Bucket-in-path addressing.
#[derive(Debug, Clone)]
pub struct PathStyleRemoteS3Facade {
    config: RemoteS3FacadeConfiguration,
}

impl PathStyleRemoteS3Facade {
    /// Create a facade from `config`; its `style` is ignored.
    #[must_use]
    pub fn new(config: RemoteS3FacadeConfiguration) -> Self {
        Self { config }
    }
}

impl RemoteS3Facade for PathStyleRemoteS3Facade {
    fn build_endpoint(
        &self,
        key: &str,
        bucket: &str,
        region: &str,
        query: Option<&str>,
    ) -> ProxyResult<Uri> {
        let template = self
            .config
            .hostname_template
            .as_deref()
            .unwrap_or(DEFAULT_PATH_STYLE_TEMPLATE);
        let host = template
            .replace("${region}", region)
            .replace("${domain}", &self.config.domain);

        let path = if bucket.is_empty() {
            format!("/{}", encode_key(key))
        } else {
            format!("/{}/{}", encode_segment(bucket), encode_key(key))
        };

        assemble(&self.config, &host, &path, query)
    }
}

/// Bucket-in-hostname addressing.
#[derive(Debug, Clone)]
pub struct VirtualHostStyleRemoteS3Facade {
    config: RemoteS3FacadeConfiguration,
}

impl VirtualHostStyleRemoteS3Facade {
    /// Create a facade from `config`; its `style` is ignored.
    #[must_use]
    pub fn new(config: RemoteS3FacadeConfiguration) -> Self {
        Self { config }
    }
}

impl RemoteS3Facade for VirtualHostStyleRemoteS3Facade {
    fn build_endpoint(
        &self,
        key: &str,
        bucket: &str,
        region: &str,
        query: Option<&str>,
    ) -> ProxyResult<Uri> {
        let template = self
            .config
            .hostname_template
            .as_deref()
            .unwrap_or(DEFAULT_VIRTUAL_HOST_STYLE_TEMPLATE);
        let host = if bucket.is_empty() {
            template
                .replace("${bucket}.", "")
                .replace("${bucket}", "")
        } else {
            template.replace("${bucket}", bucket)
        };
        let host = host
            .replace("${region}", region)
            .replace("${domain}", &self.config.domain);

        let path = format!("/{}", encode_key(key));
        assemble(&self.config, &host, &path, query)
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT_ENCODE_SET).to_string()
}

fn encode_key(key: &str) -> String {
    key.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}

fn assemble(
    config: &RemoteS3FacadeConfiguration,
    host: &str,
    path: &str,
    query: Option<&str>,
) -> ProxyResult<Uri> {
    let scheme = if config.https {
        Scheme::HTTPS
    } else {
        Scheme::HTTP
    };
    let authority = match config.port {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let authority: Authority = authority
        .parse()
        .map_err(|e| ProxyError::Configuration(format!("invalid remote host {host}: {e}")))?;

    let path_and_query = match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{path}?{q}"),
        None => path.to_owned(),
    };
    let path_and_query: PathAndQuery = path_and_query
        .parse()
        .map_err(|e| ProxyError::Configuration(format!("invalid remote path: {e}")))?;

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Configuration(format!("invalid remote endpoint: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(style: RemoteS3FacadeStyle) -> RemoteS3FacadeConfiguration {
        RemoteS3FacadeConfiguration {
            style,
            ..RemoteS3FacadeConfiguration::default()
        }
    }

    #[test]
    fn test_should_build_path_style_endpoint() {
        let facade = build_remote_s3_facade(&config(RemoteS3FacadeStyle::Path));
        let uri = facade
            .build_endpoint("dir/a file.txt", "bucket", "eu-west-1", None)
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "https://s3.eu-west-1.amazonaws.com/bucket/dir/a%20file.txt"
        );
    }

    #[test]
    fn test_should_omit_bucket_segment_when_bucket_is_empty() {
        let facade = build_remote_s3_facade(&config(RemoteS3FacadeStyle::Path));
        let uri = facade.build_endpoint("", "", "us-east-1", None).unwrap();
        assert_eq!(uri.to_string(), "https://s3.us-east-1.amazonaws.com/");
    }

    #[test]
    fn test_should_build_virtual_host_endpoint() {
        let facade = build_remote_s3_facade(&config(RemoteS3FacadeStyle::VirtualHost));
        let uri = facade
            .build_endpoint("test$file.text", "examplebucket", "us-east-1", Some("acl"))
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "https://examplebucket.s3.us-east-1.amazonaws.com/test%24file.text?acl"
        );
    }

    #[test]
    fn test_should_collapse_bucket_out_of_virtual_host() {
        let facade = build_remote_s3_facade(&config(RemoteS3FacadeStyle::VirtualHost));
        let uri = facade.build_endpoint("", "", "us-west-2", None).unwrap();
        assert_eq!(uri.host(), Some("s3.us-west-2.amazonaws.com"));
        assert_eq!(uri.path(), "/");
    }

    #[test]
    fn test_should_apply_scheme_port_and_template() {
        let facade = build_remote_s3_facade(&RemoteS3FacadeConfiguration {
            style: RemoteS3FacadeStyle::Path,
            domain: "local".to_owned(),
            https: false,
            port: Some(9000),
            hostname_template: Some("minio.${domain}".to_owned()),
        });
        let uri = facade
            .build_endpoint("k", "b", "us-east-1", Some("list-type=2&prefix=a%2Fb"))
            .unwrap();
        assert_eq!(uri.to_string(), "http://minio.local:9000/b/k?list-type=2&prefix=a%2Fb");
        assert_eq!(uri.port_u16(), Some(9000));
    }

    #[test]
    fn test_should_parse_style_names() {
        assert_eq!(
            "virtual-host".parse::<RemoteS3FacadeStyle>().unwrap(),
            RemoteS3FacadeStyle::VirtualHost
        );
        assert!("dns".parse::<RemoteS3FacadeStyle>().is_err());

        let parsed: RemoteS3FacadeConfiguration =
            serde_json::from_str(r#"{"style": "virtual-host", "port": 8443}"#).unwrap();
        assert_eq!(parsed.style, RemoteS3FacadeStyle::VirtualHost);
        assert_eq!(parsed.domain, DEFAULT_DOMAIN);
        assert!(parsed.https);
    }
}
