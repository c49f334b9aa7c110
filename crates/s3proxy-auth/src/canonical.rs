//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Query parameters arrive already decoded (see
//! [`ParsedS3Request::query_parameters`](s3proxy_core::ParsedS3Request)); they
//! are re-encoded here with the RFC 3986 unreserved set so that inbound
//! verification and outbound signing produce the same canonical form.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Everything except RFC 3986 unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`).
pub const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the full canonical request string from its components.
///
/// # Examples
///
/// ```
/// use s3proxy_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "GET",
///     "/test.txt",
///     std::iter::empty(),
///     &[("host", "examplebucket.s3.amazonaws.com")],
///     &["host"],
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("GET\n/test.txt\n\nhost:"));
/// ```
#[must_use]
pub fn build_canonical_request<'a>(
    method: &str,
    path: &str,
    query_parameters: impl IntoIterator<Item = (&'a str, &'a str)>,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(query_parameters);
    let canonical_headers = build_canonical_headers(headers, signed_headers);
    let signed_headers_str = build_signed_headers_string(signed_headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Forward slashes are preserved and empty paths normalize to `/`. Segments
/// are decoded before encoding so already-encoded paths are not double-encoded.
///
/// ```
/// use s3proxy_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri(""), "/");
/// assert_eq!(build_canonical_uri("/my%20key"), "/my%20key");
/// assert_eq!(build_canonical_uri("/my key"), "/my%20key");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            uri_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string from decoded `(key, value)` pairs.
///
/// Keys and values are encoded, then sorted by encoded key and, for equal
/// keys, by encoded value.
///
/// ```
/// use s3proxy_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(
///     build_canonical_query_string([("prefix", "foo/bar"), ("list-type", "2")]),
///     "list-type=2&prefix=foo%2Fbar"
/// );
/// ```
#[must_use]
pub fn build_canonical_query_string<'a>(
    query_parameters: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut params: Vec<(String, String)> = query_parameters
        .into_iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers string from the request headers.
///
/// Only headers listed in `signed_headers` are included. Values are trimmed
/// and inner whitespace runs collapse to one space; repeated headers are joined
/// with `,` in insertion order. The result has no trailing newline; the caller
/// adds it as part of the canonical request format.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let lower_name = name.to_ascii_lowercase();
        let trimmed_value = collapse_whitespace(value.trim());
        header_map
            .entry(lower_name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    let mut sorted_signed: Vec<&str> = signed_headers.to_vec();
    sorted_signed.sort_unstable();

    sorted_signed
        .iter()
        .filter_map(|name| header_map.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Semicolon-separated, sorted list of lowercase header names.
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();
    sorted.join(";")
}

/// URI-encode a single path segment or query component.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::*;

    const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_should_normalize_empty_path_to_slash() {
        assert_eq!(build_canonical_uri(""), "/");
        assert_eq!(build_canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_encode_special_characters_in_path() {
        assert_eq!(build_canonical_uri("/test$file.text"), "/test%24file.text");
        assert_eq!(build_canonical_uri("/test%24file.text"), "/test%24file.text");
        assert_eq!(build_canonical_uri("/bucket/a/b c"), "/bucket/a/b%20c");
    }

    #[test]
    fn test_should_sort_query_by_encoded_key_then_value() {
        let query = build_canonical_query_string([("b", "2"), ("a", "z"), ("a", "1")]);
        assert_eq!(query, "a=1&a=z&b=2");
    }

    #[test]
    fn test_should_encode_query_components() {
        let query = build_canonical_query_string([
            ("list-type", "2"),
            ("prefix", "foo/bar"),
            ("delimiter", "/"),
            ("encoding-type", "url"),
        ]);
        assert_eq!(
            query,
            "delimiter=%2F&encoding-type=url&list-type=2&prefix=foo%2Fbar"
        );
    }

    #[test]
    fn test_should_render_bare_subresource_with_empty_value() {
        assert_eq!(build_canonical_query_string([("lifecycle", "")]), "lifecycle=");
        assert_eq!(build_canonical_query_string(std::iter::empty()), "");
    }

    #[test]
    fn test_should_join_repeated_header_values_in_insertion_order() {
        let headers = [("X-Custom", "second"), ("x-custom", "first"), ("Host", "h")];
        let result = build_canonical_headers(&headers, &["x-custom", "host"]);
        assert_eq!(result, "host:h\nx-custom:second,first");
    }

    #[test]
    fn test_should_collapse_whitespace_in_header_values() {
        let headers = [("Host", "  example.com  "), ("X-Custom", "a   b   c")];
        let result = build_canonical_headers(&headers, &["host", "x-custom"]);
        assert_eq!(result, "host:example.com\nx-custom:a b c");
    }

    #[test]
    fn test_should_build_signed_headers_string_sorted() {
        assert_eq!(
            build_signed_headers_string(&["x-amz-date", "host", "range"]),
            "host;range;x-amz-date"
        );
    }

    #[test]
    fn test_should_build_canonical_request_matching_aws_example() {
        let headers = [
            ("host", "examplebucket.s3.amazonaws.com"),
            ("range", "bytes=0-9"),
            ("x-amz-content-sha256", EMPTY_HASH),
            ("x-amz-date", "20130524T000000Z"),
        ];
        let signed = ["host", "range", "x-amz-content-sha256", "x-amz-date"];

        let canonical = build_canonical_request(
            "GET",
            "/test.txt",
            std::iter::empty(),
            &headers,
            &signed,
            EMPTY_HASH,
        );

        let expected = "GET\n\
                        /test.txt\n\
                        \n\
                        host:examplebucket.s3.amazonaws.com\n\
                        range:bytes=0-9\n\
                        x-amz-content-sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
                        x-amz-date:20130524T000000Z\n\
                        \n\
                        host;range;x-amz-content-sha256;x-amz-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);

        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(
            hash,
            "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972"
        );
    }
}
