//! AWS chunked payload decoding.
//!
//! Uploads signed with `STREAMING-AWS4-HMAC-SHA256-PAYLOAD` frame the body as
//!
//! ```text
//! <hex-size>;chunk-signature=<sig>\r\n
//! <data>\r\n
//! 0;chunk-signature=<sig>\r\n
//! \r\n
//! ```
//!
//! Chunk signatures are bound to the client's emulated key and cannot be
//! forwarded, so the proxy decodes the framing and re-signs the raw payload.

use bytes::{Bytes, BytesMut};
use s3proxy_core::{MultiMap, ProxyError, ProxyResult, S3ErrorCode};

/// Whether the request body uses AWS chunked framing.
#[must_use]
pub fn is_aws_chunked(headers: &MultiMap) -> bool {
    let encoded = headers
        .get("content-encoding")
        .iter()
        .any(|v| v.to_ascii_lowercase().contains("aws-chunked"));
    let streaming = headers
        .get_first("x-amz-content-sha256")
        .is_some_and(|v| v.starts_with("STREAMING-"));
    encoded || streaming
}

fn malformed(message: impl Into<String>) -> ProxyError {
    ProxyError::malformed(S3ErrorCode::InvalidArgument, message)
}

/// Decode an AWS chunked body into the raw payload.
pub fn decode_aws_chunked(body: &[u8]) -> ProxyResult<Bytes> {
    let mut output = BytesMut::new();
    let mut pos = 0;

    loop {
        let line_end = find_crlf(body, pos)
            .ok_or_else(|| malformed("Malformed aws-chunked body: missing chunk size line"))?;
        let size_line = &body[pos..line_end];

        // <hex-size>[;chunk-signature=<sig>][;ext]
        let hex_part = size_line
            .iter()
            .position(|&b| b == b';')
            .map_or(size_line, |semi| &size_line[..semi]);
        let hex_str = std::str::from_utf8(hex_part)
            .map_err(|_| malformed("Malformed aws-chunked body: invalid chunk size encoding"))?;
        let chunk_size = usize::from_str_radix(hex_str.trim(), 16).map_err(|_| {
            malformed(format!(
                "Malformed aws-chunked body: invalid chunk size '{hex_str}'"
            ))
        })?;

        pos = line_end + 2;
        if chunk_size == 0 {
            break;
        }

        let end = pos
            .checked_add(chunk_size)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| malformed("Malformed aws-chunked body: chunk data truncated"))?;
        output.extend_from_slice(&body[pos..end]);
        pos = end;

        if body.get(pos..pos + 2) != Some(b"\r\n".as_slice()) {
            return Err(malformed(
                "Malformed aws-chunked body: missing CRLF after chunk data",
            ));
        }
        pos += 2;
    }

    Ok(output.freeze())
}

/// `Content-Encoding` with `aws-chunked` removed, or `None` if nothing remains.
#[must_use]
pub fn strip_aws_chunked_encoding(content_encoding: &str) -> Option<String> {
    let remaining: Vec<&str> = content_encoding
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("aws-chunked"))
        .collect();
    (!remaining.is_empty()).then(|| remaining.join(", "))
}

fn find_crlf(data: &[u8], start: usize) -> Option<usize> {
    if data.len() < start + 2 {
        return None;
    }
    data[start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|p| start + p)
}
