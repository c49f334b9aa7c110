//! S3-compatible error and XML responses.

use std::io;

use bytes::Bytes;
use http_body_util::Full;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use s3proxy_core::ProxyError;

/// Response body of the proxy. Every response is buffered.
pub type ProxyResponseBody = Full<Bytes>;

/// Format an error as a flat S3 `<Error>` document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>AccessDenied</Code>
///   <Message>Access Denied</Message>
///   <Resource>/mybucket/key</Resource>
///   <RequestId>4442587FB7D0A2F9</RequestId>
/// </Error>
/// ```
#[must_use]
pub fn error_to_xml(code: &str, message: &str, resource: Option<&str>, request_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error_xml(&mut buf, code, message, resource, request_id) {
        tracing::error!(error = %e, "failed to serialize S3 error XML");
        buf.clear();
    }
    buf
}

fn write_error_xml(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(res) = resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(res))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;
    Ok(())
}

/// Render `err` as an S3 error response.
///
/// Internal failure details stay in the logs; clients of a 5xx only see a
/// generic message.
#[must_use]
pub fn error_to_response(
    err: &ProxyError,
    resource: Option<&str>,
    request_id: &str,
) -> http::Response<ProxyResponseBody> {
    let status = err.status_code();
    let message = match err {
        ProxyError::Configuration(_) | ProxyError::Upstream { status: None, .. } => {
            "We encountered an internal error. Please try again.".to_owned()
        }
        other => other.to_string(),
    };
    let xml = error_to_xml(err.code().as_str(), &message, resource, request_id);
    xml_response(status, xml)
}

/// An `application/xml` response.
#[must_use]
pub fn xml_response(status: http::StatusCode, xml: Vec<u8>) -> http::Response<ProxyResponseBody> {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(Full::from(xml))
        .unwrap_or_else(|_| {
            let mut response = http::Response::new(Full::default());
            *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}
