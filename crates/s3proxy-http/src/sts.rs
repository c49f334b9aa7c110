//! Emulated STS `AssumeRole`.
//!
//! Callers sign STS calls with their emulated credential (scope service
//! `sts`). Parameters arrive either in the query string or, as the AWS SDKs
//! send them, in an `application/x-www-form-urlencoded` body.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use s3proxy_core::{ParsedS3Request, ProxyError, ProxyResult, S3ErrorCode, SigningMetadata};
use s3proxy_credentials::{AssumeRoleRequest, CredentialsController, EmulatedAssumedRole};
use tracing::info;

use crate::response::ProxyResponseBody;
use crate::response::xml_response;

const STS_NAMESPACE: &str = "https://sts.amazonaws.com/doc/2011-06-15/";
const EXPIRATION_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parameters of an STS call, query string first, then form body.
fn sts_parameters(request: &ParsedS3Request) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = request
        .query_parameters
        .iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
    let body = request.request_content.bytes();
    if !body.is_empty() {
        params.extend(form_urlencoded::parse(&body).into_owned());
    }
    params
}

fn parameter<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Parse an authenticated STS request into an [`AssumeRoleRequest`].
pub fn parse_assume_role(
    request: &ParsedS3Request,
    metadata: &SigningMetadata,
) -> ProxyResult<AssumeRoleRequest> {
    let params = sts_parameters(request);

    match parameter(&params, "Action") {
        Some("AssumeRole") => {}
        Some(other) => {
            return Err(ProxyError::malformed(
                S3ErrorCode::InvalidRequest,
                format!("unsupported STS action {other}"),
            ));
        }
        None => {
            return Err(ProxyError::malformed(
                S3ErrorCode::InvalidRequest,
                "missing STS Action",
            ));
        }
    }

    let role_arn = parameter(&params, "RoleArn").ok_or_else(|| {
        ProxyError::malformed(S3ErrorCode::InvalidArgument, "missing RoleArn")
    })?;
    let duration_seconds = parameter(&params, "DurationSeconds")
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                ProxyError::malformed(
                    S3ErrorCode::InvalidArgument,
                    format!("invalid DurationSeconds {v}"),
                )
            })
        })
        .transpose()?;

    Ok(AssumeRoleRequest {
        emulated: metadata.credentials.emulated.clone(),
        region: metadata
            .region
            .clone()
            .unwrap_or_else(|| request.request_authorization.region.clone()),
        role_arn: role_arn.to_owned(),
        external_id: parameter(&params, "ExternalId").map(str::to_owned),
        role_session_name: parameter(&params, "RoleSessionName").map(str::to_owned),
        duration_seconds,
    })
}

/// Handle an authenticated STS request.
pub async fn handle_sts_request(
    credentials: &CredentialsController,
    request: &ParsedS3Request,
    metadata: &SigningMetadata,
) -> ProxyResult<http::Response<ProxyResponseBody>> {
    let assume = parse_assume_role(request, metadata)?;
    let assumed = credentials
        .assume_emulated_role(&assume)
        .await?
        .ok_or_else(|| ProxyError::authorization_denied(Some("role assumption is not permitted".to_owned())))?;

    info!(
        request_id = %request.request_id,
        access_key = %assume.emulated.access_key,
        role_arn = %assume.role_arn,
        session_access_key = %assumed.emulated.access_key,
        expiration = %assumed.expiration,
        "Assumed emulated role"
    );

    let xml = assume_role_response_xml(&assumed, &request.request_id)
        .map_err(|e| ProxyError::Configuration(format!("cannot serialize AssumeRoleResponse: {e}")))?;
    Ok(xml_response(http::StatusCode::OK, xml))
}

fn assume_role_response_xml(assumed: &EmulatedAssumedRole, request_id: &str) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let mut writer = Writer::new(&mut buf);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element("AssumeRoleResponse")
        .with_attribute(("xmlns", STS_NAMESPACE))
        .write_inner_content(|w| {
            w.create_element("AssumeRoleResult").write_inner_content(|w| {
                w.create_element("Credentials").write_inner_content(|w| {
                    w.create_element("AccessKeyId")
                        .write_text_content(BytesText::new(&assumed.emulated.access_key))?;
                    w.create_element("SecretAccessKey")
                        .write_text_content(BytesText::new(&assumed.emulated.secret_key))?;
                    w.create_element("SessionToken").write_text_content(BytesText::new(
                        assumed.emulated.session.as_deref().unwrap_or(""),
                    ))?;
                    w.create_element("Expiration").write_text_content(BytesText::new(
                        &assumed.expiration.format(EXPIRATION_FORMAT).to_string(),
                    ))?;
                    Ok(())
                })?;
                w.create_element("AssumedRoleUser").write_inner_content(|w| {
                    w.create_element("AssumedRoleId")
                        .write_text_content(BytesText::new(&assumed.role_id))?;
                    w.create_element("Arn")
                        .write_text_content(BytesText::new(&assumed.arn))?;
                    Ok(())
                })?;
                Ok(())
            })?;
            w.create_element("ResponseMetadata").write_inner_content(|w| {
                w.create_element("RequestId")
                    .write_text_content(BytesText::new(request_id))?;
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(buf)
}
