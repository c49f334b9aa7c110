//! Core types, configuration, and error taxonomy for s3proxy.
//!
//! This crate provides the foundational building blocks shared by every stage
//! of the proxy pipeline: the ordered multi-valued [`MultiMap`] used for
//! headers and query parameters, the credential data model, the parsed
//! request representation, and the [`ProxyError`] taxonomy that every stage
//! reports failures through.

mod config;
mod error;
mod multimap;
mod request;
mod types;

pub use config::{ProxyConfig, parse_bool, parse_key_value_list};
pub use error::{ProxyError, ProxyResult, S3ErrorCode};
pub use multimap::{MultiMap, MultiMapBuilder};
pub use request::{
    AuthorizationSource, ParsedS3Request, RequestAuthorization, RequestContent, SigningMetadata,
    SigningServiceType,
};
pub use types::{Credential, CredentialSelector, Credentials, Identity, RemoteSessionRole};
