//! Authorization for s3proxy.
//!
//! Every authenticated request passes through a [`SecurityController`],
//! which asks the configured [`S3SecurityFacadeProvider`] for a per-request
//! [`S3SecurityFacade`] and applies it to the request's action. Providers
//! range from the open default to table-aware chains and a remote policy
//! engine client.

mod action;
pub mod config;
pub mod database;
mod facade;
pub mod logging;
pub mod opa;

pub use action::action_from_query;
pub use config::{SecurityConfig, SecurityProviderKind, build_security_controller};
pub use database::{
    S3DatabaseSecurityDecorator, S3DatabaseSecurityFacade, S3DatabaseSecurityFacadeProvider,
};
pub use facade::{
    OpenS3SecurityFacadeProvider, S3SecurityFacade, S3SecurityFacadeProvider, SecurityController,
    SecurityResponse,
};
pub use logging::{NoopLoggingSession, RequestLoggingSession, TracingLoggingSession};
pub use opa::{
    DefaultOpaS3SecurityMapper, OpaClient, OpaRequest, OpaS3SecurityFacadeProvider,
    OpaS3SecurityMapper,
};
