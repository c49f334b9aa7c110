//! Emulated credential resolution and role assumption for s3proxy.
//!
//! Clients sign requests with emulated access keys. This crate maps those
//! keys to full [`Credentials`](s3proxy_core::Credentials) records through a
//! pluggable [`CredentialsProvider`], and lets callers assume roles through an
//! [`AssumedRoleProvider`] whose minted sessions resolve through the same
//! lookup path.

pub mod assumed_role;
pub mod config;
pub mod controller;
pub mod file;
pub mod http;
pub mod provider;

pub use assumed_role::{
    AssumedRoleCredentialsProvider, AssumedRoleSessions, InMemoryAssumedRoleProvider,
};
pub use config::{CredentialsConfig, CredentialsProviderKind, build_credentials_controller};
pub use controller::CredentialsController;
pub use file::FileCredentialsProvider;
pub use http::{HttpCredentialsProvider, HttpCredentialsSettings};
pub use provider::{
    AssumeRoleRequest, AssumedRoleProvider, CredentialsProvider, EmulatedAssumedRole,
    NoopAssumedRoleProvider,
};
