//! Remote policy engine integration.
//!
//! Requests are mapped to a JSON document, POSTed to an OPA-style policy
//! server, and the server's JSON answer is mapped back to a
//! [`SecurityResponse`](crate::SecurityResponse).

mod client;
mod mapper;
mod provider;

pub use client::{OpaClient, OpaRequest};
pub use mapper::{DefaultOpaS3SecurityMapper, OpaS3SecurityMapper};
pub use provider::OpaS3SecurityFacadeProvider;
