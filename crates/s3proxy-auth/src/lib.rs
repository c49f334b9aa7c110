//! AWS Signature Version 4 signing and verification for s3proxy.
//!
//! The proxy sits between clients holding emulated credentials and an
//! upstream store holding real ones, so SigV4 runs in both directions:
//! inbound requests are verified against the emulated secret and outbound
//! requests are re-signed with the remote secret. Both use
//! [`SigningController`].
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use s3proxy_auth::SigningController;
//! use s3proxy_auth::authorization::parse_authorization_header;
//!
//! let controller = SigningController::new(Duration::from_secs(900));
//! let auth = parse_authorization_header(
//!     "AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/s3/aws4_request, \
//!      SignedHeaders=host;x-amz-date, Signature=abc",
//!     None,
//! )
//! .unwrap();
//! assert_eq!(auth.region, "us-east-1");
//! # let _ = controller;
//! ```
//!
//! # Modules
//!
//! - [`authorization`] - `Authorization` header and presigned query parsing
//! - [`canonical`] - Canonical request construction
//! - [`clock`] - Injectable time source
//! - [`error`] - Authentication error types
//! - [`signing`] - Signing key derivation, signing, and verification

pub mod authorization;
pub mod canonical;
pub mod clock;
pub mod error;
pub mod signing;

pub use authorization::{
    PresignedAuthorization, is_presigned, parse_authorization_header, parse_presigned_query,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::AuthError;
pub use signing::{
    EMPTY_PAYLOAD_HASH, SigningController, SigningResult, UNSIGNED_PAYLOAD, hash_payload,
    verify_payload_hash,
};
