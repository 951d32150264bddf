//! HTTP message signatures for the mobile-money provider.
//!
//! Outbound requests are signed with [`RequestSigner`]; inbound callbacks are
//! checked with [`CallbackVerifier`]. Both build the same signature base from
//! [`base`], and both digest the exact body bytes with [`digest`].

pub mod algorithm;
pub mod base;
pub mod digest;
pub mod signer;
pub mod verifier;

pub use algorithm::{SignatureAlgorithm, SignatureError};
pub use digest::{content_digest, serialize_and_digest};
pub use signer::{RequestComponents, RequestSigner, SignatureConfig, SignatureHeaders};
pub use verifier::{CallbackVerifier, InboundRequest, VerificationError};
