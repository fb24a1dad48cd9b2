#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-auth** – algorithm-polymorphic credential signing and
//! verification.
//!
//! This crate implements the Token Authority: `Sign`, `Verify`, `Refresh`
//! and `Revoke` over a single configured algorithm (HMAC, RSA or ECDSA)
//! and key. It defines the [`RevocationStore`] contract but deliberately
//! carries no concrete implementation of it – those live in
//! `citadel-revocation`, which depends back on this crate's trait rather
//! than the other way around.

mod authority;
mod keys;

pub use authority::{RevocationStore, TokenAuthority, TokenAuthorityConfig};
pub use citadel_types::{Claims, SignOptions, Subject, Token};
pub use keys::KeyMaterial;
