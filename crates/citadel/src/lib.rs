#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel** – facade crate re-exporting the workspace's sub-crates
//! behind Cargo features, so a consumer can depend on one crate and
//! opt into the pieces it needs.
//!
//! - `auth` (default): [`citadel_auth`], [`citadel_revocation`],
//!   [`citadel_login_guard`] – the Token Authority, its Revocation
//!   Store implementations, and the Login Guard.
//! - `agent` (default): [`citadel_agent`] – the Agent Pool, Result
//!   Cache, Batch Executor and Object Pools.
//! - `registrar`: [`citadel_registrar`] – the Service Registrar.
//! - `redis-backend`: enables the Redis-backed Revocation Store.

pub use citadel_errors::{CitadelError, CitadelResult, ErrorKind, InvalidTokenReason};
pub use citadel_types::{
    now_epoch_secs, Algorithm, Claims, Header, SignOptions, Subject, Token,
};

#[cfg(feature = "auth")]
/// Credential signing, verification, the Revocation Store contract and
/// its implementations, and login lockout tracking.
pub mod auth {
    pub use citadel_auth::*;
    /// Concrete [`citadel_auth::RevocationStore`] implementations.
    pub mod revocation {
        pub use citadel_revocation::*;
    }
    /// Login failure tracking and lockout.
    pub mod login_guard {
        pub use citadel_login_guard::*;
    }
}

#[cfg(feature = "agent")]
/// The `Agent` contract, instance pool, result cache, batch executor and
/// typed object pools.
pub mod agent {
    pub use citadel_agent::*;
}

#[cfg(feature = "registrar")]
/// The Service Registrar.
pub mod registrar {
    pub use citadel_registrar::*;
}
