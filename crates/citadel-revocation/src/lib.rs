#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-revocation** – concrete [`citadel_auth::RevocationStore`]
//! implementations: an in-process map with a batching background
//! sweeper, a Redis-backed store for multi-instance deployments, and a
//! no-op for local development.

mod memory;
mod noop;

#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::InMemoryRevocationStore;
pub use noop::NoOpRevocationStore;

#[cfg(feature = "redis-backend")]
pub use redis::{RedisRevocationStore, DEFAULT_KEY_PREFIX};
