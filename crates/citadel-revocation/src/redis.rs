//! Distributed Revocation Store backed by Redis, relying on the server's
//! native key expiry instead of an application-level sweeper.

use async_trait::async_trait;
use citadel_auth::RevocationStore;
use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use citadel_types::now_epoch_secs;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use uuid::Uuid;

/// Default key prefix, namespacing revocation entries from any other data
/// sharing the same Redis keyspace.
pub const DEFAULT_KEY_PREFIX: &str = "citadel:revoked:";

/// A [`RevocationStore`] whose state lives in Redis, shared across every
/// Token Authority instance that points at the same database.
pub struct RedisRevocationStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisRevocationStore {
    /// Build a store over `pool`, namespacing keys with `key_prefix`.
    pub fn new(pool: Pool, key_prefix: impl Into<String>) -> Self {
        Self {
            pool,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, jti: Uuid) -> String {
        format!("{}{jti}", self.key_prefix)
    }
}

fn wrap_redis_error(err: impl std::error::Error + Send + Sync + 'static) -> CitadelError {
    CitadelError::new(ErrorKind::Database)
        .with_message("revocation store request failed")
        .with_cause(err)
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    #[tracing::instrument(skip(self))]
    async fn revoke(&self, jti: Uuid, expires_at: i64) -> CitadelResult<()> {
        let mut conn = self.pool.get().await.map_err(wrap_redis_error)?;
        let key = self.key(jti);
        let ttl_secs = expires_at.saturating_sub(now_epoch_secs()).max(1) as u64;
        // Idempotent extension: a record already holding a longer TTL than
        // this call's `expires_at` is left alone rather than shortened.
        let existing_ttl: i64 = conn.ttl(&key).await.map_err(wrap_redis_error)?;
        if existing_ttl > 0 && existing_ttl as u64 >= ttl_secs {
            return Ok(());
        }
        conn.set_ex::<_, _, ()>(key, 1u8, ttl_secs)
            .await
            .map_err(wrap_redis_error)?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn is_revoked(&self, jti: Uuid) -> CitadelResult<bool> {
        let mut conn = self.pool.get().await.map_err(wrap_redis_error)?;
        let exists: bool = conn.exists(self.key(jti)).await.map_err(wrap_redis_error)?;
        Ok(exists)
    }
}
