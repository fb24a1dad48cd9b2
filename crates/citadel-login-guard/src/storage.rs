//! Failure-counter and lock-marker storage backing the Login Guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use citadel_errors::CitadelResult;
use citadel_types::now_epoch_secs;
use tokio::sync::RwLock;

/// Contract a storage backend must satisfy for [`crate::LoginGuard`].
/// Separated from the guard itself so the lockout policy can be tested
/// independently of whatever backs its counters (in-memory here; a
/// Redis-backed implementation would set native TTLs instead of tracking
/// `window_started_at` locally).
#[async_trait]
pub trait LoginGuardStorage: Send + Sync {
    /// Increment the failure counter for `key`, resetting it first if the
    /// current window has elapsed. Returns the counter's new value.
    async fn increment_failures(&self, key: &str, window_secs: i64) -> CitadelResult<u32>;

    /// Reset the failure counter for `key` (called on a successful
    /// attempt).
    async fn reset_failures(&self, key: &str) -> CitadelResult<()>;

    /// Set a lock marker for `key`, valid for `duration_secs`.
    async fn lock(&self, key: &str, duration_secs: i64) -> CitadelResult<()>;

    /// The epoch second at which `key`'s lock marker expires, if any and
    /// still valid.
    async fn locked_until(&self, key: &str) -> CitadelResult<Option<i64>>;

    /// Increment a generic windowed counter for `key`, used by the
    /// optional composite rate-limiting dimension. Returns the counter's
    /// new value.
    async fn increment_counter(&self, key: &str, window_secs: i64) -> CitadelResult<u32>;
}

#[derive(Clone, Copy)]
struct Counter {
    count: u32,
    window_started_at: i64,
}

/// An in-process [`LoginGuardStorage`] backed by guarded hash maps.
#[derive(Default)]
pub struct MemoryLoginGuardStorage {
    failures: RwLock<HashMap<String, Counter>>,
    generic: RwLock<HashMap<String, Counter>>,
    locks: RwLock<HashMap<String, i64>>,
}

impl MemoryLoginGuardStorage {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn increment(map: &RwLock<HashMap<String, Counter>>, key: &str, window_secs: i64) -> u32 {
        let now = now_epoch_secs();
        let mut guard = map.write().await;
        let counter = guard.entry(key.to_string()).or_insert(Counter {
            count: 0,
            window_started_at: now,
        });
        if now - counter.window_started_at >= window_secs {
            counter.count = 0;
            counter.window_started_at = now;
        }
        counter.count += 1;
        counter.count
    }
}

#[async_trait]
impl LoginGuardStorage for MemoryLoginGuardStorage {
    async fn increment_failures(&self, key: &str, window_secs: i64) -> CitadelResult<u32> {
        Ok(Self::increment(&self.failures, key, window_secs).await)
    }

    async fn reset_failures(&self, key: &str) -> CitadelResult<()> {
        self.failures.write().await.remove(key);
        Ok(())
    }

    async fn lock(&self, key: &str, duration_secs: i64) -> CitadelResult<()> {
        self.locks
            .write()
            .await
            .insert(key.to_string(), now_epoch_secs() + duration_secs);
        Ok(())
    }

    async fn locked_until(&self, key: &str) -> CitadelResult<Option<i64>> {
        let locks = self.locks.read().await;
        Ok(locks.get(key).copied().filter(|&until| until > now_epoch_secs()))
    }

    async fn increment_counter(&self, key: &str, window_secs: i64) -> CitadelResult<u32> {
        Ok(Self::increment(&self.generic, key, window_secs).await)
    }
}

/// Convenience constructor for an `Arc`-wrapped default store.
pub fn default_storage() -> Arc<dyn LoginGuardStorage> {
    Arc::new(MemoryLoginGuardStorage::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failure_counter_increments() {
        let storage = MemoryLoginGuardStorage::new();
        assert_eq!(storage.increment_failures("alice", 60).await.unwrap(), 1);
        assert_eq!(storage.increment_failures("alice", 60).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reset_clears_counter() {
        let storage = MemoryLoginGuardStorage::new();
        storage.increment_failures("alice", 60).await.unwrap();
        storage.reset_failures("alice").await.unwrap();
        assert_eq!(storage.increment_failures("alice", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lock_marker_is_visible_until_expiry() {
        let storage = MemoryLoginGuardStorage::new();
        storage.lock("alice", 60).await.unwrap();
        assert!(storage.locked_until("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lock_marker_is_not_reported() {
        let storage = MemoryLoginGuardStorage::new();
        storage.lock("alice", -1).await.unwrap();
        assert!(storage.locked_until("alice").await.unwrap().is_none());
    }
}
