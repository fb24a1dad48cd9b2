//! In-process Revocation Store, backed by a guarded hash map.
//!
//! Mirrors the shape of a TTL-keyed in-memory counter store: entries carry
//! their own expiry, and a background sweeper periodically scans for and
//! removes entries past expiry in small batches rather than taking a
//! single exclusive lock over the whole table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use citadel_auth::RevocationStore;
use citadel_errors::CitadelResult;
use citadel_types::now_epoch_secs;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Number of expired entries removed per sweep pass, keeping any single
/// sweep's write-lock hold time bounded regardless of table size.
const SWEEP_BATCH_SIZE: usize = 100;

/// Default interval between background sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Inner {
    entries: RwLock<HashMap<Uuid, i64>>,
    last_sweep: RwLock<Instant>,
    sweep_interval: Duration,
}

/// A [`RevocationStore`] that keeps revoked token ids in a process-local
/// map. Suitable for a single-instance deployment or as the primary layer
/// in front of a distributed store.
#[derive(Clone)]
pub struct InMemoryRevocationStore {
    inner: Arc<Inner>,
}

impl InMemoryRevocationStore {
    /// Construct a store that sweeps expired entries at most once per
    /// `sweep_interval`.
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                last_sweep: RwLock::new(Instant::now()),
                sweep_interval,
            }),
        }
    }

    /// Run the background sweeper on `tokio::spawn`, returning a handle
    /// the caller may abort on shutdown. The sweeper loops for the
    /// lifetime of the returned task; dropping the handle without
    /// aborting leaves it running, matching the detached-task convention
    /// used for other background maintenance loops in this workspace.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.inner.sweep_interval);
            loop {
                ticker.tick().await;
                store.sweep_once().await;
            }
        })
    }

    async fn maybe_sweep(&self) {
        let due = {
            let last = self.inner.last_sweep.read().await;
            last.elapsed() >= self.inner.sweep_interval
        };
        if due {
            self.sweep_once().await;
        }
    }

    /// Scan-then-delete in batches of [`SWEEP_BATCH_SIZE`]: the scan phase
    /// takes a read lock to collect expired keys, the delete phase takes a
    /// short write lock per batch, so a large table never blocks readers
    /// for the whole sweep.
    async fn sweep_once(&self) {
        *self.inner.last_sweep.write().await = Instant::now();
        let now = now_epoch_secs();
        loop {
            let expired: Vec<Uuid> = {
                let entries = self.inner.entries.read().await;
                entries
                    .iter()
                    .filter(|(_, &expires_at)| expires_at <= now)
                    .take(SWEEP_BATCH_SIZE)
                    .map(|(jti, _)| *jti)
                    .collect()
            };
            if expired.is_empty() {
                break;
            }
            let removed = expired.len();
            {
                let mut entries = self.inner.entries.write().await;
                for jti in expired {
                    entries.remove(&jti);
                }
            }
            tracing::debug!(removed, "swept expired revocation entries");
            if removed < SWEEP_BATCH_SIZE {
                break;
            }
        }
    }

    /// Number of entries currently tracked, expired or not. Exposed for
    /// tests and metrics.
    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }
}

impl Default for InMemoryRevocationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, jti: Uuid, expires_at: i64) -> CitadelResult<()> {
        self.maybe_sweep().await;
        let mut entries = self.inner.entries.write().await;
        entries
            .entry(jti)
            .and_modify(|existing| *existing = (*existing).max(expires_at))
            .or_insert(expires_at);
        Ok(())
    }

    async fn is_revoked(&self, jti: Uuid) -> CitadelResult<bool> {
        self.maybe_sweep().await;
        let now = now_epoch_secs();
        let entries = self.inner.entries.read().await;
        Ok(entries.get(&jti).map(|&exp| exp > now).unwrap_or(false))
    }
}
