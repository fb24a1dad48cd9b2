//! Wraps an [`Agent`] with a fingerprint-keyed, TTL-based result cache
//! (§4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use citadel_errors::CitadelResult;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::agent::{Agent, AgentInput, AgentOutput};

/// A function computing a cache key from an [`AgentInput`]. The default
/// fingerprint hashes a deterministic serialization of `{task,
/// instruction, context}`; callers may inject their own to make the
/// cache opaque to input semantics entirely.
pub type FingerprintFn = Arc<dyn Fn(&AgentInput) -> String + Send + Sync>;

/// Default fingerprint: SHA-256 over a deterministic JSON serialization
/// of the task, instruction and context map.
pub fn default_fingerprint(input: &AgentInput) -> String {
    let mut context_keys: Vec<&String> = input.context.keys().collect();
    context_keys.sort();
    let mut hasher = Sha256::new();
    hasher.update(input.task.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.instruction.as_bytes());
    hasher.update([0u8]);
    for key in context_keys {
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        let value = &input.context[key];
        hasher.update(value.to_string().as_bytes());
        hasher.update([b';']);
    }
    hex::encode(hasher.finalize())
}

struct Entry {
    output: AgentOutput,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    hit_latency_total: AtomicU64,
    hit_latency_count: AtomicU64,
    miss_latency_total: AtomicU64,
    miss_latency_count: AtomicU64,
}

/// Point-in-time counters describing a [`ResultCache`]'s behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Requests served from cache.
    pub hits: u64,
    /// Requests that required invoking the wrapped agent.
    pub misses: u64,
    /// Entries removed by `Invalidate`/`InvalidateAll`.
    pub evictions: u64,
    /// Entries removed because they were found past their TTL.
    pub expirations: u64,
    /// `hits / (hits + misses)`, as a percentage; `0.0` with no traffic.
    pub hit_rate_percent: f64,
    /// Mean latency of cache hits, in microseconds.
    pub mean_hit_latency_micros: f64,
    /// Mean latency of cache misses (including the wrapped agent's
    /// latency), in microseconds.
    pub mean_miss_latency_micros: f64,
}

/// Wraps an [`Agent`], caching `invoke` results keyed by input fingerprint
/// for a uniform TTL.
pub struct ResultCache<A: Agent> {
    inner: Arc<A>,
    store: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    fingerprint: FingerprintFn,
    stats: CacheStatsInner,
}

impl<A: Agent> ResultCache<A> {
    /// Wrap `inner`, caching results for `ttl` using the default
    /// fingerprint function.
    pub fn new(inner: Arc<A>, ttl: Duration) -> Self {
        Self::with_fingerprint(inner, ttl, Arc::new(default_fingerprint))
    }

    /// Wrap `inner`, caching results for `ttl` using a custom
    /// fingerprint function.
    pub fn with_fingerprint(inner: Arc<A>, ttl: Duration, fingerprint: FingerprintFn) -> Self {
        Self {
            inner,
            store: RwLock::new(HashMap::new()),
            ttl,
            fingerprint,
            stats: CacheStatsInner::default(),
        }
    }

    /// Remove the entry corresponding to `input`'s fingerprint, if any.
    pub async fn invalidate(&self, input: &AgentInput) {
        let key = (self.fingerprint)(input);
        if self.store.write().await.remove(&key).is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Clear every cached entry.
    pub async fn invalidate_all(&self) {
        let mut store = self.store.write().await;
        self.stats.evictions.fetch_add(store.len() as u64, Ordering::Relaxed);
        store.clear();
    }

    /// Snapshot the cache's hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate_percent = if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        };
        let mean_hit = mean_micros(
            self.stats.hit_latency_total.load(Ordering::Relaxed),
            self.stats.hit_latency_count.load(Ordering::Relaxed),
        );
        let mean_miss = mean_micros(
            self.stats.miss_latency_total.load(Ordering::Relaxed),
            self.stats.miss_latency_count.load(Ordering::Relaxed),
        );
        CacheStats {
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            hit_rate_percent,
            mean_hit_latency_micros: mean_hit,
            mean_miss_latency_micros: mean_miss,
        }
    }

    /// Access the wrapped agent directly, bypassing the cache.
    pub fn inner(&self) -> &Arc<A> {
        &self.inner
    }
}

fn mean_micros(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

#[async_trait]
impl<A: Agent> Agent for ResultCache<A> {
    async fn invoke(&self, input: AgentInput) -> CitadelResult<AgentOutput> {
        let key = (self.fingerprint)(&input);
        let started = Instant::now();

        {
            let store = self.store.read().await;
            if let Some(entry) = store.get(&key) {
                if entry.expires_at > Instant::now() {
                    let output = clone_output_fresh(&entry.output);
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .hit_latency_total
                        .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
                    self.stats.hit_latency_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(output);
                }
            }
        }

        // Either a miss or an expired entry; drop it if expired so the
        // next reader doesn't re-discover the same staleness.
        {
            let mut store = self.store.write().await;
            if let Some(entry) = store.get(&key) {
                if entry.expires_at <= Instant::now() {
                    store.remove(&key);
                    self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let output = self.inner.invoke(input).await?;
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.stats
            .miss_latency_total
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.stats.miss_latency_count.fetch_add(1, Ordering::Relaxed);

        let entry = Entry {
            output: clone_output_fresh(&output),
            expires_at: Instant::now() + self.ttl,
        };
        self.store.write().await.insert(key, entry);
        Ok(output)
    }
}

/// Copy `output`, freshly allocating its mutable sub-structures (metadata
/// map, step list, tool-call list) rather than sharing them with the
/// cached copy, so a caller mutating its result never perturbs the entry
/// served to the next hit.
fn clone_output_fresh(output: &AgentOutput) -> AgentOutput {
    AgentOutput {
        content: output.content.clone(),
        metadata: output.metadata.clone(),
        steps: output.steps.clone(),
        tool_calls: output.tool_calls.clone(),
    }
}
