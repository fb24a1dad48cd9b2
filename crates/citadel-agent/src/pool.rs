//! Bounded pool of reusable instances produced by a user-supplied
//! factory, with FIFO waiters and a background sweeper (§4.5).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use citadel_errors::{CitadelError, CitadelResult, ErrorKind};
use tokio::sync::{oneshot, Mutex};

/// Configuration for an [`AgentPool`].
#[derive(Debug, Clone, Copy)]
pub struct AgentPoolConfig {
    /// Instances eagerly created at construction, clamped to `max_size`.
    pub initial_size: usize,
    /// Hard cap on the number of instances (idle + in-use).
    pub max_size: usize,
    /// How long an idle instance may sit before the sweeper evicts it.
    pub idle_timeout: Duration,
    /// How long an instance may exist before the sweeper evicts it
    /// regardless of idle time.
    pub max_lifetime: Duration,
    /// Default deadline for `acquire` when the caller does not supply one.
    pub acquire_timeout: Duration,
    /// Interval between sweeper passes.
    pub cleanup_interval: Duration,
}

impl Default for AgentPoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 0,
            max_size: 16,
            idle_timeout: Duration::from_secs(5 * 60),
            max_lifetime: Duration::from_secs(60 * 60),
            acquire_timeout: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl AgentPoolConfig {
    fn clamped_initial_size(&self) -> usize {
        self.initial_size.min(self.max_size)
    }
}

/// Point-in-time counters describing an [`AgentPool`]'s state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentPoolStats {
    /// Instances currently tracked (idle + in-use).
    pub total: usize,
    /// Instances currently checked out.
    pub active: usize,
    /// Instances currently idle.
    pub idle: usize,
    /// Instances created since construction.
    pub created_total: u64,
    /// Successful `acquire` calls since construction.
    pub acquired_total: u64,
    /// `release` calls since construction.
    pub released_total: u64,
    /// Instances evicted and rebuilt by the sweeper.
    pub recycled_total: u64,
    /// Callers currently waiting for an instance.
    pub waiter_count: usize,
}

struct Managed<T> {
    instance: T,
    created_at: Instant,
    last_used_at: Instant,
}

struct InUseMeta {
    created_at: Instant,
}

enum WaiterSignal<T> {
    Instance(u64, T),
    Closed,
}

struct PoolState<T> {
    idle: VecDeque<(u64, Managed<T>)>,
    in_use: HashMap<u64, InUseMeta>,
    waiters: VecDeque<oneshot::Sender<WaiterSignal<T>>>,
    closed: bool,
    created_total: u64,
    acquired_total: u64,
    released_total: u64,
    recycled_total: u64,
}

impl<T> PoolState<T> {
    fn population(&self) -> usize {
        self.idle.len() + self.in_use.len()
    }
}

/// A handle to a checked-out instance. Must be returned via
/// [`AgentPool::release`]; dropping it without releasing leaks the slot
/// until the sweeper's `max_lifetime` eviction would reclaim it — this
/// pool follows the explicit release/error-on-double-release contract
/// rather than an RAII guard.
pub struct Lease<T> {
    id: u64,
    instance: T,
}

impl<T> Lease<T> {
    /// Borrow the underlying instance.
    pub fn get(&self) -> &T {
        &self.instance
    }

    /// Mutably borrow the underlying instance.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.instance
    }
}

/// A bounded pool of `T` instances, built by `factory` on demand up to
/// `max_size` and reused thereafter.
pub struct AgentPool<T: Send + 'static> {
    state: Arc<Mutex<PoolState<T>>>,
    factory: Arc<dyn Fn() -> CitadelResult<T> + Send + Sync>,
    config: AgentPoolConfig,
    next_id: AtomicU64,
}

impl<T: Send + 'static> AgentPool<T> {
    /// Construct a pool, eagerly building `initial_size` instances
    /// (clamped to `max_size`) via `factory`.
    pub fn new(
        config: AgentPoolConfig,
        factory: impl Fn() -> CitadelResult<T> + Send + Sync + 'static,
    ) -> CitadelResult<Self> {
        let factory: Arc<dyn Fn() -> CitadelResult<T> + Send + Sync> = Arc::new(factory);
        let next_id = AtomicU64::new(0);
        let mut idle = VecDeque::new();
        let mut created_total = 0u64;
        for _ in 0..config.clamped_initial_size() {
            let instance = factory()?;
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            let now = Instant::now();
            idle.push_back((
                id,
                Managed {
                    instance,
                    created_at: now,
                    last_used_at: now,
                },
            ));
            created_total += 1;
        }
        Ok(Self {
            state: Arc::new(Mutex::new(PoolState {
                idle,
                in_use: HashMap::new(),
                waiters: VecDeque::new(),
                closed: false,
                created_total,
                acquired_total: 0,
                released_total: 0,
                recycled_total: 0,
            })),
            factory,
            config,
            next_id,
        })
    }

    /// Acquire an instance, waiting up to `config.acquire_timeout` for one
    /// to become available.
    pub async fn acquire(&self) -> CitadelResult<Lease<T>> {
        self.acquire_within(self.config.acquire_timeout).await
    }

    /// Acquire an instance, waiting up to `timeout`.
    #[tracing::instrument(skip(self))]
    pub async fn acquire_within(&self, timeout: Duration) -> CitadelResult<Lease<T>> {
        enum NextStep<T> {
            Ready(u64, T),
            NeedsFactory,
            Wait(oneshot::Receiver<WaiterSignal<T>>),
        }

        let step = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(CitadelError::new(ErrorKind::PoolClosed));
            }
            if let Some((id, managed)) = state.idle.pop_front() {
                state.in_use.insert(
                    id,
                    InUseMeta {
                        created_at: managed.created_at,
                    },
                );
                state.acquired_total += 1;
                NextStep::Ready(id, managed.instance)
            } else if state.population() < self.config.max_size {
                NextStep::NeedsFactory
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                NextStep::Wait(rx)
            }
        };

        match step {
            NextStep::Ready(id, instance) => Ok(Lease { id, instance }),
            NextStep::NeedsFactory => {
                // Invoked outside the lock: the factory is user code and
                // MUST NOT run while holding the pool's mutex.
                let instance = (self.factory)()?;
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(CitadelError::new(ErrorKind::PoolClosed));
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                state.in_use.insert(
                    id,
                    InUseMeta {
                        created_at: Instant::now(),
                    },
                );
                state.created_total += 1;
                state.acquired_total += 1;
                Ok(Lease { id, instance })
            }
            NextStep::Wait(rx) => match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(WaiterSignal::Instance(id, instance))) => Ok(Lease { id, instance }),
                Ok(Ok(WaiterSignal::Closed)) => Err(CitadelError::new(ErrorKind::PoolClosed)),
                Ok(Err(_)) => {
                    Err(CitadelError::new(ErrorKind::Internal).with_message("waiter channel dropped"))
                }
                Err(_) => Err(CitadelError::new(ErrorKind::PoolTimeout)),
            },
        }
    }

    /// Return a previously acquired instance. Errors if `lease` did not
    /// originate from this pool or was already released.
    #[tracing::instrument(skip(self, lease))]
    pub async fn release(&self, lease: Lease<T>) -> CitadelResult<()> {
        let Lease { id, mut instance } = lease;
        let mut state = self.state.lock().await;
        let meta = state.in_use.remove(&id).ok_or_else(|| {
            CitadelError::new(ErrorKind::InvalidParam)
                .with_message("instance is not known to this pool or was already released")
        })?;
        state.released_total += 1;
        if state.closed {
            return Ok(());
        }
        while let Some(waiter) = state.waiters.pop_front() {
            state.in_use.insert(
                id,
                InUseMeta {
                    created_at: meta.created_at,
                },
            );
            state.acquired_total += 1;
            match waiter.send(WaiterSignal::Instance(id, instance)) {
                Ok(()) => return Ok(()),
                Err(WaiterSignal::Instance(_, returned)) => {
                    // The waiter gave up (its receiver was dropped, e.g.
                    // its own acquire timed out) between being popped and
                    // receiving the handoff. Undo the bookkeeping above
                    // and try the next waiter, or fall through to idle.
                    state.in_use.remove(&id);
                    state.acquired_total -= 1;
                    instance = returned;
                }
                Err(WaiterSignal::Closed) => unreachable!("never sent to a waiter"),
            }
        }
        state.idle.push_back((
            id,
            Managed {
                instance,
                created_at: meta.created_at,
                last_used_at: Instant::now(),
            },
        ));
        Ok(())
    }

    /// Acquire, invoke `f`, then release, propagating `f`'s result.
    pub async fn execute<R, F>(&self, f: F) -> CitadelResult<R>
    where
        F: FnOnce(&mut T) -> CitadelResult<R>,
    {
        let mut lease = self.acquire().await?;
        let result = f(lease.get_mut());
        self.release(lease).await?;
        result
    }

    /// Close the pool: wake all waiters with [`ErrorKind::PoolClosed`]
    /// and reject further `acquire` calls. Instances currently checked
    /// out are not reclaimed; their next `release` discards them.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        while let Some(waiter) = state.waiters.pop_front() {
            let _ = waiter.send(WaiterSignal::Closed);
        }
    }

    /// Snapshot the pool's counters.
    pub async fn stats(&self) -> AgentPoolStats {
        let state = self.state.lock().await;
        AgentPoolStats {
            total: state.population(),
            active: state.in_use.len(),
            idle: state.idle.len(),
            created_total: state.created_total,
            acquired_total: state.acquired_total,
            released_total: state.released_total,
            recycled_total: state.recycled_total,
            waiter_count: state.waiters.len(),
        }
    }

    /// Run one sweeper pass: evict idle instances past `idle_timeout` or
    /// `max_lifetime`, rebuilding via `factory` to keep at least
    /// `initial_size` instances in the idle set.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> CitadelResult<()> {
        let now = Instant::now();
        let mut to_rebuild = 0usize;
        {
            let mut state = self.state.lock().await;
            let keep_at_least = self.config.clamped_initial_size();
            let mut kept = VecDeque::new();
            while let Some((id, managed)) = state.idle.pop_front() {
                let idle_for = now.duration_since(managed.last_used_at);
                let alive_for = now.duration_since(managed.created_at);
                let expired = idle_for >= self.config.idle_timeout || alive_for >= self.config.max_lifetime;
                if expired && kept.len() >= keep_at_least {
                    state.recycled_total += 1;
                    to_rebuild += 1;
                    let _ = id;
                } else {
                    kept.push_back((id, managed));
                }
            }
            state.idle = kept;
        }
        for _ in 0..to_rebuild {
            let instance = (self.factory)()?;
            let mut state = self.state.lock().await;
            if state.closed {
                break;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let now = Instant::now();
            state.idle.push_back((
                id,
                Managed {
                    instance,
                    created_at: now,
                    last_used_at: now,
                },
            ));
            state.created_total += 1;
        }
        Ok(())
    }

    /// Spawn the background sweeper on `tokio::spawn`.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.cleanup_interval);
            loop {
                ticker.tick().await;
                if let Err(err) = pool.sweep_once().await {
                    tracing::warn!(error = %err, "agent pool sweeper failed to rebuild an instance");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_pool(max_size: usize) -> (Arc<AtomicUsize>, AgentPool<usize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let factory_counter = counter.clone();
        let pool = AgentPool::new(
            AgentPoolConfig {
                initial_size: 0,
                max_size,
                ..AgentPoolConfig::default()
            },
            move || {
                let id = factory_counter.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            },
        )
        .unwrap();
        (counter, pool)
    }

    #[tokio::test]
    async fn acquire_builds_new_instance_under_cap() {
        let (_counter, pool) = counting_pool(2);
        let lease = pool.acquire().await.unwrap();
        assert_eq!(*lease.get(), 0);
    }

    #[tokio::test]
    async fn release_returns_instance_to_idle_for_reuse() {
        let (_counter, pool) = counting_pool(1);
        let lease = pool.acquire().await.unwrap();
        pool.release(lease).await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.idle, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn acquire_times_out_when_saturated() {
        let (_counter, pool) = counting_pool(1);
        let _held = pool.acquire().await.unwrap();
        let err = pool
            .acquire_within(Duration::from_millis(20))
            .await
            .expect_err("second acquire on a saturated single-capacity pool must time out");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::PoolTimeout);
    }

    #[tokio::test]
    async fn double_release_is_rejected() {
        let (_counter, pool) = counting_pool(1);
        let lease = pool.acquire().await.unwrap();
        let id = lease.id;
        pool.release(lease).await.unwrap();
        let err = pool
            .release(Lease { id, instance: 0 })
            .await
            .expect_err("releasing an id twice must fail");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::InvalidParam);
    }

    #[tokio::test]
    async fn closed_pool_rejects_new_acquisitions() {
        let (_counter, pool) = counting_pool(1);
        pool.close().await;
        let err = pool.acquire().await.expect_err("closed pool must reject acquire");
        assert_eq!(err.kind(), citadel_errors::ErrorKind::PoolClosed);
    }
}
