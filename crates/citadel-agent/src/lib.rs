#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **citadel-agent** – the `Agent` invocation contract plus four
//! sibling facilities built on top of it: a bounded instance pool, a
//! fingerprint-keyed result cache, a bounded-concurrency batch executor,
//! and typed object pools for the substrate's high-frequency shapes.
//! They share the pooling/TTL-map idiom used throughout this workspace
//! and are typically deployed together.

mod agent;
mod batch;
mod cache;
mod objectpool;
mod pool;

pub use agent::{Agent, AgentInput, AgentOutput, MessageRecord, ToolInput, ToolOutput};
pub use batch::{BatchExecutor, BatchExecutorConfig, BatchOutcome, BatchStats, ErrorPolicy};
pub use cache::{default_fingerprint, CacheStats, FingerprintFn, ResultCache};
pub use objectpool::{AlwaysPoolStrategy, PoolLimits, PoolManager, Poolable, PoolStrategy, TypedPool, TypedPoolStats};
pub use pool::{AgentPool, AgentPoolConfig, AgentPoolStats, Lease};
