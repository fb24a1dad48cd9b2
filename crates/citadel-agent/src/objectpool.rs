//! Typed free-lists for the six high-frequency object shapes used across
//! the agent substrate, aggregated behind a [`PoolManager`] with a
//! pluggable pooling strategy (§4.8).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::agent::{AgentInput, AgentOutput, MessageRecord, ToolInput, ToolOutput};

/// Size bounds applied when objects are returned to their pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolLimits {
    /// Byte buffers whose capacity exceeds this are discarded rather
    /// than re-pooled.
    pub max_buffer_size: usize,
    /// Map-bearing objects whose map exceeds this many keys have the map
    /// reallocated fresh instead of cleared in place.
    pub max_map_size: usize,
    /// Slice-bearing objects whose backing vector exceeds this capacity
    /// have it reallocated fresh instead of truncated in place.
    pub max_slice_size: usize,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_buffer_size: 64 * 1024,
            max_map_size: 100,
            max_slice_size: 100,
        }
    }
}

/// An object a [`TypedPool`] knows how to reset for reuse.
///
/// `reclaim` puts `self` back into its logically-empty state and reports
/// whether the pool should keep it: byte buffers past `max_buffer_size`
/// are discarded outright, while map/slice-bearing objects past their
/// bound keep the object but reallocate the oversized field, so the pool
/// never returns `false` for those shapes.
pub trait Poolable: Default + Send + 'static {
    /// Reset `self` to a logically-empty state, respecting `limits`.
    /// Returns `true` if the object should be kept in the free list.
    fn reclaim(&mut self, limits: &PoolLimits) -> bool;
}

impl Poolable for Vec<u8> {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        if self.capacity() > limits.max_buffer_size {
            false
        } else {
            self.clear();
            true
        }
    }
}

fn reclaim_map<K, V>(map: &mut std::collections::HashMap<K, V>, limits: &PoolLimits) {
    if map.len() > limits.max_map_size {
        *map = std::collections::HashMap::new();
    } else {
        map.clear();
    }
}

fn reclaim_vec<T>(vec: &mut Vec<T>, limits: &PoolLimits) {
    if vec.capacity() > limits.max_slice_size {
        *vec = Vec::new();
    } else {
        vec.clear();
    }
}

impl Poolable for MessageRecord {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        self.role.clear();
        self.content.clear();
        reclaim_map(&mut self.metadata, limits);
        true
    }
}

impl Poolable for ToolInput {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        self.name.clear();
        reclaim_map(&mut self.arguments, limits);
        true
    }
}

impl Poolable for ToolOutput {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        self.content.clear();
        reclaim_map(&mut self.metadata, limits);
        true
    }
}

impl Poolable for AgentInput {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        self.task.clear();
        self.instruction.clear();
        reclaim_map(&mut self.context, limits);
        true
    }
}

impl Poolable for AgentOutput {
    fn reclaim(&mut self, limits: &PoolLimits) -> bool {
        self.content.clear();
        reclaim_map(&mut self.metadata, limits);
        reclaim_vec(&mut self.steps, limits);
        reclaim_vec(&mut self.tool_calls, limits);
        true
    }
}

/// Point-in-time counters describing one [`TypedPool`]'s activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedPoolStats {
    /// `get` calls served.
    pub gets: u64,
    /// `put` calls served.
    pub puts: u64,
    /// Objects freshly constructed because the free list was empty.
    pub news: u64,
    /// Objects currently checked out (`gets - puts` since the last put
    /// that returned the object, tracked independently to stay accurate
    /// across discards).
    pub outstanding: i64,
}

/// A free-list of `T`, bounded by [`PoolLimits`].
pub struct TypedPool<T: Poolable> {
    free: Mutex<VecDeque<T>>,
    limits: PoolLimits,
    gets: AtomicU64,
    puts: AtomicU64,
    news: AtomicU64,
    outstanding: AtomicI64,
}

impl<T: Poolable> TypedPool<T> {
    /// Construct an empty pool bounded by `limits`.
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            free: Mutex::new(VecDeque::new()),
            limits,
            gets: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            news: AtomicU64::new(0),
            outstanding: AtomicI64::new(0),
        }
    }

    /// Take an object from the free list, constructing a fresh one if
    /// empty.
    pub fn get(&self) -> T {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        let popped = self.free.lock().expect("pool mutex poisoned").pop_front();
        popped.unwrap_or_else(|| {
            self.news.fetch_add(1, Ordering::Relaxed);
            T::default()
        })
    }

    /// Return `obj`, resetting it per [`Poolable::reclaim`]; discarded if
    /// `reclaim` reports it should not be kept.
    pub fn put(&self, mut obj: T) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        if obj.reclaim(&self.limits) {
            self.free.lock().expect("pool mutex poisoned").push_back(obj);
        }
    }

    /// Snapshot this pool's counters.
    pub fn stats(&self) -> TypedPoolStats {
        TypedPoolStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            news: self.news.load(Ordering::Relaxed),
            outstanding: self.outstanding.load(Ordering::Relaxed),
        }
    }
}

/// Hook allowing a deployment to tune or disable pooling per type, e.g.
/// pre-sizing the message/agent-output pools for an "LLM-heavy" workload
/// or refusing to re-pool oversized objects.
pub trait PoolStrategy: Send + Sync {
    /// Whether an object of `type_name` and (pool-defined) `size` should
    /// be pooled at all. Returning `false` makes `get` always allocate
    /// fresh and `put` always discard for that type.
    fn should_pool(&self, type_name: &str, size: usize) -> bool;
}

/// The default strategy: pool everything, deferring entirely to each
/// [`TypedPool`]'s own [`PoolLimits`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPoolStrategy;

impl PoolStrategy for AlwaysPoolStrategy {
    fn should_pool(&self, _type_name: &str, _size: usize) -> bool {
        true
    }
}

/// Aggregates the six typed pools under one configuration and strategy.
pub struct PoolManager {
    byte_buffers: TypedPool<Vec<u8>>,
    message_records: TypedPool<MessageRecord>,
    tool_inputs: TypedPool<ToolInput>,
    tool_outputs: TypedPool<ToolOutput>,
    agent_inputs: TypedPool<AgentInput>,
    agent_outputs: TypedPool<AgentOutput>,
    strategy: Arc<dyn PoolStrategy>,
}

impl PoolManager {
    /// Build a manager with `limits` applied to every pool and
    /// `strategy` consulted on every `get`/`put`.
    pub fn new(limits: PoolLimits, strategy: Arc<dyn PoolStrategy>) -> Self {
        Self {
            byte_buffers: TypedPool::new(limits),
            message_records: TypedPool::new(limits),
            tool_inputs: TypedPool::new(limits),
            tool_outputs: TypedPool::new(limits),
            agent_inputs: TypedPool::new(limits),
            agent_outputs: TypedPool::new(limits),
            strategy,
        }
    }

    /// Acquire a byte buffer.
    pub fn get_byte_buffer(&self) -> Vec<u8> {
        if self.strategy.should_pool("byte_buffer", 0) {
            self.byte_buffers.get()
        } else {
            Vec::new()
        }
    }

    /// Return a byte buffer.
    pub fn put_byte_buffer(&self, buf: Vec<u8>) {
        if self.strategy.should_pool("byte_buffer", buf.capacity()) {
            self.byte_buffers.put(buf);
        }
    }

    /// Acquire a message record.
    pub fn get_message_record(&self) -> MessageRecord {
        if self.strategy.should_pool("message_record", 0) {
            self.message_records.get()
        } else {
            MessageRecord::default()
        }
    }

    /// Return a message record.
    pub fn put_message_record(&self, record: MessageRecord) {
        if self.strategy.should_pool("message_record", record.metadata.len()) {
            self.message_records.put(record);
        }
    }

    /// Acquire a tool input.
    pub fn get_tool_input(&self) -> ToolInput {
        if self.strategy.should_pool("tool_input", 0) {
            self.tool_inputs.get()
        } else {
            ToolInput::default()
        }
    }

    /// Return a tool input.
    pub fn put_tool_input(&self, input: ToolInput) {
        if self.strategy.should_pool("tool_input", input.arguments.len()) {
            self.tool_inputs.put(input);
        }
    }

    /// Acquire a tool output.
    pub fn get_tool_output(&self) -> ToolOutput {
        if self.strategy.should_pool("tool_output", 0) {
            self.tool_outputs.get()
        } else {
            ToolOutput::default()
        }
    }

    /// Return a tool output.
    pub fn put_tool_output(&self, output: ToolOutput) {
        if self.strategy.should_pool("tool_output", output.metadata.len()) {
            self.tool_outputs.put(output);
        }
    }

    /// Acquire an agent input.
    pub fn get_agent_input(&self) -> AgentInput {
        if self.strategy.should_pool("agent_input", 0) {
            self.agent_inputs.get()
        } else {
            AgentInput::default()
        }
    }

    /// Return an agent input.
    pub fn put_agent_input(&self, input: AgentInput) {
        if self.strategy.should_pool("agent_input", input.context.len()) {
            self.agent_inputs.put(input);
        }
    }

    /// Acquire an agent output.
    pub fn get_agent_output(&self) -> AgentOutput {
        if self.strategy.should_pool("agent_output", 0) {
            self.agent_outputs.get()
        } else {
            AgentOutput::default()
        }
    }

    /// Return an agent output.
    pub fn put_agent_output(&self, output: AgentOutput) {
        if self.strategy.should_pool("agent_output", output.steps.len()) {
            self.agent_outputs.put(output);
        }
    }

    /// Per-pool counters, in the fixed order byte-buffer, message-record,
    /// tool-input, tool-output, agent-input, agent-output.
    pub fn stats(&self) -> [TypedPoolStats; 6] {
        [
            self.byte_buffers.stats(),
            self.message_records.stats(),
            self.tool_inputs.stats(),
            self.tool_outputs.stats(),
            self.agent_inputs.stats(),
            self.agent_outputs.stats(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reused_buffer_is_cleared_but_keeps_capacity() {
        let pool: TypedPool<Vec<u8>> = TypedPool::new(PoolLimits::default());
        let mut buf = pool.get();
        buf.extend_from_slice(b"hello");
        let capacity = buf.capacity();
        pool.put(buf);
        let reused = pool.get();
        assert!(reused.is_empty());
        assert_eq!(reused.capacity(), capacity);
    }

    #[test]
    fn oversized_buffer_is_discarded() {
        let limits = PoolLimits {
            max_buffer_size: 4,
            ..PoolLimits::default()
        };
        let pool: TypedPool<Vec<u8>> = TypedPool::new(limits);
        let mut buf = pool.get();
        buf.extend_from_slice(b"too large");
        pool.put(buf);
        assert_eq!(pool.stats().news, 1);
        let _ = pool.get();
        assert_eq!(pool.stats().news, 2);
    }

    #[test]
    fn oversized_map_is_reallocated_not_discarded() {
        let limits = PoolLimits {
            max_map_size: 1,
            ..PoolLimits::default()
        };
        let pool: TypedPool<ToolInput> = TypedPool::new(limits);
        let mut input = pool.get();
        input.arguments.insert("a".into(), serde_json::Value::Null);
        input.arguments.insert("b".into(), serde_json::Value::Null);
        pool.put(input);
        assert_eq!(pool.stats().puts, 1);
        let reused = pool.get();
        assert!(reused.arguments.is_empty());
    }

    #[test]
    fn strategy_can_disable_pooling_per_type() {
        struct NeverPool;
        impl PoolStrategy for NeverPool {
            fn should_pool(&self, _type_name: &str, _size: usize) -> bool {
                false
            }
        }
        let manager = PoolManager::new(PoolLimits::default(), Arc::new(NeverPool));
        manager.put_byte_buffer(vec![1, 2, 3]);
        let stats = manager.stats();
        assert_eq!(stats[0].puts, 0);
    }
}
