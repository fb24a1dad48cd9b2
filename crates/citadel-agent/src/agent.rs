//! The `Agent` invocation contract and the concrete input/output shapes
//! the rest of this crate pools, caches and batches.

use std::collections::HashMap;

use async_trait::async_trait;
use citadel_errors::CitadelResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single turn of conversational context, the unit message records and
/// caches are built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Who produced this message (`"user"`, `"assistant"`, `"tool"`, …).
    pub role: String,
    /// Message body.
    pub content: String,
    /// Arbitrary side-channel metadata.
    pub metadata: HashMap<String, Value>,
}

/// Arguments passed to a tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// Tool name.
    pub name: String,
    /// Keyword arguments.
    pub arguments: HashMap<String, Value>,
}

/// The result of a tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Tool's textual result.
    pub content: String,
    /// Arbitrary side-channel metadata.
    pub metadata: HashMap<String, Value>,
}

/// Input to a single [`Agent::invoke`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInput {
    /// Short description of the task being performed.
    pub task: String,
    /// The instruction to carry out.
    pub instruction: String,
    /// Arbitrary context bag.
    pub context: HashMap<String, Value>,
}

/// Output of a single [`Agent::invoke`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Final textual result.
    pub content: String,
    /// Arbitrary side-channel metadata.
    pub metadata: HashMap<String, Value>,
    /// Ordered trace of intermediate steps taken, if the agent reports them.
    pub steps: Vec<String>,
    /// Tool calls issued while producing this output.
    pub tool_calls: Vec<ToolInput>,
}

/// The contract a user-supplied agent implements to be poolable, cacheable
/// and batchable by this crate. Deliberately minimal – a single
/// request/response operation – so [`crate::cache::ResultCache`] and
/// [`crate::batch::BatchExecutor`] can wrap any implementation without
/// knowing its internals.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent once against `input`.
    async fn invoke(&self, input: AgentInput) -> CitadelResult<AgentOutput>;
}
