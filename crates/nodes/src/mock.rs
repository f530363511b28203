//! `MockNode` — a test double for `NodeExecutor`.
//!
//! Scripted through node config so one registered instance can serve many
//! nodes in a test workflow:
//!
//! ```json
//! { "output": {...}, "stateUpdates": {...}, "branch": "x", "error": "boom" }
//! ```
//!
//! Every call is recorded (node id plus the state snapshot the node saw) so
//! tests can assert execution order and visibility.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use crate::traits::{ExecutionContext, NodeExecutor, NodeInfo};
use crate::ExecutionResult;

/// One recorded execution.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub node_id: String,
    /// The state bag view the node received.
    pub state: Value,
}

/// A mock node that behaves as its config dictates and records every call.
#[derive(Debug, Default)]
pub struct MockNode {
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded calls, in execution order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times the node with `node_id` was executed.
    pub fn call_count(&self, node_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.node_id == node_id)
            .count()
    }

    /// Total executions across all node ids.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl NodeExecutor for MockNode {
    async fn execute(
        &self,
        node: &NodeInfo,
        state: &Value,
        _ctx: &ExecutionContext,
    ) -> ExecutionResult {
        self.calls.lock().unwrap().push(MockCall {
            node_id: node.id.clone(),
            state: state.clone(),
        });

        if let Some(message) = node.config.get("error").and_then(Value::as_str) {
            return ExecutionResult::error(
                format!("mock node '{}': {message}", node.id),
                None,
            );
        }

        let output = node
            .config
            .get("output")
            .cloned()
            .unwrap_or_else(|| json!({ "node": node.id }));

        let mut result = ExecutionResult::success(output);

        if let Some(Value::Object(updates)) = node.config.get("stateUpdates") {
            result = result.with_state_updates(updates.clone());
        }
        if let Some(branch) = node.config.get("branch").and_then(Value::as_str) {
            result = result.with_branch(branch);
        }

        result
    }
}
