//! The result value every node executor returns.
//!
//! Expected/business failures are data, not `Err`: an executor that cannot
//! do its job returns [`ExecutionResult::error`] and the scheduler decides
//! what that means for the run (abort or bypass, per policy).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description of a node-local failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// Human-readable message; always names the failing node.
    pub message: String,
    /// Optional structured detail (e.g. the offending config fragment).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Outcome of a single node execution.
///
/// `branch` is meaningful only for decision-type nodes; its absence means
/// "follow all outgoing edges". `state_updates` is `None` for a no-op delta
/// so callers can distinguish it from an explicit empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_updates: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeFailure>,
}

impl ExecutionResult {
    /// A successful result with the given output and no delta or branch.
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            state_updates: None,
            branch: None,
            error: None,
        }
    }

    /// A failed result. The message must contain the node id.
    pub fn error(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            state_updates: None,
            branch: None,
            error: Some(NodeFailure {
                message: message.into(),
                details,
            }),
        }
    }

    /// Attach a state delta. An empty delta is normalized to `None`.
    pub fn with_state_updates(mut self, updates: Map<String, Value>) -> Self {
        self.state_updates = if updates.is_empty() {
            None
        } else {
            Some(updates)
        };
        self
    }

    /// Attach the branch identifier the scheduler should follow.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Attach an error message to an otherwise successful result.
    ///
    /// Used by the decision executor when an evaluation error degrades to
    /// the fallback branch: the run continues, but the error is visible in
    /// the trace.
    pub fn with_error(mut self, message: impl Into<String>, details: Option<Value>) -> Self {
        self.error = Some(NodeFailure {
            message: message.into(),
            details,
        });
        self
    }
}
