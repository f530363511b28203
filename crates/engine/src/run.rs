//! Run records — the observable outcome of one workflow execution.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use nodes::ExecutionResult;

/// How a run ended.
///
/// `CompletedWithErrors` means one or more nodes failed under a `continue`
/// policy; `Aborted` means scheduling stopped before the graph was
/// exhausted (error policy, routing error, or cancellation).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    #[serde(rename_all = "camelCase")]
    Aborted {
        /// The node whose failure triggered the abort, when there is one.
        node_id: Option<String>,
        message: String,
    },
}

impl RunStatus {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunStatus::Aborted { .. })
    }
}

/// One node's entry in the run trace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunRecord {
    pub node_id: String,
    pub result: ExecutionResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The full outcome of a run: final state plus the ordered per-node trace.
///
/// Ordering follows completion order, which is the order state deltas were
/// merged. Nodes that were skipped (un-taken branches) do not appear.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub workflow_id: Uuid,
    #[serde(flatten)]
    pub status: RunStatus,
    pub final_state: Map<String, Value>,
    pub node_results: Vec<NodeRunRecord>,
}

impl RunRecord {
    /// Look up the trace entry for a node, if it executed.
    pub fn node_result(&self, node_id: &str) -> Option<&NodeRunRecord> {
        self.node_results.iter().find(|r| r.node_id == node_id)
    }
}
