//! The `NodeExecutor` trait — the contract every node type must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::ExecutionResult;

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: uuid::Uuid,
    /// ID of the current run.
    pub run_id: uuid::Uuid,
    /// External input supplied when the run was triggered.
    pub initial_data: Value,
}

/// Read view of the node under execution: identity plus type-specific config.
///
/// The scheduler owns the full node definition (policies, timeouts, wiring);
/// executors only ever see this slice of it.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    pub config: Value,
}

/// The core node trait.
///
/// `execute` receives a point-in-time read view of the state bag and must
/// not mutate shared state directly — deltas travel back in the returned
/// [`ExecutionResult`]. Expected failures are returned as error results,
/// never as panics.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &NodeInfo,
        state: &Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult;
}
