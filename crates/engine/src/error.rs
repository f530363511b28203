//! Engine-level error types.

use thiserror::Error;

/// Errors produced by pre-run graph validation.
///
/// Node-local failures are not errors at this level: they travel inside
/// `ExecutionResult` values and are resolved by the scheduler's error
/// policy. Anything here means the run never started.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the workflow.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// The workflow has no node of type `start`.
    #[error("workflow has no start node")]
    NoStartNode,

    /// The workflow has more than one node of type `start`.
    #[error("workflow has multiple start nodes: {0:?}")]
    MultipleStartNodes(Vec<String>),

    /// The start node is the target of an edge.
    #[error("start node '{0}' must not have incoming edges")]
    StartNodeHasIncoming(String),

    /// One or more nodes cannot be reached from the start node.
    #[error("unreachable node(s): {0:?}")]
    UnreachableNodes(Vec<String>),
}
