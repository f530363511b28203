//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory. They serialize to/from the JSON definition a caller hands
//! the engine; persistence of definitions is an external concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ErrorPolicy
// ---------------------------------------------------------------------------

/// What the scheduler does when a node returns an error result.
///
/// Settable per node, with a workflow-level default. Never implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Abort the whole run (default).
    #[default]
    Abort,
    /// Record the failure, skip the node's labeled edges, and continue via
    /// its unlabeled "always" edges.
    Continue,
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the workflow graph. Immutable once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique identifier within this workflow (referenced by edges).
    pub id: String,
    /// Selects the registered `NodeExecutor` implementation.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Display name; empty means "use the id".
    #[serde(default)]
    pub name: String,
    /// Type-specific configuration passed to the executor.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Per-node override of the workflow's error policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
    /// Per-node execution timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl NodeDefinition {
    pub fn is_start(&self) -> bool {
        self.node_type == "start"
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another.
///
/// A labeled edge is only followed when its source node emits the matching
/// branch; unlabeled edges are "always" edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<Edge>,
    /// Workflow-level default error policy.
    #[serde(default)]
    pub on_error: ErrorPolicy,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(name: impl Into<String>, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes,
            edges,
            on_error: ErrorPolicy::default(),
            created_at: Utc::now(),
        }
    }
}
