//! Graph validation — run this before executing a workflow.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the workflow.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. Exactly one node has type `start`, and it has no incoming edges.
//! 4. Every node must be reachable from the start node.
//! 5. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of node IDs on success.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{EngineError, models::Workflow};

/// Validate the workflow's graph and return nodes in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::NoStartNode`] / [`EngineError::MultipleStartNodes`] if
///   the start node is not unique.
/// - [`EngineError::StartNodeHasIncoming`] if an edge targets the start node.
/// - [`EngineError::UnreachableNodes`] if some node cannot be reached from
///   the start node.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(workflow: &Workflow) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &workflow.edges {
        if !node_set.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !node_set.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Exactly one start node, with no incoming edges
    // -----------------------------------------------------------------------
    let start_ids: Vec<&str> = workflow
        .nodes
        .iter()
        .filter(|n| n.is_start())
        .map(|n| n.id.as_str())
        .collect();

    let start_id = match start_ids.as_slice() {
        [] => return Err(EngineError::NoStartNode),
        [only] => *only,
        many => {
            return Err(EngineError::MultipleStartNodes(
                many.iter().map(|s| s.to_string()).collect(),
            ));
        }
    };

    if workflow.edges.iter().any(|e| e.to == start_id) {
        return Err(EngineError::StartNodeHasIncoming(start_id.to_string()));
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &workflow.nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for edge in &workflow.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    // -----------------------------------------------------------------------
    // 4. Every node must be reachable from the start node
    // -----------------------------------------------------------------------
    let mut visited: HashSet<&str> = HashSet::new();
    let mut frontier: VecDeque<&str> = VecDeque::new();
    visited.insert(start_id);
    frontier.push_back(start_id);
    while let Some(id) = frontier.pop_front() {
        if let Some(neighbours) = adjacency.get(id) {
            for &neighbour in neighbours {
                if visited.insert(neighbour) {
                    frontier.push_back(neighbour);
                }
            }
        }
    }
    if visited.len() != workflow.nodes.len() {
        let mut unreachable: Vec<String> = node_set
            .difference(&visited)
            .map(|s| s.to_string())
            .collect();
        unreachable.sort();
        return Err(EngineError::UnreachableNodes(unreachable));
    }

    // -----------------------------------------------------------------------
    // 5. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    // Seed the queue with nodes that have no incoming edges.
    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeDefinition, Workflow};
    use serde_json::Value;

    fn make_node(id: &str, node_type: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            node_type: node_type.into(),
            name: String::new(),
            config: Value::Null,
            on_error: None,
            timeout_ms: None,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge {
            from: from.into(),
            to: to.into(),
            branch: None,
        }
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // start → b → c
        let workflow = Workflow::new(
            "test",
            vec![
                make_node("a", "start"),
                make_node("b", "mock"),
                make_node("c", "mock"),
            ],
            vec![edge("a", "b"), edge("b", "c")],
        );

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let workflow = Workflow::new(
            "test",
            vec![
                make_node("a", "start"),
                make_node("b", "mock"),
                make_node("c", "mock"),
                make_node("d", "mock"),
            ],
            vec![
                edge("a", "b"),
                edge("a", "c"),
                edge("b", "d"),
                edge("c", "d"),
            ],
        );

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = Workflow::new(
            "bad",
            vec![make_node("a", "start"), make_node("a", "mock")],
            vec![],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = Workflow::new(
            "bad",
            vec![make_node("a", "start")],
            vec![edge("a", "ghost")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // a → b → c → b  (cycle)
        let workflow = Workflow::new(
            "bad",
            vec![
                make_node("a", "start"),
                make_node("b", "mock"),
                make_node("c", "mock"),
            ],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "b")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let workflow = Workflow::new("bad", vec![make_node("a", "mock")], vec![]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::NoStartNode)
        ));
    }

    #[test]
    fn multiple_start_nodes_are_rejected() {
        let workflow = Workflow::new(
            "bad",
            vec![make_node("a", "start"), make_node("b", "start")],
            vec![],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::MultipleStartNodes(ids)) if ids == vec!["a", "b"]
        ));
    }

    #[test]
    fn start_node_with_incoming_edge_is_rejected() {
        let workflow = Workflow::new(
            "bad",
            vec![make_node("a", "start"), make_node("b", "mock")],
            vec![edge("a", "b"), edge("b", "a")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::StartNodeHasIncoming(id)) if id == "a"
        ));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let workflow = Workflow::new(
            "bad",
            vec![
                make_node("a", "start"),
                make_node("b", "mock"),
                make_node("island", "mock"),
            ],
            vec![edge("a", "b")],
        );
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnreachableNodes(ids)) if ids == vec!["island"]
        ));
    }

    #[test]
    fn single_start_node_no_edges_is_valid() {
        let workflow = Workflow::new("solo", vec![make_node("solo", "start")], vec![]);
        let sorted = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }
}
