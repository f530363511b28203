//! Node type registry.
//!
//! Node types are a closed set at run time: the scheduler resolves each
//! node's `type` string through this map exactly once per execution. New
//! node types plug in by registering an executor; there is no open-ended
//! dynamic dispatch beyond this lookup.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::{DecisionNode, NodeExecutor, StartNode};

/// Maps `node_type` strings to shared `NodeExecutor` implementations.
pub type NodeRegistry = HashMap<String, Arc<dyn NodeExecutor>>;

/// Registry with the built-in node types: `start` and `decision`.
pub fn default_registry() -> NodeRegistry {
    let mut registry: NodeRegistry = HashMap::new();
    registry.insert("start".to_string(), Arc::new(StartNode));
    registry.insert("decision".to_string(), Arc::new(DecisionNode));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_types_are_registered() {
        let registry = default_registry();
        assert!(registry.contains_key("start"));
        assert!(registry.contains_key("decision"));
        assert!(!registry.contains_key("llm_call"));
    }
}
