//! Start node executor — turns the run's external input into the first
//! state delta.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::traits::{ExecutionContext, NodeExecutor, NodeInfo};
use crate::vars::{resolve_variable, scope_with_input};
use crate::ExecutionResult;

/// Wire config for a start node.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartConfig {
    /// Names that must be present (non-null, non-empty-string) in the run's
    /// initial data.
    pub required_inputs: Vec<String>,
    /// Baseline state values, overridden by mapped inputs on key collision.
    pub defaults: Map<String, Value>,
    /// `targetVar -> sourcePathOrLiteral`. `$`-prefixed strings resolve
    /// against `{ ...state, input: initialData }`; anything else is assigned
    /// verbatim. `None` means whole-input passthrough.
    pub input_mapping: Option<Map<String, Value>>,
}

/// The `start` node type.
#[derive(Debug, Default)]
pub struct StartNode;

impl StartNode {
    fn parse_config(node: &NodeInfo) -> Result<StartConfig, String> {
        if node.config.is_null() {
            return Ok(StartConfig::default());
        }
        serde_json::from_value(node.config.clone())
            .map_err(|e| format!("start node '{}': invalid config: {e}", node.id))
    }
}

#[async_trait]
impl NodeExecutor for StartNode {
    async fn execute(
        &self,
        node: &NodeInfo,
        state: &Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        let config = match Self::parse_config(node) {
            Ok(c) => c,
            Err(message) => return ExecutionResult::error(message, None),
        };

        // Validate every required input and report all misses at once.
        let missing: Vec<&str> = config
            .required_inputs
            .iter()
            .filter(|name| {
                match ctx.initial_data.get(name.as_str()) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(_) => false,
                }
            })
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return ExecutionResult::error(
                format!(
                    "start node '{}': missing required input(s): {}",
                    node.id,
                    missing.join(", ")
                ),
                Some(json!({ "missing": missing })),
            );
        }

        let mut updates = config.defaults.clone();
        let mut mapped_fields: Vec<String> = Vec::new();

        match &config.input_mapping {
            Some(mapping) => {
                let scope = scope_with_input(state, &ctx.initial_data);
                for (target, source) in mapping {
                    match source {
                        Value::String(s) if s.starts_with('$') => {
                            // Unresolvable sources are skipped, not fatal.
                            if let Some(resolved) = resolve_variable(s, &scope) {
                                updates.insert(target.clone(), resolved);
                                mapped_fields.push(target.clone());
                            }
                        }
                        literal => {
                            updates.insert(target.clone(), literal.clone());
                            mapped_fields.push(target.clone());
                        }
                    }
                }
            }
            None => {
                // Zero-configuration default: whole-input passthrough.
                if let Value::Object(input) = &ctx.initial_data {
                    for (key, value) in input {
                        updates.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        let input_fields: Vec<String> = ctx
            .initial_data
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();

        debug!(
            component = "start",
            node_id = %node.id,
            mapped = mapped_fields.len(),
            "initialized run state"
        );

        ExecutionResult::success(json!({
            "initialized": true,
            "timestamp": Utc::now().to_rfc3339(),
            "inputFields": input_fields,
            "mappedFields": mapped_fields,
        }))
        .with_state_updates(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx(initial_data: Value) -> ExecutionContext {
        ExecutionContext {
            workflow_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            initial_data,
        }
    }

    fn node(config: Value) -> NodeInfo {
        NodeInfo {
            id: "start_1".into(),
            name: "Start".into(),
            config,
        }
    }

    #[tokio::test]
    async fn missing_required_inputs_are_all_reported() {
        let node = node(json!({ "requiredInputs": ["a", "b", "c"] }));
        let ctx = ctx(json!({ "b": "", "c": null }));

        let result = StartNode.execute(&node, &json!({}), &ctx).await;
        assert!(!result.success);
        let failure = result.error.expect("error is populated");
        assert!(failure.message.contains("start_1"));
        assert!(failure.message.contains('a'));
        assert!(failure.message.contains('b'));
        assert!(failure.message.contains('c'));
    }

    #[tokio::test]
    async fn passthrough_without_mapping() {
        let node = node(Value::Null);
        let ctx = ctx(json!({ "y": 5 }));

        let result = StartNode.execute(&node, &json!({}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.state_updates, Some(json!({ "y": 5 }).as_object().unwrap().clone()));
        assert_eq!(result.output["initialized"], json!(true));
        assert_eq!(result.output["inputFields"], json!(["y"]));
    }

    #[tokio::test]
    async fn mapping_resolves_paths_and_literals() {
        let node = node(json!({
            "inputMapping": {
                "x": "$.input.y",
                "mode": "fast",
                "gone": "$.input.missing"
            }
        }));
        let ctx = ctx(json!({ "y": 5 }));

        let result = StartNode.execute(&node, &json!({}), &ctx).await;
        assert!(result.success);
        let updates = result.state_updates.expect("delta present");
        assert_eq!(updates.get("x"), Some(&json!(5)));
        assert_eq!(updates.get("mode"), Some(&json!("fast")));
        // Unresolvable sources are skipped, not fatal.
        assert!(!updates.contains_key("gone"));
    }

    #[tokio::test]
    async fn mapped_values_override_defaults() {
        let node = node(json!({
            "defaults": { "x": 1, "keep": true },
            "inputMapping": { "x": "$.input.y" }
        }));
        let ctx = ctx(json!({ "y": 9 }));

        let result = StartNode.execute(&node, &json!({}), &ctx).await;
        let updates = result.state_updates.expect("delta present");
        assert_eq!(updates.get("x"), Some(&json!(9)));
        assert_eq!(updates.get("keep"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn empty_delta_is_omitted() {
        let node = node(json!({ "inputMapping": {} }));
        let ctx = ctx(json!({}));

        let result = StartNode.execute(&node, &json!({}), &ctx).await;
        assert!(result.success);
        assert_eq!(result.state_updates, None);
    }

    #[tokio::test]
    async fn execution_is_idempotent() {
        let node = node(json!({ "inputMapping": { "x": "$.input.y" } }));
        let ctx = ctx(json!({ "y": 5 }));
        let state = json!({});

        let first = StartNode.execute(&node, &state, &ctx).await;
        let second = StartNode.execute(&node, &state, &ctx).await;
        // Timestamps differ; everything else must be identical.
        assert_eq!(first.state_updates, second.state_updates);
        assert_eq!(first.branch, second.branch);
        assert_eq!(first.success, second.success);
        assert_eq!(first.output["mappedFields"], second.output["mappedFields"]);
    }
}
