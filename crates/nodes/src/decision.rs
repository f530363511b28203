//! Decision node executor — picks exactly one branch identifier for the
//! scheduler to follow.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::expr::{self, compare_order, truthy, values_equal};
use crate::traits::{ExecutionContext, NodeExecutor, NodeInfo};
use crate::vars::{resolve_variable, scope_with_input};
use crate::ExecutionResult;

/// Wire config for a decision node, keyed by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DecisionConfig {
    /// Evaluate a boolean expression; branch `"true"` or `"false"`.
    Expression { expression: String },
    /// Resolve one variable and test ordered conditions; first match wins.
    #[serde(rename_all = "camelCase")]
    Switch {
        variable: String,
        #[serde(default)]
        conditions: Vec<SwitchCondition>,
        default_branch: String,
    },
    /// Reserved for model-delegated routing; currently a deliberate stub.
    #[serde(rename_all = "camelCase")]
    Llm {
        #[serde(default)]
        default_branch: Option<String>,
    },
}

/// One entry in a switch condition list: `{ "branch": "a", "equals": 1 }`.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchCondition {
    pub branch: String,
    #[serde(flatten)]
    pub op: ConditionOp,
}

/// Structural match operators, in wire (camelCase) spelling.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    Equals(Value),
    NotEquals(Value),
    GreaterThan(Value),
    LessThan(Value),
    GreaterThanOrEqual(Value),
    LessThanOrEqual(Value),
    /// Substring test; string operand only.
    Contains(String),
    /// Regex test; a malformed pattern is a non-match, not an error.
    Matches(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
}

impl ConditionOp {
    /// Test the resolved variable value against this operator. An unresolved
    /// variable is treated as `null`.
    fn matches(&self, value: &Value) -> bool {
        use std::cmp::Ordering;
        match self {
            ConditionOp::Equals(operand) => values_equal(value, operand),
            ConditionOp::NotEquals(operand) => !values_equal(value, operand),
            ConditionOp::GreaterThan(operand) => {
                compare_order(value, operand) == Some(Ordering::Greater)
            }
            ConditionOp::LessThan(operand) => {
                compare_order(value, operand) == Some(Ordering::Less)
            }
            ConditionOp::GreaterThanOrEqual(operand) => matches!(
                compare_order(value, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ConditionOp::LessThanOrEqual(operand) => matches!(
                compare_order(value, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ConditionOp::Contains(needle) => value
                .as_str()
                .map(|s| s.contains(needle.as_str()))
                .unwrap_or(false),
            ConditionOp::Matches(pattern) => match (value.as_str(), Regex::new(pattern)) {
                (Some(s), Ok(re)) => re.is_match(s),
                _ => false,
            },
            ConditionOp::In(options) => options.iter().any(|o| values_equal(value, o)),
            ConditionOp::NotIn(options) => !options.iter().any(|o| values_equal(value, o)),
        }
    }
}

/// The `decision` node type.
#[derive(Debug, Default)]
pub struct DecisionNode;

#[async_trait]
impl NodeExecutor for DecisionNode {
    async fn execute(
        &self,
        node: &NodeInfo,
        state: &Value,
        ctx: &ExecutionContext,
    ) -> ExecutionResult {
        // Unknown `type` values (and otherwise malformed configs) are a hard
        // error: silently picking a branch would corrupt downstream routing.
        let config: DecisionConfig = match serde_json::from_value(node.config.clone()) {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::error(
                    format!("decision node '{}': invalid config: {e}", node.id),
                    None,
                );
            }
        };

        let scope = scope_with_input(state, &ctx.initial_data);

        match config {
            DecisionConfig::Expression { expression } => {
                match expr::evaluate(&expression, &scope) {
                    Ok(value) => {
                        let branch = if truthy(&value) { "true" } else { "false" };
                        debug!(
                            component = "decision",
                            node_id = %node.id,
                            branch,
                            "expression evaluated"
                        );
                        ExecutionResult::success(json!({
                            "expression": expression,
                            "result": value,
                            "branch": branch,
                        }))
                        .with_branch(branch)
                    }
                    // Evaluation errors degrade to the "false" branch; the
                    // run continues and the error stays visible in the trace.
                    Err(e) => {
                        warn!(
                            component = "decision",
                            node_id = %node.id,
                            error = %e,
                            "expression evaluation failed, taking 'false' branch"
                        );
                        ExecutionResult::success(json!({
                            "expression": expression,
                            "branch": "false",
                        }))
                        .with_branch("false")
                        .with_error(
                            format!("decision node '{}': {e}", node.id),
                            None,
                        )
                    }
                }
            }

            DecisionConfig::Switch {
                variable,
                conditions,
                default_branch,
            } => {
                let value = resolve_variable(&variable, &scope).unwrap_or(Value::Null);

                for condition in &conditions {
                    if condition.op.matches(&value) {
                        debug!(
                            component = "decision",
                            node_id = %node.id,
                            branch = %condition.branch,
                            "switch condition matched"
                        );
                        return ExecutionResult::success(json!({
                            "variable": variable,
                            "value": value,
                            "branch": condition.branch,
                            "matched": true,
                        }))
                        .with_branch(condition.branch.clone());
                    }
                }

                debug!(
                    component = "decision",
                    node_id = %node.id,
                    branch = %default_branch,
                    "no switch condition matched, taking default branch"
                );
                ExecutionResult::success(json!({
                    "variable": variable,
                    "value": value,
                    "branch": default_branch,
                    "matched": false,
                }))
                .with_branch(default_branch)
            }

            DecisionConfig::Llm { default_branch } => {
                let branch = default_branch.unwrap_or_else(|| "default".to_string());
                warn!(
                    component = "decision",
                    node_id = %node.id,
                    branch = %branch,
                    "llm routing is not implemented, taking the default branch"
                );
                ExecutionResult::success(json!({
                    "reason": "llm routing is not implemented; returning the default branch",
                    "branch": branch,
                }))
                .with_branch(branch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            workflow_id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            initial_data: json!({}),
        }
    }

    fn node(config: Value) -> NodeInfo {
        NodeInfo {
            id: "decide_1".into(),
            name: "Decide".into(),
            config,
        }
    }

    #[tokio::test]
    async fn expression_branches_on_array_length() {
        let node = node(json!({
            "type": "expression",
            "expression": "$.data.results.length > 0"
        }));

        let empty = json!({ "data": { "results": [] } });
        let result = DecisionNode.execute(&node, &empty, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("false"));
        assert!(result.success);

        let nonempty = json!({ "data": { "results": [1] } });
        let result = DecisionNode.execute(&node, &nonempty, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("true"));
    }

    #[tokio::test]
    async fn rejected_expression_degrades_to_false_branch() {
        let node = node(json!({
            "type": "expression",
            "expression": "process.exit()"
        }));

        let result = DecisionNode.execute(&node, &json!({}), &ctx()).await;
        assert!(result.success, "run must not abort");
        assert_eq!(result.branch.as_deref(), Some("false"));
        let failure = result.error.expect("error field is populated");
        assert!(failure.message.contains("decide_1"));
    }

    #[tokio::test]
    async fn semicolon_expression_degrades_to_false_branch() {
        let node = node(json!({
            "type": "expression",
            "expression": "1 == 1; 2 == 2"
        }));

        let result = DecisionNode.execute(&node, &json!({}), &ctx()).await;
        assert!(result.success);
        assert_eq!(result.branch.as_deref(), Some("false"));
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn switch_first_match_wins() {
        let node = node(json!({
            "type": "switch",
            "variable": "$.n",
            "conditions": [
                { "branch": "a", "equals": 1 },
                { "branch": "b", "greaterThan": 0 }
            ],
            "defaultBranch": "other"
        }));

        let result = DecisionNode.execute(&node, &json!({ "n": 1 }), &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("a"));
        assert_eq!(result.output["matched"], json!(true));
    }

    #[tokio::test]
    async fn switch_unresolved_variable_takes_default() {
        let node = node(json!({
            "type": "switch",
            "variable": "$.missing",
            "conditions": [
                { "branch": "a", "equals": 1 },
                { "branch": "b", "greaterThan": 0 }
            ],
            "defaultBranch": "fallback"
        }));

        let result = DecisionNode.execute(&node, &json!({}), &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("fallback"));
        assert_eq!(result.output["matched"], json!(false));
    }

    #[tokio::test]
    async fn switch_operators() {
        let state = json!({ "s": "hello world", "n": 5, "tag": "beta" });

        let contains = node(json!({
            "type": "switch",
            "variable": "$.s",
            "conditions": [{ "branch": "hit", "contains": "world" }],
            "defaultBranch": "miss"
        }));
        let result = DecisionNode.execute(&contains, &state, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("hit"));

        let matches = node(json!({
            "type": "switch",
            "variable": "$.s",
            "conditions": [{ "branch": "hit", "matches": "^hello" }],
            "defaultBranch": "miss"
        }));
        let result = DecisionNode.execute(&matches, &state, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("hit"));

        let membership = node(json!({
            "type": "switch",
            "variable": "$.tag",
            "conditions": [{ "branch": "hit", "in": ["alpha", "beta"] }],
            "defaultBranch": "miss"
        }));
        let result = DecisionNode.execute(&membership, &state, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("hit"));

        let bounds = node(json!({
            "type": "switch",
            "variable": "$.n",
            "conditions": [
                { "branch": "low", "lessThan": 5 },
                { "branch": "exact", "lessThanOrEqual": 5 }
            ],
            "defaultBranch": "high"
        }));
        let result = DecisionNode.execute(&bounds, &state, &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("exact"));
    }

    #[tokio::test]
    async fn malformed_regex_is_a_non_match() {
        let node = node(json!({
            "type": "switch",
            "variable": "$.s",
            "conditions": [{ "branch": "hit", "matches": "([unclosed" }],
            "defaultBranch": "miss"
        }));

        let result = DecisionNode
            .execute(&node, &json!({ "s": "anything" }), &ctx())
            .await;
        assert!(result.success);
        assert_eq!(result.branch.as_deref(), Some("miss"));
    }

    #[tokio::test]
    async fn llm_type_is_a_stub_returning_default() {
        let node = node(json!({ "type": "llm", "defaultBranch": "route_a" }));
        let result = DecisionNode.execute(&node, &json!({}), &ctx()).await;
        assert!(result.success);
        assert_eq!(result.branch.as_deref(), Some("route_a"));
        assert!(result.output["reason"].is_string());

        let bare = NodeInfo {
            id: "decide_2".into(),
            name: "Decide".into(),
            config: json!({ "type": "llm" }),
        };
        let result = DecisionNode.execute(&bare, &json!({}), &ctx()).await;
        assert_eq!(result.branch.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn unknown_type_is_a_hard_error() {
        let node = node(json!({ "type": "quantum" }));
        let result = DecisionNode.execute(&node, &json!({}), &ctx()).await;
        assert!(!result.success);
        assert!(result.error.expect("error").message.contains("decide_1"));
    }

    #[tokio::test]
    async fn execution_is_idempotent() {
        let node = node(json!({
            "type": "switch",
            "variable": "$.n",
            "conditions": [{ "branch": "a", "equals": 1 }],
            "defaultBranch": "d"
        }));
        let state = json!({ "n": 1 });
        let c = ctx();

        let first = DecisionNode.execute(&node, &state, &c).await;
        let second = DecisionNode.execute(&node, &state, &c).await;
        assert_eq!(first, second);
    }
}
