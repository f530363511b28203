//! Evaluation error type shared by the resolver and the expression evaluator.

use thiserror::Error;

/// Errors raised while evaluating a decision expression.
///
/// These never cross the executor boundary: the decision executor catches
/// them and degrades to the `"false"` branch with the message attached.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The raw expression contained a forbidden pattern and was rejected
    /// before evaluation.
    #[error("expression rejected: forbidden pattern '{0}'")]
    Forbidden(String),

    /// The expression text could not be tokenized or parsed.
    #[error("expression parse error: {0}")]
    Parse(String),
}
