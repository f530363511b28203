//! `nodes` crate — the `NodeExecutor` contract and built-in node types.
//!
//! Every node type — built-in and future plugins alike — implements
//! [`NodeExecutor`]. The engine crate dispatches execution through this
//! trait object and owns the state bag; executors only ever read state and
//! hand back deltas inside an [`ExecutionResult`].

pub mod decision;
pub mod error;
pub mod expr;
pub mod mock;
pub mod result;
pub mod start;
pub mod traits;
pub mod vars;

pub use decision::DecisionNode;
pub use error::EvalError;
pub use result::{ExecutionResult, NodeFailure};
pub use start::StartNode;
pub use traits::{ExecutionContext, NodeExecutor, NodeInfo};
