//! `engine` crate — domain models, graph validation, and the scheduler.

pub mod dag;
pub mod error;
pub mod models;
pub mod registry;
pub mod run;
pub mod scheduler;

pub use dag::validate_dag;
pub use error::EngineError;
pub use models::{Edge, ErrorPolicy, NodeDefinition, Workflow};
pub use registry::{default_registry, NodeRegistry};
pub use run::{NodeRunRecord, RunRecord, RunStatus};
pub use scheduler::{Scheduler, SchedulerConfig};
