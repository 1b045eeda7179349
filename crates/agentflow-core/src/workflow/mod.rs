//! The workflow engine: definitions, validation, and execution.

pub mod context;
pub mod definition;
pub mod registry;
pub mod resolve;
pub mod step;
pub mod steps;

pub use context::RunContext;
pub use definition::{WorkflowDef, WorkflowError, WorkflowStep, validate_workflow_yaml};
pub use registry::StepRegistry;
pub use step::{BoxStepKind, StepBinding, StepInstance, StepKind, StepSchema};
