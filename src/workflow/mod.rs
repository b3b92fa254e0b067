//! Workflow orchestration
//!
//! [`Workflow`] owns one session end to end: it feeds stream messages and user
//! actions through the phase machine and executes the resulting effects with
//! the step controllers.

mod orchestrator;

pub use orchestrator::{UserAction, Workflow, WorkflowError, WorkflowInput};
