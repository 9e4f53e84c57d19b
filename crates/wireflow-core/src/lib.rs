//! # wireflow-core
//!
//! Execution engine for the node-graph workflow runner: the top-level
//! scheduler, the foreach/endloop coordinator and sub-workflow runner it
//! delegates to, placeholder substitution, and one executor per node type.
//!
//! Nothing in this crate persists workflow state between runs — every
//! public entry point takes a [`wireflow_types::Workflow`] and a
//! [`RuntimeConfig`] and returns a trace scoped to that single call.

pub mod assembler;
pub mod error;
pub mod executor;
pub mod executors;
pub mod foreach;
pub mod placeholder;
pub mod runtime;
pub mod scheduler;
pub mod subworkflow;

pub use assembler::{assemble, RunResponse, WireOutcome};
pub use error::EngineError;
pub use executor::{NodeExecutor, NodeExecutorRegistry};
pub use runtime::RuntimeConfig;
pub use scheduler::{execute_workflow, RunResult};
