//! Structural error type for the data model layer.
//!
//! This is deliberately narrow: it covers only malformed-workflow failures
//! raised by [`crate::Workflow::validate`]. The richer five-kind error
//! taxonomy from §7 (user-code, policy, external I/O, data-shape) lives in
//! `wireflow-core`, one layer up, where executors actually run.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
}
