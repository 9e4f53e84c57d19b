//! Engine-level error taxonomy (§7): five kinds, each its own variant
//! family, so callers can match on cause instead of parsing messages. Every
//! executor still collapses its own `EngineError` into an error-status
//! [`wireflow_types::NodeOutcome`] before it crosses a node boundary — this
//! type never escapes the engine to a client.

use thiserror::Error;
use wireflow_types::WorkflowError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed workflow, unknown node type, non-iterable foreach input.
    #[error("structural error: {0}")]
    Structural(String),

    /// Inline-script compilation/runtime failure, SQL parse/execution error.
    #[error("user code error: {0}")]
    UserCode(String),

    /// Path escapes the safe root, ollama host not allow-listed, missing
    /// API key, unsupported extension loading.
    #[error("policy error: {0}")]
    Policy(String),

    /// HTTP non-2xx/timeout/DNS, database lock, LLM provider error.
    #[error("external I/O error: {0}")]
    ExternalIo(String),

    /// JSON-viewer content_key missing, embedding model unavailable.
    #[error("data shape error: {0}")]
    DataShape(String),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl EngineError {
    /// One-line message used as `NodeOutcome.error`.
    pub fn message(&self) -> String {
        self.to_string()
    }
}
