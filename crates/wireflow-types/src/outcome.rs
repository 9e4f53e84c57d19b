//! The uniform record every executor produces.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Uniform record produced by every executor (§3). A ForEach outcome
/// additionally carries `endloop_node_id`, read by the scheduler to drive
/// the endloop handoff (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "endloop_node_id")]
    pub endloop_node_id: Option<String>,
}

impl NodeOutcome {
    pub fn success(output: Value, execution_time: f64) -> Self {
        Self {
            status: OutcomeStatus::Success,
            output,
            stdout: String::new(),
            stderr: String::new(),
            execution_time,
            error: None,
            endloop_node_id: None,
        }
    }

    pub fn error(message: impl Into<String>, execution_time: f64) -> Self {
        let message = message.into();
        Self {
            status: OutcomeStatus::Error,
            output: Value::Null,
            stdout: String::new(),
            stderr: message.clone(),
            execution_time,
            error: Some(message),
            endloop_node_id: None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, OutcomeStatus::Error)
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_endloop(mut self, endloop_node_id: impl Into<String>) -> Self {
        self.endloop_node_id = Some(endloop_node_id.into());
        self
    }
}

/// `NodeOutcome` plus the id of the node it belongs to — the shape returned
/// in the `/run` response's `nodes` array (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiedOutcome {
    pub id: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
}
