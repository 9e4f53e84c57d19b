//! Result assembler (§4.1 item 6, §6): turns a [`crate::scheduler::RunResult`]
//! into the wire response shape, coercing byte-strings to base64 at the
//! boundary and mapping the first node failure to an overall error.

use serde::Serialize;
use wireflow_types::{IdentifiedOutcome, OutcomeStatus};

use crate::scheduler::RunResult;

/// One node's outcome as it appears on the wire: `output` is a
/// `serde_json::Value` produced via [`wireflow_types::Value::to_json`], the
/// one place byte-strings become base64 (§3 "Value").
#[derive(Debug, Serialize)]
pub struct WireOutcome {
    pub id: String,
    pub status: &'static str,
    pub output: serde_json::Value,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endloop_node_id: Option<String>,
}

impl From<&IdentifiedOutcome> for WireOutcome {
    fn from(identified: &IdentifiedOutcome) -> Self {
        Self {
            id: identified.id.clone(),
            status: match identified.outcome.status {
                OutcomeStatus::Success => "success",
                OutcomeStatus::Error => "error",
            },
            output: identified.outcome.output.to_json(),
            stdout: identified.outcome.stdout.clone(),
            stderr: identified.outcome.stderr.clone(),
            execution_time: identified.outcome.execution_time,
            error: identified.outcome.error.clone(),
            endloop_node_id: identified.outcome.endloop_node_id.clone(),
        }
    }
}

/// `POST /run`'s response body (§6).
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: &'static str,
    pub nodes: Vec<WireOutcome>,
    pub total_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build the response from a completed run plus the true wall-clock
/// elapsed time from request start (§9 open question: the source computes
/// this as the difference of two same-instant `time.time()` calls, which
/// always yields zero — this implementation reports the real elapsed time
/// instead).
pub fn assemble(result: &RunResult, elapsed_secs: f64) -> RunResponse {
    let nodes: Vec<WireOutcome> = result.outcomes.iter().map(WireOutcome::from).collect();
    let status = if result.is_success() { "success" } else { "error" };
    let error = result
        .error
        .as_ref()
        .map(|(node_id, message)| format!("node '{node_id}' failed: {message}"));

    RunResponse { status, nodes, total_time: elapsed_secs, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireflow_types::{NodeOutcome, Value};

    #[test]
    fn bytes_in_output_are_base64_encoded_on_the_wire() {
        let outcome = NodeOutcome::success(Value::Bytes(vec![1, 2, 3]), 0.01);
        let identified = IdentifiedOutcome { id: "n".to_string(), outcome };
        let wire = WireOutcome::from(&identified);
        assert_eq!(wire.output, serde_json::Value::String("AQID".to_string()));
    }

    #[test]
    fn overall_error_names_the_failing_node() {
        let result = RunResult {
            outcomes: vec![IdentifiedOutcome {
                id: "bad".to_string(),
                outcome: NodeOutcome::error("boom", 0.0),
            }],
            error: Some(("bad".to_string(), "boom".to_string())),
        };
        let response = assemble(&result, 0.5);
        assert_eq!(response.status, "error");
        assert!(response.error.unwrap().contains("bad"));
    }

    #[test]
    fn success_run_has_no_error_field() {
        let result = RunResult { outcomes: Vec::new(), error: None };
        let response = assemble(&result, 0.1);
        assert_eq!(response.status, "success");
        assert!(response.error.is_none());
    }
}
