//! Flow-control markers (§4.4 "start / end / endloop").

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value};

use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn node_type(&self) -> &str {
        "start"
    }

    async fn execute(&self, _node: &Node, _input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        let mut out = wireflow_types::ValueMap::new();
        out.insert("message".to_string(), Value::String("Workflow started".to_string()));
        NodeOutcome::success(Value::Object(out), 0.0)
    }
}

pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    fn node_type(&self) -> &str {
        "end"
    }

    async fn execute(&self, _node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        NodeOutcome::success(input.clone(), 0.0)
    }
}

/// Stand-in used only when an `endloop` is reached outside a foreach
/// handoff (§4.2: "`endloop` is handled as a pass-through that simply
/// outputs its input"). The top-level scheduler normally never dispatches
/// to this: it resolves `endloop` itself as part of the foreach handoff
/// (§4.1) and records that outcome before the sweep gets here.
pub struct EndLoopPassthroughExecutor;

#[async_trait]
impl NodeExecutor for EndLoopPassthroughExecutor {
    fn node_type(&self) -> &str {
        "endloop"
    }

    async fn execute(&self, _node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        NodeOutcome::success(input.clone(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_emits_fixed_message() {
        let outcome = StartExecutor
            .execute(&Node::new("start"), &Value::object(), &RuntimeConfig::default())
            .await;
        assert_eq!(
            outcome.output.as_map().unwrap().get("message").unwrap().as_str(),
            Some("Workflow started")
        );
    }

    #[tokio::test]
    async fn end_passes_input_through_unchanged() {
        let input = Value::String("payload".to_string());
        let outcome = EndExecutor
            .execute(&Node::new("end"), &input, &RuntimeConfig::default())
            .await;
        assert_eq!(outcome.output, input);
    }
}
