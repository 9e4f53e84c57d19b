//! Sub-workflow runner (§4.2): executes a linear segment of nodes with a
//! seed input, propagating outputs locally. Used by the foreach coordinator
//! to drive one iteration's body.

use wireflow_types::{Connection, IdMap, Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutorRegistry;
use crate::runtime::RuntimeConfig;

/// The "sticky" workflow-level fields the runner re-injects into mapping
/// outputs when a node's own output doesn't set them (§4.2, §9 "Loop
/// metadata preservation"). `_workflow_context` is always carried when
/// absent; the other three are only carried when both the metadata key and
/// the producing node's output are mappings.
const STICKY_KEYS: &[&str] = &["route", "action", "priority"];

/// One node's record inside a sub-workflow run: enough to build an
/// iteration's `node_executions` (§4.3 "Iteration outcome").
#[derive(Debug, Clone)]
pub struct NodeExecution {
    pub node_id: String,
    pub outcome: NodeOutcome,
}

/// Result of running a sub-workflow segment: the per-node executions in
/// order, the final output (last executed node's output, or the seed if
/// the segment was empty), and the first error encountered, if any.
pub struct SubWorkflowResult {
    pub executions: Vec<NodeExecution>,
    pub output: Value,
    pub error: Option<(String, String)>,
}

/// Copy `_workflow_context` into `output` when absent, and copy `route`,
/// `action`, `priority` from `input` into `output` when absent in `output`
/// (§4.2 step 4).
fn preserve_sticky_metadata(input: &Value, output: &mut Value) {
    let (Some(input_map), Some(output_map)) = (input.as_map(), output.as_map_mut()) else {
        return;
    };
    if !output_map.contains_key("_workflow_context") {
        if let Some(ctx) = input_map.get("_workflow_context") {
            output_map.insert("_workflow_context".to_string(), ctx.clone());
        }
    }
    for key in STICKY_KEYS {
        if !output_map.contains_key(*key) {
            if let Some(v) = input_map.get(*key) {
                output_map.insert((*key).to_string(), v.clone());
            }
        }
    }
}

/// Run `body` (an ordered list of node ids, typically a foreach body with
/// its endloop optionally appended) starting from `seed`, against the full
/// node/connection maps so predecessor lookups still work inside the
/// segment.
///
/// `endloop` nodes dispatch to the pass-through executor here (§4.2:
/// "`endloop` is handled as a pass-through ... aggregation has already
/// occurred"), and `foreach` is never expected inside a body in this
/// version.
pub async fn run_segment(
    body: &[String],
    seed: Value,
    nodes: &IdMap<Node>,
    connections: &IdMap<Connection>,
    registry: &NodeExecutorRegistry,
    config: &RuntimeConfig,
) -> SubWorkflowResult {
    let mut local_outputs: ValueMap = ValueMap::new();
    let mut executions = Vec::with_capacity(body.len());
    let mut current_input = seed.clone();
    let mut error = None;

    for node_id in body {
        let Some(node) = nodes.get(node_id) else {
            error = Some((node_id.clone(), "node referenced in body not found".to_string()));
            break;
        };

        let input = resolve_input(node_id, connections, &local_outputs, &current_input);

        let outcome = if node.skip_during_execution {
            NodeOutcome::success(input.clone(), 0.0)
        } else {
            match registry.get(&node.node_type) {
                Some(executor) => executor.execute(node, &input, config).await,
                None => NodeOutcome::error(
                    format!("unknown node type: {}", node.node_type),
                    0.0,
                ),
            }
        };

        let mut output = outcome.output.clone();
        preserve_sticky_metadata(&input, &mut output);

        let mut recorded = outcome.clone();
        recorded.output = output.clone();

        let is_error = recorded.is_error();
        local_outputs.insert(node_id.clone(), output.clone());
        current_input = output;
        executions.push(NodeExecution {
            node_id: node_id.clone(),
            outcome: recorded.clone(),
        });

        if is_error {
            error = Some((
                node_id.clone(),
                recorded.error.clone().unwrap_or_else(|| "node failed".to_string()),
            ));
            break;
        }
    }

    let output = executions
        .last()
        .map(|e| e.outcome.output.clone())
        .unwrap_or(seed);

    SubWorkflowResult { executions, output, error }
}

/// Resolve a node's input within the segment: prefer a predecessor whose
/// output is already recorded locally; otherwise fall back to the running
/// `current_input` (§4.2 step 1).
fn resolve_input(
    node_id: &str,
    connections: &IdMap<Connection>,
    local_outputs: &ValueMap,
    current_input: &Value,
) -> Value {
    for (_, conn) in connections.iter() {
        if conn.target == node_id {
            if let Some(v) = local_outputs.get(&conn.source) {
                return v.clone();
            }
        }
    }
    current_input.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireflow_types::Connection;

    fn registry() -> NodeExecutorRegistry {
        NodeExecutorRegistry::new()
    }

    #[tokio::test]
    async fn empty_body_returns_seed_unchanged() {
        let nodes: IdMap<Node> = IdMap::new();
        let conns: IdMap<Connection> = IdMap::new();
        let seed = Value::String("hi".to_string());
        let result = run_segment(&[], seed.clone(), &nodes, &conns, &registry(), &RuntimeConfig::default()).await;
        assert_eq!(result.output, seed);
        assert!(result.executions.is_empty());
    }

    #[tokio::test]
    async fn end_node_passes_through_last_output() {
        let mut nodes: IdMap<Node> = IdMap::new();
        nodes.insert("e", Node::new("end"));
        let conns: IdMap<Connection> = IdMap::new();
        let seed = Value::String("payload".to_string());
        let body = vec!["e".to_string()];
        let result = run_segment(&body, seed.clone(), &nodes, &conns, &registry(), &RuntimeConfig::default()).await;
        assert_eq!(result.output, seed);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn sticky_keys_carry_through_when_absent_downstream() {
        let mut nodes: IdMap<Node> = IdMap::new();
        nodes.insert("e", Node::new("end"));
        let conns: IdMap<Connection> = IdMap::new();
        let mut seed_map = ValueMap::new();
        seed_map.insert("route".to_string(), Value::String("high".to_string()));
        seed_map.insert("payload".to_string(), Value::Integer(1));
        let seed = Value::Object(seed_map);
        let body = vec!["e".to_string()];
        let result = run_segment(&body, seed, &nodes, &conns, &registry(), &RuntimeConfig::default()).await;
        let out = result.output.as_map().unwrap();
        assert_eq!(out.get("route"), Some(&Value::String("high".to_string())));
    }

    #[tokio::test]
    async fn stops_at_first_error_and_reports_node_id() {
        let mut nodes: IdMap<Node> = IdMap::new();
        nodes.insert("bad", Node::new("nonexistent-type"));
        nodes.insert("after", Node::new("end"));
        let mut conns: IdMap<Connection> = IdMap::new();
        conns.insert("c1", Connection::new("bad", "after"));
        let body = vec!["bad".to_string(), "after".to_string()];
        let result = run_segment(&body, Value::object(), &nodes, &conns, &registry(), &RuntimeConfig::default()).await;
        assert_eq!(result.executions.len(), 1);
        let (failing_id, _msg) = result.error.expect("expected an error");
        assert_eq!(failing_id, "bad");
    }
}
