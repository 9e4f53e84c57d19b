//! Top-level scheduler (§4.1): drives one workflow to completion, resolving
//! each node's input from its predecessors, masking foreach bodies, and
//! collecting per-node outcomes in execution order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use wireflow_types::connection::graph;
use wireflow_types::{Connection, IdMap, IdentifiedOutcome, Node, NodeOutcome, Value, Workflow};

use crate::executor::NodeExecutorRegistry;
use crate::foreach;
use crate::runtime::RuntimeConfig;

/// The result of driving one workflow to completion: every outcome
/// recorded, in the order it was recorded, plus the overall status.
pub struct RunResult {
    pub outcomes: Vec<IdentifiedOutcome>,
    /// `(failing_node_id, message)` of the first node whose outcome was
    /// `error`, if the run failed (§4.1 "Failure policy").
    pub error: Option<(String, String)>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Compute the set of node ids masked by some foreach's body (§4.1
/// "Foreach-body masking"). A node may be masked by more than one foreach
/// in pathological graphs; membership, not count, is all that matters.
fn compute_masked_set(nodes: &IdMap<Node>, connections: &IdMap<Connection>) -> HashSet<String> {
    let mut masked = HashSet::new();
    for (id, node) in nodes.iter() {
        if node.node_type == "foreach" {
            let (body, _endloop) = graph::discover_foreach_body(nodes, connections, id);
            masked.extend(body);
        }
    }
    masked
}

/// Resolve node `node_id`'s input from its predecessors' recorded outputs
/// (§4.1 "Input resolution for a node N").
fn resolve_input(
    node_id: &str,
    node_type: &str,
    connections: &IdMap<Connection>,
    outputs: &HashMap<String, Value>,
) -> Value {
    let predecessors = graph::parents(connections, node_id);
    let available: Vec<&String> = predecessors.iter().filter(|p| outputs.contains_key(*p)).collect();

    if available.is_empty() {
        return Value::object();
    }

    if node_type == "foreach" {
        if let Some(preferred) = available.iter().find(|p| {
            outputs
                .get(**p)
                .and_then(Value::as_map)
                .map(|m| m.contains_key("items"))
                .unwrap_or(false)
        }) {
            return outputs[*preferred].clone();
        }
    }

    outputs[available[0]].clone()
}

/// Drive `workflow` to completion against `registry`/`config`. Structural
/// validation failures (dangling connections, empty graph) short-circuit
/// with an empty outcome list rather than panicking or rejecting the
/// request — the HTTP surface still returns 200 (§7 "User-visible
/// behaviour").
pub async fn execute_workflow(
    workflow: &Workflow,
    registry: &Arc<NodeExecutorRegistry>,
    config: &RuntimeConfig,
) -> RunResult {
    if let Err(e) = workflow.validate() {
        return RunResult {
            outcomes: Vec::new(),
            error: Some(("<workflow>".to_string(), e.to_string())),
        };
    }

    let nodes = &workflow.nodes;
    let connections = &workflow.connections;
    let order = graph::topological_order(nodes, connections);
    let masked = compute_masked_set(nodes, connections);

    let mut outputs: HashMap<String, Value> = HashMap::new();
    let mut trace: Vec<IdentifiedOutcome> = Vec::new();
    let mut failure: Option<(String, String)> = None;

    for node_id in &order {
        if outputs.contains_key(node_id) {
            // Already recorded, e.g. an endloop finalised during its
            // foreach's handoff earlier in this same sweep (§4.1).
            continue;
        }
        if masked.contains(node_id) {
            debug!(node_id, "skipping node masked by a foreach body");
            continue;
        }

        let Some(node) = nodes.get(node_id) else { continue };
        let input = resolve_input(node_id, &node.node_type, connections, &outputs);

        let mut outcome = dispatch(node_id, node, &input, nodes, connections, registry, config).await;

        outputs.insert(node_id.clone(), outcome.output.clone());
        let is_error = outcome.is_error();
        if is_error {
            warn!(node_id, error = outcome.error.as_deref(), "node failed");
            trace.push(IdentifiedOutcome { id: node_id.clone(), outcome: outcome.clone() });
            failure = Some((node_id.clone(), outcome.error.clone().unwrap_or_else(|| "node failed".to_string())));
            break;
        }

        // Foreach handoff (§4.1): drive the endloop immediately, record it
        // under its own id, and note the handoff in the foreach outcome's
        // own stdout before that outcome is pushed.
        if let Some(endloop_id) = outcome.endloop_node_id.clone() {
            if nodes.contains(&endloop_id) && !outputs.contains_key(&endloop_id) {
                let endloop_outcome = foreach::run_endloop(&outcome.output);
                outcome.stdout = if outcome.stdout.is_empty() {
                    format!("handed off to endloop '{endloop_id}'")
                } else {
                    format!("{}\nhanded off to endloop '{endloop_id}'", outcome.stdout)
                };
                trace.push(IdentifiedOutcome { id: node_id.clone(), outcome: outcome.clone() });

                outputs.insert(endloop_id.clone(), endloop_outcome.output.clone());
                let endloop_is_error = endloop_outcome.is_error();
                trace.push(IdentifiedOutcome { id: endloop_id.clone(), outcome: endloop_outcome.clone() });
                if endloop_is_error {
                    failure = Some((
                        endloop_id.clone(),
                        endloop_outcome.error.clone().unwrap_or_else(|| "endloop failed".to_string()),
                    ));
                    break;
                }
                continue;
            }
        }

        trace.push(IdentifiedOutcome { id: node_id.clone(), outcome: outcome.clone() });
    }

    RunResult { outcomes: trace, error: failure }
}

async fn dispatch(
    node_id: &str,
    node: &Node,
    input: &Value,
    nodes: &IdMap<Node>,
    connections: &IdMap<Connection>,
    registry: &Arc<NodeExecutorRegistry>,
    config: &RuntimeConfig,
) -> NodeOutcome {
    let started = Instant::now();

    if node.skip_during_execution {
        return NodeOutcome::success(input.clone(), started.elapsed().as_secs_f64());
    }

    if node.node_type == "foreach" {
        return foreach::run_foreach(node_id, node, input, nodes, connections, registry, config).await;
    }

    match registry.get(&node.node_type) {
        Some(executor) => executor.execute(node, input, config).await,
        None => NodeOutcome::error(
            format!("unknown node type: {}", node.node_type),
            started.elapsed().as_secs_f64(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireflow_types::Connection;

    fn registry() -> Arc<NodeExecutorRegistry> {
        Arc::new(NodeExecutorRegistry::new())
    }

    #[tokio::test]
    async fn linear_pass_through() {
        let mut wf = Workflow::new();
        wf.add_node("s", Node::new("start"));
        wf.add_node(
            "p",
            Node::new("python").with_code("def run(x):\n    return {'n': x.get('message', '')}"),
        );
        wf.add_node("e", Node::new("end"));
        wf.connect("c1", "s", "p");
        wf.connect("c2", "p", "e");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert!(result.is_success());
        assert_eq!(result.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn skipped_node_output_equals_input() {
        let mut wf = Workflow::new();
        wf.add_node("s", Node::new("start"));
        let mut skipped = Node::new("python").with_code("this is not valid python at all {{{");
        skipped.skip_during_execution = true;
        wf.add_node("mid", skipped);
        wf.add_node("e", Node::new("end"));
        wf.connect("c1", "s", "mid");
        wf.connect("c2", "mid", "e");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert!(result.is_success());
        let mid_outcome = result.outcomes.iter().find(|o| o.id == "mid").unwrap();
        let start_outcome = result.outcomes.iter().find(|o| o.id == "s").unwrap();
        assert_eq!(mid_outcome.outcome.output, start_outcome.outcome.output);
    }

    #[tokio::test]
    async fn masked_nodes_are_never_dispatched_at_top_level() {
        let mut wf = Workflow::new();
        wf.add_node("fe", Node::new("foreach"));
        wf.add_node("body", Node::new("unknown-type-that-would-error"));
        wf.add_node("el", Node::new("endloop"));
        wf.connect("c1", "fe", "body");
        wf.connect("c2", "body", "el");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert!(!result.outcomes.iter().any(|o| o.id == "body"));
    }

    #[tokio::test]
    async fn foreach_outcome_stdout_notes_the_endloop_handoff() {
        let mut wf = Workflow::new();
        wf.add_node("fe", Node::new("foreach"));
        wf.add_node("el", Node::new("endloop"));
        wf.connect("c1", "fe", "el");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert!(result.is_success());
        let foreach_outcome = result.outcomes.iter().find(|o| o.id == "fe").unwrap();
        assert!(foreach_outcome.outcome.stdout.contains("handed off to endloop 'el'"));
    }

    #[tokio::test]
    async fn cyclic_graph_executes_each_node_once_without_crashing() {
        let mut wf = Workflow::new();
        wf.add_node("a", Node::new("end"));
        wf.add_node("b", Node::new("end"));
        wf.connect("c1", "a", "b");
        wf.connect("c2", "b", "a");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert_eq!(result.outcomes.len(), 2);
    }

    #[tokio::test]
    async fn stops_at_first_error_and_identifies_failing_node() {
        let mut wf = Workflow::new();
        wf.add_node("s", Node::new("start"));
        wf.add_node("bad", Node::new("not-a-real-type"));
        wf.add_node("e", Node::new("end"));
        wf.connect("c1", "s", "bad");
        wf.connect("c2", "bad", "e");

        let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
        assert!(!result.is_success());
        let (failing_id, _) = result.error.unwrap();
        assert_eq!(failing_id, "bad");
        assert!(!result.outcomes.iter().any(|o| o.id == "e"));
    }
}
