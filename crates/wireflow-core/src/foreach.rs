//! ForEach/EndLoop coordinator (§4.3, §4.5): discovers a loop's body, fans
//! iterations out (serially or with bounded concurrency), and aggregates
//! outcomes. The EndLoop executor proper — consuming the aggregation value
//! this module produces — is invoked by the top-level scheduler as part of
//! the foreach handoff (§4.1), not here.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use wireflow_types::connection::graph;
use wireflow_types::{Connection, IdMap, Node, NodeOutcome, OutcomeStatus, Value, ValueMap};

use crate::executor::NodeExecutorRegistry;
use crate::runtime::RuntimeConfig;
use crate::subworkflow::{self, NodeExecution};

const DEFAULT_ITEMS_KEY: &str = "items";

/// One iteration's record (§4.3 "Iteration outcome").
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub item: Value,
    pub output: Value,
    pub status: OutcomeStatus,
    pub error: Option<String>,
    pub node_executions: Vec<NodeExecution>,
}

impl IterationOutcome {
    fn to_value(&self) -> Value {
        let mut m = ValueMap::new();
        m.insert("item".to_string(), self.item.clone());
        m.insert("output".to_string(), self.output.clone());
        m.insert(
            "status".to_string(),
            Value::String(match self.status {
                OutcomeStatus::Success => "success".to_string(),
                OutcomeStatus::Error => "error".to_string(),
            }),
        );
        m.insert(
            "error".to_string(),
            self.error.clone().map(Value::String).unwrap_or(Value::Null),
        );
        let executions: Vec<Value> = self
            .node_executions
            .iter()
            .map(|e| {
                let mut em = ValueMap::new();
                em.insert("node_id".to_string(), Value::String(e.node_id.clone()));
                em.insert("status".to_string(), Value::String(match e.outcome.status {
                    OutcomeStatus::Success => "success".to_string(),
                    OutcomeStatus::Error => "error".to_string(),
                }));
                em.insert("output".to_string(), e.outcome.output.clone());
                Value::Object(em)
            })
            .collect();
        m.insert("node_executions".to_string(), Value::Array(executions));
        Value::Object(m)
    }
}

/// Resolve the sequence to iterate over (§4.3 "Iteration set"). `Err` means
/// a hard structural failure (non-iterable input); `Ok(vec![])` is a valid
/// empty set.
fn resolve_iteration_set(input: &Value, node: &Node, items_key: &str) -> Result<Vec<Value>, String> {
    if let Value::Array(items) = input {
        return Ok(items.clone());
    }
    if let Some(map) = input.as_map() {
        if let Some(Value::Array(items)) = map.get(items_key) {
            return Ok(items.clone());
        }
    }
    if let Some(Value::Array(items)) = node.get_config("items") {
        return Ok(items.clone());
    }
    if input.is_null() || input.as_map().map(|m| m.is_empty()).unwrap_or(false) {
        return Ok(Vec::new());
    }
    Err(format!(
        "foreach input is not iterable: expected a sequence or a mapping with an '{items_key}' sequence"
    ))
}

/// Build the per-iteration input for one item (§4.3 "Per-iteration input
/// shaping"): when both `item` and the loop input are mappings, add
/// `_workflow_context` carrying the original loop input.
fn shape_iteration_input(item: &Value, loop_input: &Value) -> Value {
    match (item.as_map(), loop_input.as_map()) {
        (Some(item_map), Some(_)) => {
            let mut shaped = item_map.clone();
            shaped.insert("_workflow_context".to_string(), loop_input.clone());
            Value::Object(shaped)
        }
        _ => item.clone(),
    }
}

async fn run_one_iteration(
    item: Value,
    loop_input: Value,
    body: Arc<Vec<String>>,
    nodes: Arc<IdMap<Node>>,
    connections: Arc<IdMap<Connection>>,
    registry: Arc<NodeExecutorRegistry>,
    config: Arc<RuntimeConfig>,
) -> IterationOutcome {
    let seed = shape_iteration_input(&item, &loop_input);
    let result = subworkflow::run_segment(&body, seed, &nodes, &connections, &registry, &config).await;

    match result.error {
        Some((_node_id, message)) => IterationOutcome {
            item,
            output: result.output,
            status: OutcomeStatus::Error,
            error: Some(message),
            node_executions: result.executions,
        },
        None => IterationOutcome {
            item,
            output: result.output,
            status: OutcomeStatus::Success,
            error: None,
            node_executions: result.executions,
        },
    }
}

/// Run a foreach node to completion: discover its body, resolve the
/// iteration set, dispatch every iteration (serial or bounded-parallel),
/// and aggregate. Returns the foreach's own [`NodeOutcome`], carrying
/// `endloop_node_id` when the body discovery found a terminator (§4.1
/// "Foreach handoff" reads this field to finalise).
pub async fn run_foreach(
    foreach_id: &str,
    node: &Node,
    input: &Value,
    nodes: &IdMap<Node>,
    connections: &IdMap<Connection>,
    registry: &Arc<NodeExecutorRegistry>,
    config: &RuntimeConfig,
) -> NodeOutcome {
    let started = std::time::Instant::now();
    let (body, endloop_id) = graph::discover_foreach_body(nodes, connections, foreach_id);

    let items_key = node
        .get_config("items_key")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_ITEMS_KEY);

    let items = match resolve_iteration_set(input, node, items_key) {
        Ok(items) => items,
        Err(message) => return NodeOutcome::error(message, started.elapsed().as_secs_f64()),
    };

    let has_endloop = endloop_id.is_some();

    if items.is_empty() {
        let aggregation = build_aggregation(&[], &items, has_endloop);
        let mut outcome = NodeOutcome::success(aggregation, started.elapsed().as_secs_f64());
        if let Some(id) = endloop_id {
            outcome = outcome.with_endloop(id);
        }
        return outcome;
    }

    let execution_mode = node
        .get_config("execution_mode")
        .or_else(|| node.get_config("mode"))
        .and_then(Value::as_str)
        .unwrap_or("serial");
    let max_concurrency = node
        .get_config("max_concurrency")
        .and_then(|v| match v {
            Value::Integer(n) => Some(*n as usize),
            Value::Float(f) => Some(*f as usize),
            _ => None,
        })
        .unwrap_or(config.max_concurrency)
        .max(1);

    let body = Arc::new(body);
    let nodes_arc = Arc::new(nodes.clone());
    let connections_arc = Arc::new(connections.clone());
    let registry_arc = registry.clone();
    let config_arc = Arc::new(config.clone());

    let outcomes = if execution_mode == "parallel" {
        // Bounded concurrency via `buffer_unordered` rather than a
        // semaphore + `tokio::spawn` pool: iterations complete out of
        // order, so each is tagged with its input index and the results
        // are sorted back into input order afterward (§5 "Ordering
        // guarantees").
        let tagged = stream::iter(items.iter().cloned().enumerate().map(|(index, item)| {
            let body = body.clone();
            let nodes_arc = nodes_arc.clone();
            let connections_arc = connections_arc.clone();
            let registry_arc = registry_arc.clone();
            let config_arc = config_arc.clone();
            let loop_input = input.clone();
            async move {
                let outcome = run_one_iteration(
                    item, loop_input, body, nodes_arc, connections_arc, registry_arc, config_arc,
                )
                .await;
                (index, outcome)
            }
        }));
        let mut collected: Vec<(usize, IterationOutcome)> =
            tagged.buffer_unordered(max_concurrency).collect().await;
        collected.sort_by_key(|(index, _)| *index);
        collected.into_iter().map(|(_, outcome)| outcome).collect()
    } else {
        let mut collected = Vec::with_capacity(items.len());
        for item in items.iter().cloned() {
            let outcome = run_one_iteration(
                item,
                input.clone(),
                body.clone(),
                nodes_arc.clone(),
                connections_arc.clone(),
                registry_arc.clone(),
                config_arc.clone(),
            )
            .await;
            collected.push(outcome);
        }
        collected
    };

    let aggregation = build_aggregation(&outcomes, &items, has_endloop);
    let mut outcome = NodeOutcome::success(aggregation, started.elapsed().as_secs_f64());
    if let Some(id) = endloop_id {
        outcome = outcome.with_endloop(id);
    }
    outcome
}

/// Build the aggregation value (§4.3 "Aggregation"). When there is no
/// endloop, `aggregated_outputs` and `items` are omitted for backward
/// compatibility with the bare foreach-output shape.
fn build_aggregation(outcomes: &[IterationOutcome], items: &[Value], has_endloop: bool) -> Value {
    let total = items.len() as i64;
    let successful = outcomes.iter().filter(|o| o.status == OutcomeStatus::Success).count() as i64;
    let failed = total - successful;

    let results: Vec<Value> = outcomes.iter().map(IterationOutcome::to_value).collect();

    let mut out = ValueMap::new();
    out.insert("results".to_string(), Value::Array(results));
    out.insert("total".to_string(), Value::Integer(total));
    out.insert("successful".to_string(), Value::Integer(successful));
    out.insert("failed".to_string(), Value::Integer(failed));

    if has_endloop {
        let aggregated_outputs: Vec<Value> = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .map(|o| o.output.clone())
            .collect();
        out.insert("aggregated_outputs".to_string(), Value::Array(aggregated_outputs));
        out.insert("items".to_string(), Value::Array(items.to_vec()));
    }

    Value::Object(out)
}

/// The EndLoop executor proper (§4.3 "EndLoop executor"): given the
/// aggregation value a foreach produced, project it down to the six fields
/// an endloop exposes. If the input is not a mapping, pass it through
/// unchanged (a foreach was never upstream, or something hand-wired the
/// endloop directly).
pub fn run_endloop(input: &Value) -> NodeOutcome {
    let started = std::time::Instant::now();
    let Some(map) = input.as_map() else {
        return NodeOutcome::success(input.clone(), started.elapsed().as_secs_f64());
    };

    let mut out = ValueMap::new();
    for key in ["results", "aggregated_outputs", "items", "total", "successful", "failed"] {
        out.insert(key.to_string(), map.get(key).cloned().unwrap_or(Value::Null));
    }
    NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_iteration_set_reads_default_items_key() {
        let mut map = ValueMap::new();
        map.insert("items".to_string(), Value::Array(vec![Value::Integer(1), Value::Integer(2)]));
        let node = Node::new("foreach");
        let result = resolve_iteration_set(&Value::Object(map), &node, "items").unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn resolve_iteration_set_errors_on_non_iterable() {
        let node = Node::new("foreach");
        let result = resolve_iteration_set(&Value::Integer(5), &node, "items");
        assert!(result.is_err());
    }

    #[test]
    fn shape_iteration_input_adds_workflow_context_for_mapping_item() {
        let mut item = ValueMap::new();
        item.insert("x".to_string(), Value::Integer(1));
        let mut loop_input = ValueMap::new();
        loop_input.insert("items".to_string(), Value::Array(vec![]));
        let shaped = shape_iteration_input(&Value::Object(item), &Value::Object(loop_input));
        assert!(shaped.as_map().unwrap().contains_key("_workflow_context"));
    }

    #[test]
    fn shape_iteration_input_passes_non_mapping_item_verbatim() {
        let item = Value::Integer(7);
        let loop_input = Value::Array(vec![Value::Integer(7)]);
        let shaped = shape_iteration_input(&item, &loop_input);
        assert_eq!(shaped, item);
    }

    #[test]
    fn endloop_passes_through_non_mapping_input() {
        let input = Value::String("raw".to_string());
        let outcome = run_endloop(&input);
        assert_eq!(outcome.output, input);
    }

    #[tokio::test]
    async fn serial_foreach_squares_each_item() {
        let mut nodes: IdMap<Node> = IdMap::new();
        nodes.insert("fe", Node::new("foreach"));
        nodes.insert(
            "p",
            Node::new("python").with_code("def run(x):\n    return x * x"),
        );
        nodes.insert("el", Node::new("endloop"));
        let mut conns: IdMap<Connection> = IdMap::new();
        conns.insert("c1", Connection::new("fe", "p"));
        conns.insert("c2", Connection::new("p", "el"));

        let node = nodes.get("fe").unwrap().clone();
        let input = Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        let registry = Arc::new(NodeExecutorRegistry::new());
        let config = RuntimeConfig::default();

        // This exercises discovery + aggregation shape without requiring a
        // python3 interpreter: the body contains only the endloop-adjacent
        // python node, which the test environment may not be able to spawn,
        // so we assert on the structural contract instead of exact values.
        let outcome = run_foreach("fe", &node, &input, &nodes, &conns, &registry, &config).await;
        let out = outcome.output.as_map().unwrap();
        assert_eq!(out.get("total"), Some(&Value::Integer(3)));
        assert_eq!(outcome.endloop_node_id.as_deref(), Some("el"));
    }

    #[tokio::test]
    async fn empty_iteration_set_succeeds_with_zero_total() {
        let nodes: IdMap<Node> = IdMap::new();
        let conns: IdMap<Connection> = IdMap::new();
        let node = Node::new("foreach");
        let outcome = run_foreach(
            "fe",
            &node,
            &Value::Array(vec![]),
            &nodes,
            &conns,
            &Arc::new(NodeExecutorRegistry::new()),
            &RuntimeConfig::default(),
        )
        .await;
        assert!(!outcome.is_error());
        let out = outcome.output.as_map().unwrap();
        assert_eq!(out.get("total"), Some(&Value::Integer(0)));
    }
}
