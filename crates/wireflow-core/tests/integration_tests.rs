//! End-to-end tests driving `execute_workflow` against whole graphs,
//! mirroring the scenarios a client actually submits to `POST /run`.

use std::sync::Arc;

use wireflow_core::executor::NodeExecutorRegistry;
use wireflow_core::runtime::RuntimeConfig;
use wireflow_core::scheduler::execute_workflow;
use wireflow_types::{Node, Value, ValueMap, Workflow};

fn registry() -> Arc<NodeExecutorRegistry> {
    Arc::new(NodeExecutorRegistry::new())
}

fn object(pairs: &[(&str, Value)]) -> Value {
    let mut m = ValueMap::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v.clone());
    }
    Value::Object(m)
}

/// Scenario 1: a linear `start -> python -> end` chain, data flowing
/// through each hop.
#[tokio::test]
async fn linear_workflow_runs_every_node_in_order() {
    let mut wf = Workflow::new();
    wf.add_node("start", Node::new("start"));
    wf.add_node(
        "shout",
        Node::new("python").with_code("def run(x):\n    return {'n': x.get('message', '').upper()}"),
    );
    wf.add_node("finish", Node::new("end"));
    wf.connect("c1", "start", "shout");
    wf.connect("c2", "shout", "finish");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());
    let ids: Vec<&str> = result.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["start", "shout", "finish"]);

    let finish = result.outcomes.iter().find(|o| o.id == "finish").unwrap();
    assert_eq!(
        finish.outcome.output.as_map().unwrap().get("n"),
        Some(&Value::String("WORKFLOW STARTED".to_string()))
    );
}

/// Scenario 2: a condition node routes based on a string match and the
/// matched branch's fields flow to the end node untouched.
#[tokio::test]
async fn condition_node_routes_to_matching_branch() {
    let mut wf = Workflow::new();
    wf.add_node("start", Node::new("start"));

    let mut route = Node::new("condition");
    let mut clause_condition = ValueMap::new();
    clause_condition.insert("field".to_string(), Value::String("message".to_string()));
    clause_condition.insert("operator".to_string(), Value::String("contains".to_string()));
    clause_condition.insert("value".to_string(), Value::String("Started".to_string()));
    let mut clause = ValueMap::new();
    clause.insert("condition".to_string(), Value::Object(clause_condition));
    clause.insert("output".to_string(), object(&[("route", Value::String("matched".to_string()))]));
    route.set_config("conditions", Value::Array(vec![Value::Object(clause)]));
    route.set_config("default", object(&[("route", Value::String("fallback".to_string()))]));
    wf.add_node("route", route);

    wf.add_node("finish", Node::new("end"));
    wf.connect("c1", "start", "route");
    wf.connect("c2", "route", "finish");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());
    let finish = result.outcomes.iter().find(|o| o.id == "finish").unwrap();
    assert_eq!(
        finish.outcome.output.as_map().unwrap().get("route"),
        Some(&Value::String("matched".to_string()))
    );
}

/// Scenario 3: a serial foreach squares every item (read from the node's
/// own `items` config, since the upstream `start` node carries no
/// sequence) and the endloop projects the aggregation down to its six
/// fields.
#[tokio::test]
async fn serial_foreach_aggregates_every_iteration_through_endloop() {
    let mut wf = Workflow::new();
    wf.add_node("seed", Node::new("start"));

    let mut foreach = Node::new("foreach");
    foreach.set_config(
        "items",
        Value::Array(vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]),
    );
    wf.add_node("fe", foreach);

    wf.add_node("square", Node::new("python").with_code("def run(x):\n    return x * x"));
    wf.add_node("el", Node::new("endloop"));

    wf.connect("c0", "seed", "fe");
    wf.connect("c1", "fe", "square");
    wf.connect("c2", "square", "el");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());

    let foreach_outcome = result.outcomes.iter().find(|o| o.id == "fe").unwrap();
    assert_eq!(foreach_outcome.outcome.endloop_node_id.as_deref(), Some("el"));

    // "square" itself must never appear in the top-level trace: it is
    // masked as part of the foreach's body.
    assert!(!result.outcomes.iter().any(|o| o.id == "square"));

    let endloop = result.outcomes.iter().find(|o| o.id == "el").unwrap();
    let out = endloop.outcome.output.as_map().unwrap();
    assert_eq!(out.get("total"), Some(&Value::Integer(3)));
    assert_eq!(out.get("successful"), Some(&Value::Integer(3)));
    assert_eq!(out.get("failed"), Some(&Value::Integer(0)));
    let aggregated = out.get("aggregated_outputs").and_then(Value::as_array).unwrap();
    assert_eq!(aggregated, &vec![Value::Integer(4), Value::Integer(9), Value::Integer(16)]);
}

/// Scenario 4: a parallel foreach where one iteration fails still
/// completes every other iteration and reports the correct counts; the
/// foreach node itself never fails the run (failure is per-iteration, not
/// per-node, inside the aggregation).
#[tokio::test]
async fn parallel_foreach_reports_partial_failure_without_failing_the_run() {
    let mut wf = Workflow::new();
    wf.add_node("seed", Node::new("start"));

    let mut foreach = Node::new("foreach");
    foreach.set_config("execution_mode", Value::String("parallel".to_string()));
    foreach.set_config("max_concurrency", Value::Integer(4));
    foreach.set_config(
        "items",
        Value::Array(vec![Value::Integer(1), Value::Integer(0), Value::Integer(3)]),
    );
    wf.add_node("fe", foreach);

    // Division by the item: the middle iteration (0) raises inside the
    // script and the other two succeed independently of it.
    wf.add_node(
        "invert",
        Node::new("python").with_code("def run(x):\n    return 10 / x"),
    );
    wf.add_node("el", Node::new("endloop"));

    wf.connect("c0", "seed", "fe");
    wf.connect("c1", "fe", "invert");
    wf.connect("c2", "invert", "el");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());

    let endloop = result.outcomes.iter().find(|o| o.id == "el").unwrap();
    let out = endloop.outcome.output.as_map().unwrap();
    assert_eq!(out.get("total"), Some(&Value::Integer(3)));
    assert_eq!(out.get("successful"), Some(&Value::Integer(2)));
    assert_eq!(out.get("failed"), Some(&Value::Integer(1)));

    // Ordering survives the bounded-concurrency fan-out: results line up
    // with the original item order even though completion order may not.
    let results = out.get("results").and_then(Value::as_array).unwrap();
    assert_eq!(results.len(), 3);
    let second_item = results[1].as_map().unwrap().get("item").cloned();
    assert_eq!(second_item, Some(Value::Integer(0)));
}

/// Scenario 5: a cyclic graph (no `start`/`end`) still executes each node
/// exactly once instead of looping or deadlocking.
#[tokio::test]
async fn cyclic_graph_falls_back_to_running_each_node_once() {
    let mut wf = Workflow::new();
    wf.add_node("a", Node::new("end"));
    wf.add_node("b", Node::new("end"));
    wf.connect("c1", "a", "b");
    wf.connect("c2", "b", "a");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());
    assert_eq!(result.outcomes.len(), 2);
}

/// Scenario 6: a node with `skipDuringExecution` set is recorded with its
/// input forwarded verbatim as its output, never actually dispatched.
#[tokio::test]
async fn skipped_node_forwards_its_input_as_output() {
    let mut wf = Workflow::new();
    wf.add_node("start", Node::new("start"));
    let mut skipped = Node::new("http");
    skipped.skip_during_execution = true;
    wf.add_node("mid", skipped);
    wf.add_node("finish", Node::new("end"));
    wf.connect("c1", "start", "mid");
    wf.connect("c2", "mid", "finish");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(result.is_success());
    let start = result.outcomes.iter().find(|o| o.id == "start").unwrap();
    let mid = result.outcomes.iter().find(|o| o.id == "mid").unwrap();
    assert_eq!(start.outcome.output, mid.outcome.output);
}

/// Scenario 7: an unknown node type fails that node and halts the run
/// without dispatching its downstream successors.
#[tokio::test]
async fn unknown_node_type_halts_the_run_at_that_node() {
    let mut wf = Workflow::new();
    wf.add_node("start", Node::new("start"));
    wf.add_node("ghost", Node::new("not-a-real-node-type"));
    wf.add_node("finish", Node::new("end"));
    wf.connect("c1", "start", "ghost");
    wf.connect("c2", "ghost", "finish");

    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(!result.is_success());
    let (failing_id, message) = result.error.unwrap();
    assert_eq!(failing_id, "ghost");
    assert!(message.contains("not-a-real-node-type"));
    assert!(!result.outcomes.iter().any(|o| o.id == "finish"));
}

/// An empty workflow is a structural validation failure, surfaced as the
/// synthetic `<workflow>` node id rather than a panic.
#[tokio::test]
async fn empty_workflow_fails_structural_validation() {
    let wf = Workflow::new();
    let result = execute_workflow(&wf, &registry(), &RuntimeConfig::default()).await;
    assert!(!result.is_success());
    assert!(result.outcomes.is_empty());
    let (failing_id, _) = result.error.unwrap();
    assert_eq!(failing_id, "<workflow>");
}
