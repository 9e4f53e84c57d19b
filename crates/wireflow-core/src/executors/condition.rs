//! Conditional router executor (§4.4 "condition").

use std::time::Instant;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

fn resolve_dotted<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = input;
    for segment in path.split('.') {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

/// Strings made entirely of digits (with at most one `.`) are promoted to
/// integer or float before comparison (§4.4).
fn numeric_coerce(value: &Value) -> Value {
    if let Value::String(s) = value {
        let is_numeric = !s.is_empty()
            && s.chars().filter(|c| *c == '.').count() <= 1
            && s.chars().all(|c| c.is_ascii_digit() || c == '.');
        if is_numeric {
            if let Ok(i) = s.parse::<i64>() {
                return Value::Integer(i);
            }
            if let Ok(f) = s.parse::<f64>() {
                return Value::Float(f);
            }
        }
    }
    value.clone()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Evaluates one `{field, operator, value}` clause against the input
/// mapping. A type error during comparison produces `false`, not an error
/// (§4.4).
fn evaluate(input: &Value, field: &str, operator: &str, compare_to: &Value) -> bool {
    let field_value = resolve_dotted(input, field);

    if operator == "exists" {
        return field_value.is_some();
    }

    let Some(field_value) = field_value else {
        // null field value: false for everything except `!=`, where it is
        // true iff the compared value is itself non-null (§4.4).
        return operator == "!=" && !matches!(compare_to, Value::Null);
    };
    if matches!(field_value, Value::Null) {
        return operator == "!=" && !matches!(compare_to, Value::Null);
    }

    let lhs = numeric_coerce(field_value);
    let rhs = numeric_coerce(compare_to);

    match operator {
        "==" => lhs == rhs,
        "!=" => lhs != rhs,
        "contains" => match (&lhs, &rhs) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        },
        ">" | "<" | ">=" | "<=" => match (as_f64(&lhs), as_f64(&rhs)) {
            (Some(a), Some(b)) => match operator {
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                "<=" => a <= b,
                _ => unreachable!(),
            },
            _ => false,
        },
        _ => false,
    }
}

pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn node_type(&self) -> &str {
        "condition"
    }

    async fn execute(&self, node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let condition_type = node
            .get_config("type")
            .and_then(Value::as_str)
            .unwrap_or("if")
            .to_string();
        let clauses = node
            .get_config("conditions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let default = node.get_config("default").cloned().unwrap_or(Value::Null);

        let mut matched_index: Option<i64> = None;
        let mut matched_output = default.clone();

        for (idx, clause) in clauses.iter().enumerate() {
            let Some(clause_map) = clause.as_map() else { continue };
            let Some(condition) = clause_map.get("condition").and_then(Value::as_map) else {
                continue;
            };
            let field = condition.get("field").and_then(Value::as_str).unwrap_or_default();
            let operator = condition.get("operator").and_then(Value::as_str).unwrap_or_default();
            let compare_to = condition.get("value").cloned().unwrap_or(Value::Null);

            if evaluate(input, field, operator, &compare_to) {
                matched_index = Some(idx as i64);
                matched_output = clause_map.get("output").cloned().unwrap_or(Value::Null);
                break;
            }
        }

        let mut out = ValueMap::new();
        if let Value::Object(fields) = &matched_output {
            for (k, v) in fields {
                out.insert(k.clone(), v.clone());
            }
        }
        out.insert("result".to_string(), matched_output);
        out.insert(
            "matched_condition".to_string(),
            matched_index.map(Value::Integer).unwrap_or(Value::Null),
        );
        out.insert("input".to_string(), input.clone());
        out.insert("condition_type".to_string(), Value::String(condition_type));

        NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
    }
}
