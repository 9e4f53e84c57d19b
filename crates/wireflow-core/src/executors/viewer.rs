//! Viewer pass-through executors (§4.4 "markdown / html / json").

use std::time::Instant;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

/// Keys commonly carrying display content, checked in priority order when
/// no explicit `content_key` is given.
const COMMON_CONTENT_KEYS: &[&str] = &["content", "text", "body", "message", "output", "result", "html", "markdown"];

fn resolve_dotted<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = input;
    for segment in path.split('.') {
        current = current.as_map()?.get(segment)?;
    }
    Some(current)
}

/// Heuristic detection: explicit `content_key` first, then common keys,
/// then the longest string value in the mapping, then the input itself if
/// it's already a string (§4.4).
fn detect_content<'a>(input: &'a Value, content_key: Option<&str>) -> Option<(String, &'a str)> {
    if let Some(key) = content_key {
        return resolve_dotted(input, key).and_then(Value::as_str).map(|s| (key.to_string(), s));
    }
    if let Some(map) = input.as_map() {
        for key in COMMON_CONTENT_KEYS {
            if let Some(s) = map.get(*key).and_then(Value::as_str) {
                return Some((key.to_string(), s));
            }
        }
        let longest = map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s)))
            .max_by_key(|(_, s)| s.len());
        if let Some((key, s)) = longest {
            return Some((key, s));
        }
    }
    input.as_str().map(|s| ("".to_string(), s))
}

fn simple_viewer_execute(node: &Node, input: &Value, started: Instant) -> NodeOutcome {
    let content_key = node.get_config("content_key").and_then(Value::as_str);
    let Some((detected_key, content)) = detect_content(input, content_key) else {
        return NodeOutcome::error("no displayable content found in input", started.elapsed().as_secs_f64());
    };
    let mut out = ValueMap::new();
    out.insert("content".to_string(), Value::String(content.to_string()));
    out.insert("detected_key".to_string(), Value::String(detected_key));
    NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
}

pub struct MarkdownExecutor;

#[async_trait]
impl NodeExecutor for MarkdownExecutor {
    fn node_type(&self) -> &str {
        "markdown"
    }

    async fn execute(&self, node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        simple_viewer_execute(node, input, Instant::now())
    }
}

pub struct HtmlExecutor;

#[async_trait]
impl NodeExecutor for HtmlExecutor {
    fn node_type(&self) -> &str {
        "html"
    }

    async fn execute(&self, node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        simple_viewer_execute(node, input, Instant::now())
    }
}

pub struct JsonExecutor;

#[async_trait]
impl NodeExecutor for JsonExecutor {
    fn node_type(&self) -> &str {
        "json"
    }

    async fn execute(&self, node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let content_key = node.get_config("content_key").and_then(Value::as_str);

        let value = match content_key {
            Some(key) => match resolve_dotted(input, key) {
                Some(v) => v.clone(),
                None => {
                    let available: Vec<String> =
                        input.as_map().map(|m| m.keys().cloned().collect()).unwrap_or_default();
                    return NodeOutcome::error(
                        format!("content_key '{key}' not found; available keys: {}", available.join(", ")),
                        started.elapsed().as_secs_f64(),
                    );
                }
            },
            None => input.clone(),
        };

        let pretty = serde_json::to_string_pretty(&value.to_json()).unwrap_or_default();
        let mut out = ValueMap::new();
        out.insert("content".to_string(), Value::String(pretty));
        out.insert("parsed".to_string(), value);
        NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_viewer_errors_listing_available_keys_when_missing() {
        let mut node = Node::new("json");
        node.set_config("content_key", Value::String("missing".to_string()));
        let mut input = ValueMap::new();
        input.insert("a".to_string(), Value::Integer(1));
        let outcome = JsonExecutor.execute(&node, &Value::Object(input), &RuntimeConfig::default()).await;
        assert!(outcome.is_error());
        assert!(outcome.error.unwrap().contains('a'));
    }

    #[tokio::test]
    async fn markdown_falls_back_to_longest_string() {
        let node = Node::new("markdown");
        let mut input = ValueMap::new();
        input.insert("short".to_string(), Value::String("hi".to_string()));
        input.insert("notes".to_string(), Value::String("a much longer note here".to_string()));
        let outcome = MarkdownExecutor.execute(&node, &Value::Object(input), &RuntimeConfig::default()).await;
        let out = outcome.output.as_map().unwrap();
        assert_eq!(out.get("detected_key"), Some(&Value::String("notes".to_string())));
    }
}
