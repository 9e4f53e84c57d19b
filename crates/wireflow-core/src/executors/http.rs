//! HTTP client executor (§4.4 "http").

use std::time::Instant;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::placeholder;
use crate::runtime::RuntimeConfig;

pub struct HttpExecutor;

#[async_trait]
impl NodeExecutor for HttpExecutor {
    fn node_type(&self) -> &str {
        "http"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let empty = ValueMap::new();
        let input_map = input.as_map().unwrap_or(&empty);

        let cfg = Value::Object(node.config.clone());
        let cfg = placeholder::substitute(&cfg, input_map);
        let cfg = cfg.as_map().cloned().unwrap_or_default();

        let method = cfg
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let Some(url) = cfg.get("url").and_then(Value::as_str) else {
            return NodeOutcome::error("http node requires a url", started.elapsed().as_secs_f64());
        };

        let timeout = cfg
            .get("timeout")
            .and_then(|v| match v {
                Value::Integer(n) => Some(*n as u64),
                Value::Float(f) => Some(*f as u64),
                _ => None,
            })
            .map(std::time::Duration::from_secs)
            .unwrap_or(config.http_timeout);

        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(c) => c,
            Err(e) => {
                return NodeOutcome::error(
                    format!("failed to build http client: {e}"),
                    started.elapsed().as_secs_f64(),
                )
            }
        };

        let Ok(parsed_method) = reqwest::Method::from_bytes(method.as_bytes()) else {
            return NodeOutcome::error(
                format!("unsupported http method: {method}"),
                started.elapsed().as_secs_f64(),
            );
        };
        let mut req = client.request(parsed_method.clone(), url);

        if let Some(Value::Object(headers)) = cfg.get("headers") {
            for (k, v) in headers {
                req = req.header(k.as_str(), v.stringify());
            }
        }
        if let Some(Value::Object(params)) = cfg.get("params") {
            let query: Vec<(String, String)> =
                params.iter().map(|(k, v)| (k.clone(), v.stringify())).collect();
            req = req.query(&query);
        }
        if matches!(parsed_method, reqwest::Method::POST | reqwest::Method::PUT | reqwest::Method::PATCH) {
            if let Some(body) = cfg.get("body") {
                req = req.json(&body.to_json());
            }
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                return NodeOutcome::error(
                    format!("http request failed: {e}"),
                    started.elapsed().as_secs_f64(),
                )
            }
        };

        let status_code = response.status().as_u16();
        let mut headers_out = ValueMap::new();
        for (name, value) in response.headers() {
            headers_out.insert(
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            );
        }
        let body_text = response.text().await.unwrap_or_default();
        let data = serde_json::from_str::<serde_json::Value>(&body_text)
            .map(Value::from_json)
            .unwrap_or(Value::String(body_text));

        let mut out = ValueMap::new();
        out.insert("status_code".to_string(), Value::Integer(status_code as i64));
        out.insert("headers".to_string(), Value::Object(headers_out));
        out.insert("data".to_string(), data);
        out.insert("url".to_string(), Value::String(url.to_string()));
        out.insert("method".to_string(), Value::String(method));

        for (k, v) in input_map {
            out.entry(k.clone()).or_insert_with(|| v.clone());
        }

        NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
    }
}
