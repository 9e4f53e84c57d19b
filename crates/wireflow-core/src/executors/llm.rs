//! LLM client executor (§4.4 "llm").

use std::net::IpAddr;
use std::time::Instant;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

const CHAT_PROVIDERS: &[&str] = &[
    "openrouter", "openai", "groq", "together", "fireworks", "deepinfra", "perplexity", "mistral",
];

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Template `{key}` placeholders in the prompt from the input mapping,
/// truncating any substituted value past 5000 chars, then append the whole
/// input as pretty JSON (truncated to 2000 chars) if any `{word}` token
/// remains unresolved in the result (§4.4).
fn build_prompt(template: &str, input_map: &ValueMap) -> String {
    let mut out = template.to_string();
    for (key, value) in input_map {
        let needle = format!("{{{key}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &truncate(&value.stringify(), 5000));
        }
    }
    if has_unresolved_placeholder(&out) {
        let pretty = serde_json::to_string_pretty(&Value::Object(input_map.clone()).to_json())
            .unwrap_or_default();
        out.push('\n');
        out.push_str(&truncate(&pretty, 2000));
    }
    out
}

/// Whether `s` still contains a `{word}`-shaped token, i.e. a placeholder
/// nothing in the input satisfied.
fn has_unresolved_placeholder(s: &str) -> bool {
    let mut in_token = false;
    let mut token_len = 0;
    for c in s.chars() {
        if c == '{' {
            in_token = true;
            token_len = 0;
        } else if c == '}' {
            if in_token && token_len > 0 {
                return true;
            }
            in_token = false;
        } else if in_token {
            if c.is_alphanumeric() || c == '_' {
                token_len += 1;
            } else {
                in_token = false;
            }
        }
    }
    false
}

/// Parses `ALLOWED_OLLAMA_HOSTS` (hostnames and CIDR ranges) and checks
/// whether `host` is permitted (§4.4, §6).
fn ollama_host_allowed(host: &str, allow_list: &str) -> bool {
    let bare_host = host
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .split(':')
        .next()
        .unwrap_or(host);

    for entry in allow_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if entry == bare_host {
            return true;
        }
        if let Some((network, bits)) = entry.split_once('/') {
            if let (Ok(ip), Ok(net_ip), Ok(prefix)) =
                (bare_host.parse::<IpAddr>(), network.parse::<IpAddr>(), bits.parse::<u32>())
            {
                if ip_in_cidr(ip, net_ip, prefix) {
                    return true;
                }
            }
        }
    }
    false
}

fn ip_in_cidr(ip: IpAddr, network: IpAddr, prefix: u32) -> bool {
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            (u32::from(ip) & mask) == (u32::from(net) & mask)
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            (u128::from(ip) & mask) == (u128::from(net) & mask)
        }
        _ => false,
    }
}

pub struct LlmExecutor;

#[async_trait]
impl NodeExecutor for LlmExecutor {
    fn node_type(&self) -> &str {
        "llm"
    }

    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let empty = ValueMap::new();
        let input_map = input.as_map().unwrap_or(&empty);

        let provider = node
            .get_config("provider")
            .and_then(Value::as_str)
            .unwrap_or("openrouter")
            .to_string();
        let model = node.get_config("model").and_then(Value::as_str).unwrap_or("gpt-4o-mini").to_string();
        let system = node.get_config("system").and_then(Value::as_str).map(str::to_string);
        let prompt_template = node
            .get_config("user")
            .or_else(|| node.get_config("prompt"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let prompt = build_prompt(prompt_template, input_map);
        let temperature = node.get_config("temperature").and_then(|v| match v {
            Value::Float(f) => Some(*f),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        });
        let max_tokens = node.get_config("max_tokens").and_then(|v| match v {
            Value::Integer(n) => Some(*n),
            _ => None,
        });

        if provider == "ollama" {
            let host = node
                .get_config("ollama_host")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| config.ollama_host.clone())
                .unwrap_or_else(|| "localhost:11434".to_string());
            if !ollama_host_allowed(&host, &config.allowed_ollama_hosts) {
                return NodeOutcome::error(
                    format!("ollama host '{host}' is not in the allow-list"),
                    started.elapsed().as_secs_f64(),
                );
            }
            return call_ollama(&host, &model, system.as_deref(), &prompt, config.llm_ollama_timeout, started)
                .await;
        }

        if !CHAT_PROVIDERS.contains(&provider.as_str()) {
            return NodeOutcome::error(
                format!("unsupported llm provider: {provider}"),
                started.elapsed().as_secs_f64(),
            );
        }

        let api_key_name = node
            .get_config("api_key_name")
            .and_then(Value::as_str)
            .unwrap_or(&config.openrouter_api_key_env)
            .to_string();
        let api_key = node
            .get_config("api_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| if provider == "openrouter" { std::env::var(&api_key_name).ok() } else { None });

        let Some(api_key) = api_key else {
            return NodeOutcome::error(
                format!("llm node requires an api_key for provider '{provider}'"),
                started.elapsed().as_secs_f64(),
            );
        };

        let base_url = node
            .get_config("base_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_base_url(&provider));

        call_chat_completion(
            &base_url,
            &api_key,
            &model,
            system.as_deref(),
            &prompt,
            temperature,
            max_tokens,
            config.llm_chat_timeout,
            started,
        )
        .await
    }
}

fn default_base_url(provider: &str) -> String {
    match provider {
        "openai" => "https://api.openai.com/v1".to_string(),
        "groq" => "https://api.groq.com/openai/v1".to_string(),
        "together" => "https://api.together.xyz/v1".to_string(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".to_string(),
        "deepinfra" => "https://api.deepinfra.com/v1/openai".to_string(),
        "perplexity" => "https://api.perplexity.ai".to_string(),
        "mistral" => "https://api.mistral.ai/v1".to_string(),
        _ => "https://openrouter.ai/api/v1".to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
async fn call_chat_completion(
    base_url: &str,
    api_key: &str,
    model: &str,
    system: Option<&str>,
    prompt: &str,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    timeout: std::time::Duration,
    started: Instant,
) -> NodeOutcome {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(serde_json::json!({"role": "system", "content": system}));
    }
    messages.push(serde_json::json!({"role": "user", "content": prompt}));

    let mut body = serde_json::json!({"model": model, "messages": messages});
    if let Some(t) = temperature {
        body["temperature"] = serde_json::json!(t);
    }
    if let Some(m) = max_tokens {
        body["max_tokens"] = serde_json::json!(m);
    }

    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => return NodeOutcome::error(format!("failed to build http client: {e}"), started.elapsed().as_secs_f64()),
    };

    let response = client
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return NodeOutcome::error(format!("llm request failed: {e}"), started.elapsed().as_secs_f64()),
    };

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return NodeOutcome::error(
            format!("llm provider returned {status}: {text}"),
            started.elapsed().as_secs_f64(),
        );
    }

    let parsed: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => return NodeOutcome::error(format!("invalid llm response: {e}"), started.elapsed().as_secs_f64()),
    };

    let content = parsed["choices"][0]["message"]["content"].as_str().unwrap_or_default().to_string();
    let mut out = ValueMap::new();
    out.insert("content".to_string(), Value::String(content));
    out.insert("model".to_string(), Value::String(model.to_string()));
    out.insert("raw".to_string(), Value::from_json(parsed));
    NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
}

async fn call_ollama(
    host: &str,
    model: &str,
    system: Option<&str>,
    prompt: &str,
    timeout: std::time::Duration,
    started: Instant,
) -> NodeOutcome {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => return NodeOutcome::error(format!("failed to build http client: {e}"), started.elapsed().as_secs_f64()),
    };

    let full_prompt = match system {
        Some(system) => format!("{system}\n\n{prompt}"),
        None => prompt.to_string(),
    };
    let scheme_host = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    let response = client
        .post(format!("{scheme_host}/api/generate"))
        .json(&serde_json::json!({"model": model, "prompt": full_prompt, "stream": false}))
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => return NodeOutcome::error(format!("ollama request failed: {e}"), started.elapsed().as_secs_f64()),
    };

    if !response.status().is_success() {
        let status = response.status();
        return NodeOutcome::error(format!("ollama returned {status}"), started.elapsed().as_secs_f64());
    }

    let parsed: serde_json::Value = match response.json().await {
        Ok(v) => v,
        Err(e) => return NodeOutcome::error(format!("invalid ollama response: {e}"), started.elapsed().as_secs_f64()),
    };

    let content = parsed["response"].as_str().unwrap_or_default().to_string();
    let mut out = ValueMap::new();
    out.insert("content".to_string(), Value::String(content));
    out.insert("model".to_string(), Value::String(model.to_string()));
    NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_loopback_and_private_ranges_by_default() {
        let allow_list = "localhost,127.0.0.1,192.168.0.0/16,10.0.0.0/8";
        assert!(ollama_host_allowed("localhost:11434", allow_list));
        assert!(ollama_host_allowed("192.168.1.50", allow_list));
        assert!(ollama_host_allowed("10.2.3.4", allow_list));
        assert!(!ollama_host_allowed("8.8.8.8", allow_list));
    }

    #[test]
    fn prompt_templating_appends_json_when_a_placeholder_stays_unresolved() {
        let mut input = ValueMap::new();
        input.insert("q".to_string(), Value::String("life".to_string()));
        let prompt = build_prompt("Answer {q} about {topic}", &input);
        assert!(prompt.starts_with("Answer life about {topic}"));
        assert!(prompt.contains("\"q\""));
    }

    #[test]
    fn prompt_templating_ignores_unused_input_keys_once_every_placeholder_resolves() {
        let mut input = ValueMap::new();
        input.insert("q".to_string(), Value::String("life".to_string()));
        input.insert("ctx".to_string(), Value::Integer(7));
        let prompt = build_prompt("Answer {q}", &input);
        assert_eq!(prompt, "Answer life");
    }
}
