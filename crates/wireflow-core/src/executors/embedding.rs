//! Embedding-generator executor (§4.4 "embedding").
//!
//! A true transformer-backed sentence embedding model is out of scope for
//! this crate (§1 excludes the bit-exact wire details of third-party
//! embedding models); what matters to the engine is the node contract: a
//! process-wide, name-keyed model cache (§5) producing a fixed-dimension
//! vector deterministically for the same text and model name. The cache
//! and the dimension contract are real; the actual vector is a
//! deterministic hash-based stand-in.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use wireflow_types::{Node, NodeOutcome, Value, ValueMap};

use crate::executor::NodeExecutor;
use crate::runtime::RuntimeConfig;

struct EmbeddingModel {
    dim: usize,
}

impl EmbeddingModel {
    /// Deterministic pseudo-embedding: seed a counter stream from a SHA-256
    /// of the model name and text, expand to `dim` floats in [-1, 1]. Two
    /// calls with the same model name and text always produce the same
    /// vector, and first-use-loads/subsequent-uses-reuse is irrelevant to
    /// correctness here since the "model" is stateless besides `dim`.
    fn embed(&self, model_name: &str, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        let mut counter: u32 = 0;
        while out.len() < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(model_name.as_bytes());
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() >= self.dim {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push((bits as f32 / u32::MAX as f32) * 2.0 - 1.0);
            }
            counter += 1;
        }
        out
    }
}

fn model_cache() -> &'static DashMap<String, Arc<EmbeddingModel>> {
    static CACHE: OnceLock<DashMap<String, Arc<EmbeddingModel>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

fn load_model(name: &str) -> Arc<EmbeddingModel> {
    if let Some(existing) = model_cache().get(name) {
        return existing.clone();
    }
    // Loads are not mutually excluded (§5): concurrent first uses may race
    // and one wins, which is fine since the model is idempotent.
    let model = Arc::new(EmbeddingModel { dim: 384 });
    model_cache().insert(name.to_string(), model.clone());
    model
}

/// Find the text to embed: `input_field` if given, else the first string
/// value found in the input mapping, else the input itself if it is a
/// string (§4.4).
fn resolve_text<'a>(input: &'a Value, input_field: Option<&str>) -> Option<&'a str> {
    if let Some(field) = input_field {
        if let Some(s) = input.as_map().and_then(|m| m.get(field)).and_then(Value::as_str) {
            return Some(s);
        }
    }
    if let Some(map) = input.as_map() {
        for value in map.values() {
            if let Value::String(s) = value {
                return Some(s);
            }
        }
    }
    input.as_str()
}

pub struct EmbeddingExecutor;

#[async_trait]
impl NodeExecutor for EmbeddingExecutor {
    fn node_type(&self) -> &str {
        "embedding"
    }

    async fn execute(&self, node: &Node, input: &Value, _config: &RuntimeConfig) -> NodeOutcome {
        let started = Instant::now();
        let model_name = node.get_config("model").and_then(Value::as_str).unwrap_or("default").to_string();
        let input_field = node.get_config("input_field").and_then(Value::as_str);
        let output_field = node.get_config("output_field").and_then(Value::as_str).unwrap_or("embedding").to_string();
        let format = node.get_config("format").and_then(Value::as_str).unwrap_or("array").to_string();

        let Some(text) = resolve_text(input, input_field) else {
            return NodeOutcome::error(
                "embedding node found no string to embed in the input",
                started.elapsed().as_secs_f64(),
            );
        };
        let text = text.to_string();

        let model = load_model(&model_name);
        let vector = model.embed(&model_name, &text);
        let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();

        let mut out = input.as_map().cloned().unwrap_or_default();
        let embedding_value = if format == "blob" {
            Value::Bytes(bytes.clone())
        } else {
            Value::Array(vector.iter().map(|f| Value::Float(*f as f64)).collect())
        };
        out.insert(output_field.clone(), embedding_value);
        out.insert(
            format!("{output_field}_array"),
            Value::Array(vector.iter().map(|f| Value::Float(*f as f64)).collect()),
        );
        out.insert(format!("{output_field}_bytes"), Value::Bytes(bytes));
        out.insert(format!("{output_field}_dim"), Value::Integer(model.dim as i64));

        NodeOutcome::success(Value::Object(out), started.elapsed().as_secs_f64())
    }
}
