//! The `NodeExecutor` trait and its registry: a pure function of
//! `(node, input)` producing a `NodeOutcome`, dispatched by node `type`
//! (§4.1, §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use wireflow_types::{Node, NodeOutcome, Value};

use crate::runtime::RuntimeConfig;

/// A single node-type contract. Implementors must never mutate `input`
/// observably and must collapse every failure into an error-status
/// `NodeOutcome` rather than returning `Err` across the node boundary
/// (§7 "Propagation") — the trait itself is infallible for that reason.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The `type` string this executor handles, e.g. `"http"`, `"python"`.
    fn node_type(&self) -> &str;

    /// Run the node against its resolved input.
    async fn execute(&self, node: &Node, input: &Value, config: &RuntimeConfig) -> NodeOutcome;
}

/// Dispatch table from node `type` to executor, keyed the same way the
/// scheduler and the sub-workflow runner both use it (§4.1, §4.2).
pub struct NodeExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    /// Build the registry with every built-in node type registered.
    pub fn new() -> Self {
        let mut registry = Self {
            executors: HashMap::new(),
        };

        registry.register(Arc::new(crate::executors::flow::StartExecutor));
        registry.register(Arc::new(crate::executors::flow::EndExecutor));
        registry.register(Arc::new(crate::executors::flow::EndLoopPassthroughExecutor));
        registry.register(Arc::new(crate::executors::script::PythonExecutor));
        registry.register(Arc::new(crate::executors::script::TypescriptExecutor));
        registry.register(Arc::new(crate::executors::http::HttpExecutor));
        registry.register(Arc::new(crate::executors::file::FileExecutor));
        registry.register(Arc::new(crate::executors::condition::ConditionExecutor));
        registry.register(Arc::new(crate::executors::database::DatabaseExecutor));
        registry.register(Arc::new(crate::executors::llm::LlmExecutor));
        registry.register(Arc::new(crate::executors::embedding::EmbeddingExecutor));
        registry.register(Arc::new(crate::executors::viewer::MarkdownExecutor));
        registry.register(Arc::new(crate::executors::viewer::HtmlExecutor));
        registry.register(Arc::new(crate::executors::viewer::JsonExecutor));

        registry
    }

    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(executor.node_type().to_string(), executor);
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_knows_every_spec_node_type() {
        let registry = NodeExecutorRegistry::new();
        for ty in [
            "start", "end", "endloop", "python", "typescript", "http", "file", "condition",
            "database", "llm", "embedding", "markdown", "html", "json",
        ] {
            assert!(registry.get(ty).is_some(), "missing executor for {ty}");
        }
        assert!(registry.get("foreach").is_none());
    }
}
