//! Node types and definitions.

use serde::{Deserialize, Serialize};

use crate::value::{Value, ValueMap};

/// A workflow node instance, keyed by node id in [`crate::Workflow::nodes`].
///
/// `node_type` is kept as a plain string (not a closed enum) because an
/// unrecognized type must still deserialize successfully and fail later, at
/// dispatch, as a structural error outcome rather than rejecting the whole
/// request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node type identifier, e.g. `"http"`, `"python"`, `"foreach"`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Optional display name.
    #[serde(default)]
    pub title: Option<String>,
    /// Inline-script source for `python`/`typescript` nodes.
    #[serde(default)]
    pub code: Option<String>,
    /// Free-form per-type configuration.
    #[serde(default)]
    pub config: ValueMap,
    /// When true the node is bypassed; its input is forwarded unchanged.
    #[serde(default, rename = "skipDuringExecution")]
    pub skip_during_execution: bool,
}

impl Node {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            title: None,
            code: None,
            config: ValueMap::new(),
            skip_during_execution: false,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_config(mut self, config: ValueMap) -> Self {
        self.config = config;
        self
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: Value) {
        self.config.insert(key.into(), value);
    }

    pub fn skip(mut self) -> Self {
        self.skip_during_execution = true;
        self
    }

    pub fn get_config(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    pub fn is_foreach(&self) -> bool {
        self.node_type == "foreach"
    }

    pub fn is_endloop(&self) -> bool {
        self.node_type == "endloop"
    }
}
