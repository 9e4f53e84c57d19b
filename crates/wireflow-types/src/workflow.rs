//! The top-level workflow request shape: an insertion-ordered map of nodes
//! and an insertion-ordered map of connections.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::WorkflowError;
use crate::node::Node;

/// An insertion-order-preserving map from opaque string id to `T`.
///
/// The scheduler's "first predecessor wins" fan-in rule (§4.1) is only
/// reproducible if the node and connection maps iterate in the order the
/// client submitted them, which a `HashMap` does not guarantee. This is a
/// thin `Vec` + index, not a general-purpose map: workflows are small
/// (dozens of nodes), so linear lookup by id is not worth a dependency.
#[derive(Debug, Clone, Default)]
pub struct IdMap<T> {
    order: Vec<String>,
    by_id: HashMap<String, T>,
}

impl<T> IdMap<T> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, value: T) {
        let id = id.into();
        if !self.by_id.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.by_id.insert(id, value);
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// `(id, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.order.iter().map(move |id| (id.as_str(), &self.by_id[id]))
    }
}

impl<T> Serialize for IdMap<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.order.len()))?;
        for (id, value) in self.iter() {
            map.serialize_entry(id, value)?;
        }
        map.end()
    }
}

impl<'de, T> Deserialize<'de> for IdMap<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct IdMapVisitor<T>(std::marker::PhantomData<T>);

        impl<'de, T> serde::de::Visitor<'de> for IdMapVisitor<T>
        where
            T: Deserialize<'de>,
        {
            type Value = IdMap<T>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of node/connection ids to values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut map = IdMap::new();
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(IdMapVisitor(std::marker::PhantomData))
    }
}

/// The submitted workflow: a node graph plus its connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub nodes: IdMap<Node>,
    pub connections: IdMap<crate::connection::Connection>,
}

impl Workflow {
    pub fn new() -> Self {
        Self {
            nodes: IdMap::new(),
            connections: IdMap::new(),
        }
    }

    pub fn add_node(&mut self, id: impl Into<String>, node: Node) -> &mut Self {
        self.nodes.insert(id, node);
        self
    }

    pub fn connect(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> &mut Self {
        self.connections
            .insert(id, crate::connection::Connection::new(source, target));
        self
    }

    /// Structural validation: every connection must reference nodes that
    /// exist. Unlike the teacher this performs no cycle rejection — cycles
    /// are a scheduling concern (§4.1), not a validation failure.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.nodes.is_empty() {
            return Err(WorkflowError::InvalidWorkflow(
                "workflow has no nodes".to_string(),
            ));
        }
        for (conn_id, conn) in self.connections.iter() {
            if !self.nodes.contains(&conn.source) {
                return Err(WorkflowError::InvalidWorkflow(format!(
                    "connection '{conn_id}' references unknown source node '{}'",
                    conn.source
                )));
            }
            if !self.nodes.contains(&conn.target) {
                return Err(WorkflowError::InvalidWorkflow(format!(
                    "connection '{conn_id}' references unknown target node '{}'",
                    conn.target
                )));
            }
        }
        Ok(())
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_preserves_insertion_order_not_hash_order() {
        let mut m: IdMap<i32> = IdMap::new();
        m.insert("z", 1);
        m.insert("a", 2);
        m.insert("m", 3);
        assert_eq!(m.ids().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn validate_rejects_dangling_connection() {
        let mut wf = Workflow::new();
        wf.add_node("a", Node::new("start"));
        wf.connect("c1", "a", "ghost");
        assert!(wf.validate().is_err());
    }

    #[test]
    fn validate_accepts_cyclic_graph() {
        let mut wf = Workflow::new();
        wf.add_node("a", Node::new("start"));
        wf.add_node("b", Node::new("end"));
        wf.connect("c1", "a", "b");
        wf.connect("c2", "b", "a");
        assert!(wf.validate().is_ok());
    }
}
