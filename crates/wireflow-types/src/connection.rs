//! Connection types and graph utilities.

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::workflow::IdMap;

/// A single directed edge. `sourceOutput`/`targetInput` are accepted on the
/// wire for forward compatibility with richer graph editors but are not
/// used for routing: each target consumes exactly one predecessor's whole
/// output (§3/§4.1) — fan-out and fan-in are not modeled per-port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub target: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Graph algorithms over a workflow's nodes and connections.
pub mod graph {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};

    /// Direct successors of `node_id`, in connection-map iteration order.
    pub fn children(connections: &IdMap<Connection>, node_id: &str) -> Vec<String> {
        connections
            .iter()
            .filter(|(_, c)| c.source == node_id)
            .map(|(_, c)| c.target.clone())
            .collect()
    }

    /// Direct predecessors of `node_id`, in connection-map iteration order.
    pub fn parents(connections: &IdMap<Connection>, node_id: &str) -> Vec<String> {
        connections
            .iter()
            .filter(|(_, c)| c.target == node_id)
            .map(|(_, c)| c.source.clone())
            .collect()
    }

    /// Kahn's algorithm over the node/connection maps. Nodes left over once
    /// the zero-in-degree frontier is exhausted (cycles, or islands whose
    /// only inbound edges are themselves inside a cycle) are appended in
    /// their original map order rather than rejected — the engine never
    /// errors out of a cyclic submission (§4.1, §8 scenario 5).
    pub fn topological_order(nodes: &IdMap<Node>, connections: &IdMap<Connection>) -> Vec<String> {
        let mut in_degree: HashMap<String, usize> =
            nodes.ids().map(|id| (id.to_string(), 0usize)).collect();
        for (_, conn) in connections.iter() {
            if nodes.contains(&conn.target) && nodes.contains(&conn.source) {
                *in_degree.entry(conn.target.clone()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<String> = nodes
            .ids()
            .filter(|id| in_degree.get(*id).copied().unwrap_or(0) == 0)
            .map(|id| id.to_string())
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        let mut emitted: HashSet<String> = HashSet::new();

        while let Some(id) = queue.pop_front() {
            if !emitted.insert(id.clone()) {
                continue;
            }
            order.push(id.clone());
            for child in children(connections, &id) {
                if let Some(deg) = in_degree.get_mut(&child) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if order.len() < nodes.len() {
            for id in nodes.ids() {
                if !emitted.contains(id) {
                    order.push(id.to_string());
                }
            }
        }

        order
    }

    /// Breadth-first walk from `start`'s children, collecting every
    /// reachable node until a stop-condition fires on the *target* of an
    /// edge. Used for foreach body discovery (§4.3): stops (without
    /// recursing past) `endloop`, `end`, and nested `foreach` nodes.
    ///
    /// Returns the body node ids (in discovery order) plus the id of the
    /// first `endloop` encountered, if any.
    pub fn discover_foreach_body(
        nodes: &IdMap<Node>,
        connections: &IdMap<Connection>,
        foreach_id: &str,
    ) -> (Vec<String>, Option<String>) {
        let mut body = Vec::new();
        let mut endloop_id = None;
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(foreach_id.to_string());

        let mut queue: VecDeque<String> = children(connections, foreach_id).into_iter().collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let node_type = nodes.get(&id).map(|n| n.node_type.as_str()).unwrap_or("");
            match node_type {
                "endloop" => {
                    if endloop_id.is_none() {
                        endloop_id = Some(id.clone());
                    }
                    // do not recurse past endloop, do not add to body directly
                }
                "end" => {
                    // do not include, do not recurse
                }
                "foreach" => {
                    // nested foreach handled by its own discovery; do not recurse
                }
                _ => {
                    body.push(id.clone());
                    for child in children(connections, &id) {
                        queue.push_back(child);
                    }
                }
            }
        }

        (body, endloop_id)
    }

}
