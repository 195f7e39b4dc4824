use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::NodeId;
use crate::error::TopologyError;

/// Undirected link between two routers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    pub cost: u64,
}

impl Edge {
    pub fn new(src: impl Into<NodeId>, dst: impl Into<NodeId>, cost: u64) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            cost,
        }
    }

    fn key(&self) -> (&str, &str) {
        if self.src <= self.dst {
            (self.src.as_str(), self.dst.as_str())
        } else {
            (self.dst.as_str(), self.src.as_str())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<Edge>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<NodeId>) -> &mut Self {
        self.nodes.push(node.into());
        self
    }

    pub fn add_edge(
        &mut self,
        src: impl Into<NodeId>,
        dst: impl Into<NodeId>,
        cost: u64,
    ) -> &mut Self {
        self.edges.push(Edge::new(src, dst, cost));
        self
    }

    /// Checks the invariants the simulation relies on: unique names, edges
    /// only between known nodes, no self-loops and at most one edge per pair.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut known = HashSet::new();
        for node in &self.nodes {
            if !known.insert(node.as_str()) {
                return Err(TopologyError::DuplicateNode(node.clone()));
            }
        }

        let mut seen = HashSet::new();
        for edge in &self.edges {
            for end in [&edge.src, &edge.dst] {
                if !known.contains(end.as_str()) {
                    return Err(TopologyError::UnknownNode {
                        src: edge.src.clone(),
                        dst: edge.dst.clone(),
                        unknown: end.clone(),
                    });
                }
            }
            if edge.src == edge.dst {
                return Err(TopologyError::SelfLoop(edge.src.clone()));
            }
            if !seen.insert(edge.key()) {
                return Err(TopologyError::DuplicateEdge {
                    src: edge.src.clone(),
                    dst: edge.dst.clone(),
                });
            }
        }

        Ok(())
    }

    /// Direct neighbors of `node` with the cost of the connecting link.
    /// Edges are undirected, so both endpoints see each other.
    pub fn neighbors_of(&self, node: &str) -> BTreeMap<NodeId, u64> {
        self.edges
            .iter()
            .filter_map(|edge| {
                if edge.src == node {
                    Some((edge.dst.clone(), edge.cost))
                } else if edge.dst == node {
                    Some((edge.src.clone(), edge.cost))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        let Some(start) = self.nodes.first() else {
            return true;
        };

        let mut visited = BTreeSet::new();
        let mut stack = vec![start.clone()];
        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            for neighbor in self.neighbors_of(&node).into_keys() {
                if !visited.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }

        visited.len() == self.nodes.len()
    }
}
