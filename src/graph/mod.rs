//! # Graph
//!
//! Arena-style graph storage and the builder that compiles it.
//!
//! | Type | Role |
//! |------|------|
//! | [`Graph`] | Owns every [`Node`] and [`IndexedEdge`] by value; everything else holds indices |
//! | [`GraphBuilder`] | Bulk insertion, compilation into clusters, output writing |
//! | [`OutputContext`] | Caller-visible vertex / edge collections |
//!
//! Edges and nodes are never removed from their arrays, only invalidated, so
//! indices captured by queued intersection work stay meaningful.

pub mod builder;
pub mod output;

use hashbrown::HashMap;

use crate::model::{edge_key, IndexedEdge, Node};

pub use builder::{GraphBuilder, GraphBuilderSettings, Subgraph};
pub use output::{GraphOutput, OutputContext, ATTR_CLUSTER_ID, ATTR_EDGE_END, ATTR_EDGE_START};

/// Node + edge arena with an undirected dedup index.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<IndexedEdge>,
    /// Packed endpoint key → index of the (valid) edge holding it.
    unique_edges: HashMap<u64, u32>,
}

impl Graph {
    /// One node per point, node index == point index.
    pub fn with_nodes(count: usize) -> Self {
        Self {
            nodes: (0..count).map(|i| Node::new(i as u32, i)).collect(),
            edges: Vec::new(),
            unique_edges: HashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn valid_edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.valid).count()
    }

    /// Append a node for a newly created point.
    pub fn add_node(&mut self, point_index: usize) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(Node::new(index, point_index));
        index
    }

    pub fn find_edge(&self, a: u32, b: u32) -> Option<&IndexedEdge> {
        self.unique_edges.get(&edge_key(a, b)).map(|&i| &self.edges[i as usize])
    }

    /// Insert an undirected edge. Self-loops, unknown nodes and duplicates
    /// (in either order) are rejected; the first insertion wins.
    pub fn insert_edge(&mut self, a: u32, b: u32, io_index: Option<usize>) -> Option<u32> {
        if a == b || a as usize >= self.nodes.len() || b as usize >= self.nodes.len() {
            return None;
        }
        let key = edge_key(a, b);
        if self.unique_edges.contains_key(&key) {
            return None;
        }

        let index = self.edges.len() as u32;
        let (start, end) = (a.min(b), a.max(b));
        self.edges.push(IndexedEdge::new(index, start, end, io_index));
        self.unique_edges.insert(key, index);
        self.nodes[start as usize].link(end, index);
        self.nodes[end as usize].link(start, index);
        Some(index)
    }

    /// Insert packed keys in ascending key order, so the resulting edge
    /// indices do not depend on how the keys were collected.
    pub fn insert_edge_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a u64>, io_index: Option<usize>) -> usize {
        let mut sorted: Vec<u64> = keys.into_iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        sorted
            .into_iter()
            .filter(|&k| {
                let (a, b) = crate::model::split_edge_key(k);
                self.insert_edge(a, b, io_index).is_some()
            })
            .count()
    }

    /// Logically delete an edge and detach it from its endpoints.
    /// Its slot stays; the key becomes free for a replacement edge.
    pub fn invalidate_edge(&mut self, edge: u32) {
        let Some(e) = self.edges.get_mut(edge as usize) else { return };
        if !e.valid {
            return;
        }
        e.valid = false;
        let (start, end, key) = (e.start, e.end, e.key());
        if self.unique_edges.get(&key) == Some(&edge) {
            self.unique_edges.remove(&key);
        }
        self.nodes[start as usize].unlink_edge(edge);
        self.nodes[end as usize].unlink_edge(edge);
    }

    /// Rebuild adjacency from valid edges only.
    pub fn rebuild_adjacency(&mut self) {
        for node in &mut self.nodes {
            node.adjacency.clear();
        }
        for e in self.edges.iter().filter(|e| e.valid) {
            self.nodes[e.start as usize].link(e.end, e.index);
            self.nodes[e.end as usize].link(e.start, e.index);
        }
    }
}
