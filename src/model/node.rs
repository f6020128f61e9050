//! Graph vertex.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::edge::{adjacency_entry, split_adjacency_entry};

/// A vertex in the compiled graph.
///
/// `adjacency` holds packed `(other_node, edge_index)` entries, see
/// [`adjacency_entry`]. Every entry must point at a valid edge touching
/// this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub index: u32,
    pub point_index: usize,
    pub adjacency: SmallVec<[u64; 6]>,
    pub valid: bool,
}

impl Node {
    pub fn new(index: u32, point_index: usize) -> Self {
        Self { index, point_index, adjacency: SmallVec::new(), valid: true }
    }

    pub fn degree(&self) -> usize {
        self.adjacency.len()
    }

    pub fn link(&mut self, other: u32, edge: u32) {
        let entry = adjacency_entry(other, edge);
        if !self.adjacency.contains(&entry) {
            self.adjacency.push(entry);
        }
    }

    pub fn unlink_edge(&mut self, edge: u32) {
        self.adjacency.retain(|e| split_adjacency_entry(*e).1 != edge);
    }

    pub fn neighbors(&self) -> impl Iterator<Item = u32> + '_ {
        self.adjacency.iter().map(|e| split_adjacency_entry(*e).0)
    }

    pub fn edges(&self) -> impl Iterator<Item = u32> + '_ {
        self.adjacency.iter().map(|e| split_adjacency_entry(*e).1)
    }
}
