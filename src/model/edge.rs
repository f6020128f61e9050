//! Edges: packed undirected keys and the canonical indexed edge.

use serde::{Deserialize, Serialize};

/// Pack an unordered pair into a single key: `(min << 32) | max`.
///
/// `edge_key(a, b) == edge_key(b, a)` always holds.
#[inline]
pub fn edge_key(a: u32, b: u32) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

/// Inverse of [`edge_key`]; returns `(min, max)`.
#[inline]
pub fn split_edge_key(key: u64) -> (u32, u32) {
    ((key >> 32) as u32, (key & 0xFFFF_FFFF) as u32)
}

/// Pack an adjacency entry: `(other_node << 32) | edge_index`.
#[inline]
pub fn adjacency_entry(other_node: u32, edge_index: u32) -> u64 {
    ((other_node as u64) << 32) | edge_index as u64
}

/// Inverse of [`adjacency_entry`]; returns `(other_node, edge_index)`.
#[inline]
pub fn split_adjacency_entry(entry: u64) -> (u32, u32) {
    ((entry >> 32) as u32, (entry & 0xFFFF_FFFF) as u32)
}

/// A canonical graph edge. Never removed from its array, only invalidated,
/// so indices held by in-flight readers stay meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexedEdge {
    pub index: u32,
    pub start: u32,
    pub end: u32,
    /// Input collection the edge came from, `None` when synthesized.
    pub io_index: Option<usize>,
    pub valid: bool,
}

impl IndexedEdge {
    pub fn new(index: u32, start: u32, end: u32, io_index: Option<usize>) -> Self {
        Self { index, start, end, io_index, valid: true }
    }

    pub fn key(&self) -> u64 {
        edge_key(self.start, self.end)
    }

    /// The "other" end of the edge from the given node.
    pub fn other(&self, node: u32) -> Option<u32> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    pub fn contains(&self, node: u32) -> bool {
        self.start == node || self.end == node
    }
}
