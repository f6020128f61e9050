//! # Intersection resolution
//!
//! Two passes inject vertices where geometry meets:
//!
//! | Pass | Detects | Insert |
//! |------|---------|--------|
//! | [`point_edge`] | a node lying on an edge's interior | edge split at every hit, ordered along the segment |
//! | [`edge_edge`] | two edges crossing in space | one shared node per crossing, both edges split |
//!
//! Each pass runs in three steps. A scan over an immutable snapshot of the
//! graph runs in parallel batches. A single-threaded insert mutates the graph
//! and point set. Blending then derives the attributes of every touched point.
//!
//! ```text
//! Scan::new(&graph, &points)  → scan(range) on workers → collect, sort
//!   → Intersections::insert(&mut graph, &mut points)  (invalidate originals, chain sub-edges)
//!   → blend(i, &blender) per record → blender.write(&mut points)
//! ```
//!
//! Original edges are invalidated, never reused, so edge indices captured by
//! a scan stay meaningful while the insert runs.

pub mod edge_edge;
pub mod math;
pub mod point_edge;

use glam::DVec3;
use smallvec::SmallVec;

use crate::blend::MetadataBlender;
use crate::graph::Graph;
use crate::model::PointSet;

pub use edge_edge::{Crossing, EdgeEdgeIntersections, EdgeEdgeScan, EdgeEdgeSettings};
pub use point_edge::{EdgeSplit, PointEdgeHit, PointEdgeIntersections, PointEdgeScan, PointEdgeSettings};

/// Read-only copy of one valid edge, taken before a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSegment {
    pub edge: u32,
    pub start: u32,
    pub end: u32,
    pub a: DVec3,
    pub b: DVec3,
}

impl EdgeSegment {
    pub fn shares_endpoint(&self, other: &EdgeSegment) -> bool {
        self.start == other.start || self.start == other.end || self.end == other.start || self.end == other.end
    }
}

/// Node positions (by node index) and valid edge segments of `graph`.
pub fn snapshot(graph: &Graph, points: &PointSet) -> (Vec<DVec3>, Vec<EdgeSegment>) {
    let positions: Vec<DVec3> = graph
        .nodes
        .iter()
        .map(|n| points.points.get(n.point_index).map_or(DVec3::ZERO, |p| p.position()))
        .collect();
    let segments = graph
        .edges
        .iter()
        .filter(|e| e.valid)
        .map(|e| EdgeSegment {
            edge: e.index,
            start: e.start,
            end: e.end,
            a: positions[e.start as usize],
            b: positions[e.end as usize],
        })
        .collect();
    (positions, segments)
}

/// Weighted sources for one point touched by an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendRecord {
    pub target: usize,
    pub sources: SmallVec<[(usize, f64); 4]>,
}

impl BlendRecord {
    pub fn apply(&self, blender: &MetadataBlender) {
        match self.sources.as_slice() {
            [(a, wa), (b, wb)] => blender.blend(self.target, *a, *b, wb / (wa + wb).max(f64::EPSILON)),
            sources => blender.blend_weighted(self.target, sources),
        }
    }
}

/// Chain `start → via… → end` as new edges carrying `io_index`.
fn chain_edges(graph: &mut Graph, start: u32, via: &[u32], end: u32, io_index: Option<usize>) -> usize {
    let mut inserted = 0;
    let mut prev = start;
    for &node in via.iter().chain(std::iter::once(&end)) {
        if graph.insert_edge(prev, node, io_index).is_some() {
            inserted += 1;
        }
        prev = node;
    }
    inserted
}
