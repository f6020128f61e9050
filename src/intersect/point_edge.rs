//! Point-edge intersections: nodes lying on another edge's segment.

use glam::DVec3;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use super::math::project_on_segment;
use super::{chain_edges, snapshot, BlendRecord, EdgeSegment};
use crate::blend::{BlendingSettings, MetadataBlender};
use crate::graph::Graph;
use crate::model::PointSet;
use crate::spatial::{Aabb, Octree};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointEdgeSettings {
    /// Max distance between a node and the segment it splits.
    pub tolerance: f64,
    /// Move hit points onto the segment.
    pub snap_on_edge: bool,
    pub use_custom_blending: bool,
    pub blending: BlendingSettings,
}

impl Default for PointEdgeSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            snap_on_edge: false,
            use_custom_blending: false,
            blending: BlendingSettings::default(),
        }
    }
}

impl PointEdgeSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!("point-edge tolerance must be positive, got {}", self.tolerance)));
        }
        Ok(())
    }
}

/// A node found on an edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointEdgeHit {
    pub node: u32,
    /// Parameter along the edge, strictly inside `(0, 1)`.
    pub t: f64,
    /// Projection of the node onto the segment.
    pub position: DVec3,
}

/// All hits on one edge, ordered along the segment.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSplit {
    pub edge: u32,
    pub start: u32,
    pub end: u32,
    pub hits: Vec<PointEdgeHit>,
}

// ============================================================================
// Scan
// ============================================================================

/// Immutable scan state: node octree plus edge snapshot.
#[derive(Debug)]
pub struct PointEdgeScan {
    tolerance: f64,
    positions: Vec<DVec3>,
    segments: Vec<EdgeSegment>,
    octree: Option<Octree<u32>>,
}

impl PointEdgeScan {
    pub fn new(graph: &Graph, points: &PointSet, settings: &PointEdgeSettings) -> Self {
        let (positions, segments) = snapshot(graph, points);
        let octree = Aabb::from_points(positions.iter().copied()).map(|bounds| {
            let mut tree = Octree::from_bounds(&bounds.expand_by(settings.tolerance));
            for (i, p) in positions.iter().enumerate() {
                tree.add_element(Aabb::from_center_extents(*p, DVec3::ZERO), i as u32);
            }
            tree
        });
        Self { tolerance: settings.tolerance, positions, segments, octree }
    }

    /// Number of edges to scan.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Nodes within tolerance of the interior of segment `slot`.
    pub fn find_collinear_nodes(&self, slot: usize) -> Option<EdgeSplit> {
        let segment = self.segments.get(slot)?;
        let octree = self.octree.as_ref()?;
        let tol2 = self.tolerance * self.tolerance;

        let mut hits = Vec::new();
        let query = Aabb::from_segment(segment.a, segment.b).expand_by(self.tolerance);
        octree.find_elements_with_bounds_test(&query, |&node| {
            if node == segment.start || node == segment.end {
                return;
            }
            let p = self.positions[node as usize];
            let Some((t, position)) = project_on_segment(p, segment.a, segment.b) else { return };
            if t <= 0.0 || t >= 1.0 || p.distance_squared(position) > tol2 {
                return;
            }
            hits.push(PointEdgeHit { node, t, position });
        });

        if hits.is_empty() {
            return None;
        }
        hits.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.node.cmp(&b.node)));
        Some(EdgeSplit { edge: segment.edge, start: segment.start, end: segment.end, hits })
    }

    pub fn scan(&self, range: std::ops::Range<usize>) -> Vec<EdgeSplit> {
        range.filter_map(|slot| self.find_collinear_nodes(slot)).collect()
    }
}

// ============================================================================
// Insert + blend
// ============================================================================

/// Collected point-edge hits for one graph.
#[derive(Debug, Clone)]
pub struct PointEdgeIntersections {
    pub settings: PointEdgeSettings,
    pub splits: Vec<EdgeSplit>,
    pub blends: Vec<BlendRecord>,
}

impl PointEdgeIntersections {
    pub fn new(settings: PointEdgeSettings, mut splits: Vec<EdgeSplit>) -> Self {
        splits.sort_by_key(|s| s.edge);
        Self { settings, splits, blends: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Split every hit edge in edge-index order. Returns the number of edges split.
    pub fn insert(&mut self, graph: &mut Graph, points: &mut PointSet) -> usize {
        let mut split = 0;
        let mut blended: HashSet<usize> = HashSet::new();
        self.blends.clear();

        for s in &self.splits {
            let Some(original) = graph.edges.get(s.edge as usize) else { continue };
            if !original.valid {
                continue;
            }
            let io_index = original.io_index;

            let mut via: Vec<u32> = Vec::with_capacity(s.hits.len());
            for hit in &s.hits {
                if !via.contains(&hit.node) {
                    via.push(hit.node);
                }
            }

            graph.invalidate_edge(s.edge);
            chain_edges(graph, s.start, &via, s.end, io_index);
            split += 1;

            let start_point = graph.nodes[s.start as usize].point_index;
            let end_point = graph.nodes[s.end as usize].point_index;
            for hit in &s.hits {
                let target = graph.nodes[hit.node as usize].point_index;
                if self.settings.snap_on_edge {
                    if let Some(p) = points.points.get_mut(target) {
                        p.transform.location = hit.position;
                    }
                }
                if blended.insert(target) {
                    self.blends.push(BlendRecord {
                        target,
                        sources: smallvec![(start_point, 1.0 - hit.t), (end_point, hit.t)],
                    });
                }
            }
        }

        points.cleanup_keys();
        tracing::debug!(edges = split, points = self.blends.len(), "point-edge intersections inserted");
        split
    }

    pub fn blend_count(&self) -> usize {
        self.blends.len()
    }

    pub fn blend(&self, index: usize, blender: &MetadataBlender) {
        if let Some(record) = self.blends.get(index) {
            record.apply(blender);
        }
    }
}
