//! Edge-edge intersections: segments crossing in space.

use std::collections::BTreeMap;

use glam::DVec3;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use super::math::{line_angle_degrees, segment_closest_approach};
use super::{chain_edges, snapshot, BlendRecord, EdgeSegment};
use crate::blend::{BlendingSettings, MetadataBlender};
use crate::graph::Graph;
use crate::model::{Point, PointSet};
use crate::spatial::{grid_cell, Aabb, Octree};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeEdgeSettings {
    /// Max gap between two segments that still counts as a crossing.
    /// Also the radius under which crossings collapse into one node.
    pub tolerance: f64,
    /// Reject crossings flatter than this many degrees.
    pub min_angle: Option<f64>,
    /// Reject crossings steeper than this many degrees.
    pub max_angle: Option<f64>,
    pub use_custom_blending: bool,
    pub blending: BlendingSettings,
}

impl Default for EdgeEdgeSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            min_angle: None,
            max_angle: None,
            use_custom_blending: false,
            blending: BlendingSettings::default(),
        }
    }
}

impl EdgeEdgeSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(Error::InvalidConfig(format!("edge-edge tolerance must be positive, got {}", self.tolerance)));
        }
        for angle in [self.min_angle, self.max_angle].into_iter().flatten() {
            if !(0.0..=90.0).contains(&angle) {
                return Err(Error::InvalidConfig(format!("crossing angle must be within [0, 90], got {angle}")));
            }
        }
        if let (Some(min), Some(max)) = (self.min_angle, self.max_angle) {
            if min > max {
                return Err(Error::InvalidConfig("min crossing angle exceeds max".into()));
            }
        }
        Ok(())
    }

    fn accepts_angle(&self, angle: f64) -> bool {
        self.min_angle.is_none_or(|min| angle >= min) && self.max_angle.is_none_or(|max| angle <= max)
    }
}

/// Two edges crossing at `position`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub first: EdgeSegment,
    pub second: EdgeSegment,
    /// Parameter along `first`.
    pub s: f64,
    /// Parameter along `second`.
    pub t: f64,
    pub position: DVec3,
}

// ============================================================================
// Scan
// ============================================================================

/// Immutable scan state: edge octree plus edge snapshot.
#[derive(Debug)]
pub struct EdgeEdgeScan {
    settings: EdgeEdgeSettings,
    segments: Vec<EdgeSegment>,
    octree: Option<Octree<u32>>,
}

impl EdgeEdgeScan {
    pub fn new(graph: &Graph, points: &PointSet, settings: &EdgeEdgeSettings) -> Self {
        let (_, segments) = snapshot(graph, points);
        let octree = Aabb::from_points(segments.iter().flat_map(|s| [s.a, s.b])).map(|bounds| {
            let mut tree = Octree::from_bounds(&bounds.expand_by(settings.tolerance));
            for (slot, s) in segments.iter().enumerate() {
                tree.add_element(Aabb::from_segment(s.a, s.b), slot as u32);
            }
            tree
        });
        Self { settings: settings.clone(), segments, octree }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Crossings between segment `slot` and every later segment.
    pub fn find_overlapping_edges(&self, slot: usize) -> Vec<Crossing> {
        let mut crossings = Vec::new();
        let (Some(first), Some(octree)) = (self.segments.get(slot), self.octree.as_ref()) else {
            return crossings;
        };
        let tol2 = self.settings.tolerance * self.settings.tolerance;

        let query = Aabb::from_segment(first.a, first.b).expand_by(self.settings.tolerance);
        octree.find_elements_with_bounds_test(&query, |&other| {
            let other = other as usize;
            if other <= slot {
                return;
            }
            let second = &self.segments[other];
            if first.shares_endpoint(second) {
                return;
            }
            let Some(approach) = segment_closest_approach(first.a, first.b, second.a, second.b) else { return };
            if approach.s <= 0.0 || approach.s >= 1.0 || approach.t <= 0.0 || approach.t >= 1.0 {
                return;
            }
            if approach.distance_squared() > tol2 {
                return;
            }
            if !self.settings.accepts_angle(line_angle_degrees(first.b - first.a, second.b - second.a)) {
                return;
            }
            crossings.push(Crossing {
                first: *first,
                second: *second,
                s: approach.s,
                t: approach.t,
                position: approach.midpoint(),
            });
        });
        crossings
    }

    pub fn scan(&self, range: std::ops::Range<usize>) -> Vec<Crossing> {
        range.flat_map(|slot| self.find_overlapping_edges(slot)).collect()
    }
}

// ============================================================================
// Insert + blend
// ============================================================================

/// Collected crossings for one graph.
#[derive(Debug, Clone)]
pub struct EdgeEdgeIntersections {
    pub settings: EdgeEdgeSettings,
    pub crossings: Vec<Crossing>,
    pub blends: Vec<BlendRecord>,
}

impl EdgeEdgeIntersections {
    pub fn new(settings: EdgeEdgeSettings, mut crossings: Vec<Crossing>) -> Self {
        crossings.sort_by_key(|c| (c.first.edge, c.second.edge));
        Self { settings, crossings, blends: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.crossings.is_empty()
    }

    /// Create one node per distinct crossing and split every crossed edge.
    /// Returns the number of nodes created.
    pub fn insert(&mut self, graph: &mut Graph, points: &mut PointSet) -> usize {
        self.blends.clear();
        let tolerance = self.settings.tolerance;
        let cell_size = DVec3::splat(tolerance);

        let mut placed: HashMap<(i64, i64, i64), Vec<(DVec3, u32)>> = HashMap::new();
        let mut splits: BTreeMap<u32, (EdgeSegment, Vec<(f64, u32)>)> = BTreeMap::new();

        for crossing in &self.crossings {
            let cell = grid_cell(crossing.position, cell_size);
            let mut existing = None;
            'search: for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(list) = placed.get(&(cell.0 + dx, cell.1 + dy, cell.2 + dz)) else { continue };
                        if let Some((_, node)) =
                            list.iter().find(|(p, _)| p.distance_squared(crossing.position) <= tolerance * tolerance)
                        {
                            existing = Some(*node);
                            break 'search;
                        }
                    }
                }
            }

            let node = match existing {
                Some(node) => node,
                None => {
                    let point = points.push(Point::at(crossing.position));
                    let node = graph.add_node(point);
                    placed.entry(cell).or_default().push((crossing.position, node));

                    let point_of = |n: u32| graph.nodes[n as usize].point_index;
                    self.blends.push(BlendRecord {
                        target: point,
                        sources: smallvec![
                            (point_of(crossing.first.start), 1.0 - crossing.s),
                            (point_of(crossing.first.end), crossing.s),
                            (point_of(crossing.second.start), 1.0 - crossing.t),
                            (point_of(crossing.second.end), crossing.t),
                        ],
                    });
                    node
                }
            };

            splits
                .entry(crossing.first.edge)
                .or_insert_with(|| (crossing.first, Vec::new()))
                .1
                .push((crossing.s, node));
            splits
                .entry(crossing.second.edge)
                .or_insert_with(|| (crossing.second, Vec::new()))
                .1
                .push((crossing.t, node));
        }

        for (edge, (segment, mut along)) in splits {
            let Some(original) = graph.edges.get(edge as usize) else { continue };
            if !original.valid {
                continue;
            }
            let io_index = original.io_index;

            along.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let mut via: Vec<u32> = Vec::with_capacity(along.len());
            for (_, node) in along {
                if !via.contains(&node) {
                    via.push(node);
                }
            }

            graph.invalidate_edge(edge);
            chain_edges(graph, segment.start, &via, segment.end, io_index);
        }

        points.cleanup_keys();
        tracing::debug!(
            crossings = self.crossings.len(),
            nodes = self.blends.len(),
            "edge-edge intersections inserted"
        );
        self.blends.len()
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
