//! # Compound (fusion) graph
//!
//! Merges near-coincident points from many inputs into canonical nodes and
//! records edges between them.
//!
//! Insertion is concurrent: points land in tolerance-sized grid buckets
//! behind sharded locks, and a raw edge is remembered between the two source
//! points. Nothing about node identity is decided during insertion.
//!
//! [`CompoundGraph::finalize`] then resolves identity in one deterministic pass:
//!
//! ```text
//! members (sorted by (io, index))
//!   → union every pair within tolerance, searched over the 27 cells around each member
//!   → node = one connected set of members, ordered by its lowest member
//!   → raw edges remapped to node ids, self-loops dropped, deduped (lowest io wins)
//! ```
//!
//! Two members of one node are linked by a chain of within-tolerance pairs;
//! members of one cell that are not are never merged. The grouping depends
//! only on the point set and the tolerance, never on the order or threads
//! that inserted them.

use std::collections::BTreeMap;

use glam::DVec3;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::blend::{BlendingSettings, MetadataBlender};
use crate::model::{edge_key, split_edge_key, PointSet};
use crate::spatial::grid_cell;
use crate::{Error, Result};

const SHARD_COUNT: usize = 64;

// ============================================================================
// Settings
// ============================================================================

/// Distance under which two points are the same vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuseSettings {
    pub tolerance: f64,
    /// Compare per axis against `tolerances` instead of a scalar distance.
    pub component_wise: bool,
    pub tolerances: DVec3,
}

impl Default for FuseSettings {
    fn default() -> Self {
        Self { tolerance: 0.001, component_wise: false, tolerances: DVec3::splat(0.001) }
    }
}

impl FuseSettings {
    pub fn scalar(tolerance: f64) -> Self {
        Self { tolerance, component_wise: false, tolerances: DVec3::splat(tolerance) }
    }

    pub fn per_axis(tolerances: DVec3) -> Self {
        Self { tolerance: tolerances.max_element(), component_wise: true, tolerances }
    }

    pub fn cell_size(&self) -> DVec3 {
        if self.component_wise { self.tolerances } else { DVec3::splat(self.tolerance) }
    }

    pub fn is_within(&self, a: DVec3, b: DVec3) -> bool {
        if self.component_wise {
            (a - b).abs().cmple(self.tolerances).all()
        } else {
            a.distance_squared(b) <= self.tolerance * self.tolerance
        }
    }

    pub fn validate(&self) -> Result<()> {
        let size = self.cell_size();
        if !size.is_finite() || size.min_element() <= 0.0 {
            return Err(Error::InvalidConfig(format!("fuse tolerance must be positive, got {size}")));
        }
        Ok(())
    }
}

// ============================================================================
// Identity types
// ============================================================================

/// A source point: which input, which index. Orders by `(io_index, point_index)`,
/// which is the tie-break used everywhere fusion needs one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointRef {
    pub io_index: usize,
    pub point_index: usize,
}

impl PointRef {
    pub fn new(io_index: usize, point_index: usize) -> Self {
        Self { io_index, point_index }
    }
}

type Cell = (i64, i64, i64);

/// Points that share one grid cell.
#[derive(Debug, Default)]
struct Bucket {
    members: BTreeMap<PointRef, DVec3>,
}

/// A canonical vertex after finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundNode {
    /// Centroid of the members.
    pub position: DVec3,
    /// Contributing points, sorted.
    pub members: Vec<PointRef>,
}

/// An edge between two compound nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundEdge {
    pub start: u32,
    pub end: u32,
    /// Lowest input index among the raw edges that collapsed into this one.
    pub io_index: usize,
}

/// Output of [`CompoundGraph::finalize`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedGraph {
    pub nodes: Vec<CompoundNode>,
    pub edges: Vec<CompoundEdge>,
    lookup: HashMap<PointRef, u32>,
}

// ============================================================================
// CompoundGraph
// ============================================================================

/// Concurrent accumulator of fused points and edges.
pub struct CompoundGraph {
    settings: FuseSettings,
    buckets: Vec<Mutex<HashMap<Cell, Bucket>>>,
    /// Raw edge `(min_ref, max_ref)` → lowest io that submitted it.
    edges: Vec<Mutex<HashMap<(PointRef, PointRef), usize>>>,
}

#[inline]
fn cell_shard(cell: &Cell) -> usize {
    let h = cell.0.wrapping_mul(73_856_093)
        ^ cell.1.wrapping_mul(19_349_663)
        ^ cell.2.wrapping_mul(83_492_791);
    (h as u64 % SHARD_COUNT as u64) as usize
}

#[inline]
fn ref_shard(r: &PointRef) -> usize {
    (r.io_index.wrapping_mul(31).wrapping_add(r.point_index)) % SHARD_COUNT
}

impl CompoundGraph {
    pub fn new(settings: FuseSettings) -> Self {
        Self {
            settings,
            buckets: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            edges: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub fn settings(&self) -> &FuseSettings {
        &self.settings
    }

    /// Register a point. Safe to call from any number of threads.
    pub fn insert_point(&self, position: DVec3, point: PointRef) {
        let cell = grid_cell(position, self.settings.cell_size());
        // Lock only for the lookup-or-insert itself.
        self.buckets[cell_shard(&cell)]
            .lock()
            .entry(cell)
            .or_default()
            .members
            .entry(point)
            .or_insert(position);
    }

    /// Register both endpoints and the edge between them.
    pub fn insert_edge(
        &self,
        position_a: DVec3,
        io_a: usize,
        index_a: usize,
        position_b: DVec3,
        io_b: usize,
        index_b: usize,
    ) {
        let a = PointRef::new(io_a, index_a);
        let b = PointRef::new(io_b, index_b);
        self.insert_point(position_a, a);
        self.insert_point(position_b, b);
        if a == b {
            return;
        }

        let key = if a < b { (a, b) } else { (b, a) };
        let io = io_a.min(io_b);
        self.edges[ref_shard(&key.0)]
            .lock()
            .entry(key)
            .and_modify(|existing| *existing = (*existing).min(io))
            .or_insert(io);
    }

    /// Resolve canonical nodes and edges. See module docs for the rules.
    pub fn finalize(&self) -> FusedGraph {
        // Every member once, in canonical order; a member's slot is its rank.
        let mut members: Vec<(PointRef, DVec3, Cell)> = self
            .buckets
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .iter()
                    .flat_map(|(cell, bucket)| bucket.members.iter().map(|(r, p)| (*r, *p, *cell)))
                    .collect::<Vec<_>>()
            })
            .collect();
        members.sort_unstable_by_key(|(r, _, _)| *r);
        members.dedup_by_key(|(r, _, _)| *r);

        let mut by_cell: HashMap<Cell, Vec<usize>> = HashMap::new();
        for (slot, (_, _, cell)) in members.iter().enumerate() {
            by_cell.entry(*cell).or_default().push(slot);
        }

        // Cells are tolerance-sized, so every pair within tolerance sits in
        // the same or an adjacent cell.
        let mut sets = UnionFind::new(members.len());
        for (i, (_, position, cell)) in members.iter().enumerate() {
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(slots) = by_cell.get(&(cell.0 + dx, cell.1 + dy, cell.2 + dz)) else {
                            continue;
                        };
                        for &j in slots {
                            if j > i && self.settings.is_within(*position, members[j].1) {
                                sets.union(i, j, |a, b| a < b);
                            }
                        }
                    }
                }
            }
        }

        // Roots are the lowest slot of their set, so this orders nodes by
        // their lowest member.
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for slot in 0..members.len() {
            let root = sets.find(slot);
            groups.entry(root).or_default().push(slot);
        }

        let mut graph = FusedGraph::default();
        for slots in groups.into_values() {
            let sum = slots.iter().fold(DVec3::ZERO, |acc, &s| acc + members[s].1);
            let node_index = graph.nodes.len() as u32;
            for &s in &slots {
                graph.lookup.insert(members[s].0, node_index);
            }
            graph.nodes.push(CompoundNode {
                position: sum / slots.len() as f64,
                members: slots.iter().map(|&s| members[s].0).collect(),
            });
        }

        let mut fused_edges: BTreeMap<u64, usize> = BTreeMap::new();
        for shard in &self.edges {
            for ((a, b), io) in shard.lock().iter() {
                let (Some(&na), Some(&nb)) = (graph.lookup.get(a), graph.lookup.get(b)) else { continue };
                if na == nb {
                    continue;
                }
                fused_edges
                    .entry(edge_key(na, nb))
                    .and_modify(|existing| *existing = (*existing).min(*io))
                    .or_insert(*io);
            }
        }
        graph.edges = fused_edges
            .into_iter()
            .map(|(key, io_index)| {
                let (start, end) = split_edge_key(key);
                CompoundEdge { start, end, io_index }
            })
            .collect();

        tracing::debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "compound graph finalized");
        graph
    }
}

// ============================================================================
// FusedGraph
// ============================================================================

impl FusedGraph {
    /// Node a source point was fused into.
    pub fn node_of(&self, point: PointRef) -> Option<u32> {
        self.lookup.get(&point).copied()
    }

    /// Build the compound point collection: one point per node, positioned at
    /// the node centroid, attributes blended from its members.
    pub fn build_points(&self, io_index: usize, sources: &[PointSet], blending: &BlendingSettings) -> PointSet {
        let by_io: HashMap<usize, &PointSet> = sources.iter().map(|s| (s.io_index, s)).collect();

        // Every member row, node after node.
        let mut staging = PointSet::new(io_index);
        let mut ranges = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let start = staging.len();
            for member in &node.members {
                if let Some(source) = by_io.get(&member.io_index).filter(|s| member.point_index < s.len()) {
                    source.copy_point_to(member.point_index, &mut staging);
                }
            }
            ranges.push(start..staging.len());
        }
        staging.cleanup_keys();

        let mut out = PointSet::new(io_index);
        for (node, range) in self.nodes.iter().zip(&ranges) {
            let index = if range.is_empty() {
                out.push(crate::model::Point::at(node.position))
            } else {
                staging.copy_point_to(range.start, &mut out)
            };
            out.points[index].transform.location = node.position;
        }
        out.cleanup_keys();

        let blender = MetadataBlender::new(blending.clone()).prepare_for_data(&staging);
        for (target, range) in ranges.iter().enumerate() {
            if range.len() > 1 {
                let samples: Vec<(usize, f64)> = range.clone().map(|i| (i, 1.0)).collect();
                blender.blend_weighted(target, &samples);
            }
        }
        blender.write(&mut out);
        out
    }
}

// ============================================================================
// Union-find
// ============================================================================

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge; the root preferred by `prefer(a, b) == true` keeps `a`.
    fn union(&mut self, a: usize, b: usize, prefer: impl Fn(usize, usize) -> bool) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        if prefer(ra, rb) {
            self.parent[rb] = ra;
        } else {
            self.parent[ra] = rb;
        }
    }
}
