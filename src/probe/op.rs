//! Prepared probes: a [`ProbeKind`] bound to one point set.

use glam::{DQuat, DVec3};
use hashbrown::HashSet;

use super::{
    BestCandidate, Candidate, DirectionFavor, DirectionSource, IndexMode, ProbeKind, ProbeSettings, SearchRadius,
};
use crate::model::{edge_key, PointSet};
use crate::Result;

/// Squared search radius, constant or per point.
#[derive(Debug, Clone, PartialEq)]
pub enum RadiusSq {
    Constant(f64),
    PerPoint(Vec<f64>),
}

impl RadiusSq {
    #[inline]
    pub fn get(&self, index: usize) -> f64 {
        match self {
            RadiusSq::Constant(r) => *r,
            RadiusSq::PerPoint(values) => values.get(index).copied().unwrap_or(0.0),
        }
    }
}

/// Search direction, constant or per point. Zero for non-direction probes.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectionVec {
    Constant(DVec3),
    PerPoint(Vec<DVec3>),
}

impl DirectionVec {
    #[inline]
    pub fn get(&self, index: usize) -> DVec3 {
        match self {
            DirectionVec::Constant(d) => *d,
            DirectionVec::PerPoint(values) => values.get(index).copied().unwrap_or(DVec3::ZERO),
        }
    }
}

/// Record `key` as taken; false when it already was.
#[inline]
fn claim_direction(stacks: &mut Option<HashSet<u64>>, key: u64) -> bool {
    match stacks {
        Some(taken) => taken.insert(key),
        None => true,
    }
}

/// Per-origin view handed to probes.
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub index: usize,
    pub position: DVec3,
    pub rotation: DQuat,
}

/// A probe ready to run against one point set.
#[derive(Debug, Clone)]
pub struct ProbeOp {
    pub kind: ProbeKind,
    pub radius: RadiusSq,
    pub direction: DirectionVec,
    /// `cos(max_angle / 2)` for direction probes.
    min_dot: f64,
}

impl ProbeOp {
    /// Resolve radius and direction attributes against `points`.
    pub fn prepare(settings: &ProbeSettings, points: &PointSet) -> Result<Self> {
        let radius = match &settings.radius {
            SearchRadius::Constant(r) => RadiusSq::Constant(r * r),
            SearchRadius::Attribute(name) => {
                RadiusSq::PerPoint(points.read_floats(name)?.into_iter().map(|r| r * r).collect())
            }
        };
        let (direction, min_dot) = match &settings.kind {
            ProbeKind::Direction { direction, max_angle, .. } => {
                let direction = match direction {
                    DirectionSource::Constant(d) => DirectionVec::Constant(*d),
                    DirectionSource::Attribute(name) => DirectionVec::PerPoint(points.read_vectors(name)?),
                };
                (direction, (max_angle * 0.5).to_radians().cos())
            }
            _ => (DirectionVec::Constant(DVec3::ZERO), -1.0),
        };
        Ok(Self { kind: settings.kind.clone(), radius, direction, min_dot })
    }

    /// Works from index arithmetic alone, no spatial query.
    pub fn requires_direct_processing(&self) -> bool {
        matches!(self.kind, ProbeKind::Index { .. })
    }

    pub fn requires_chain_processing(&self) -> bool {
        matches!(self.kind, ProbeKind::Direction { chained: true, .. })
    }

    fn world_direction(&self, origin: &Origin) -> DVec3 {
        let direction = self.direction.get(origin.index);
        match self.kind {
            ProbeKind::Direction { transform_direction: true, .. } => (origin.rotation * direction).normalize_or_zero(),
            _ => direction.normalize_or_zero(),
        }
    }

    // ========================================================================
    // Chained
    // ========================================================================

    pub fn prepare_best(&self, _origin: &Origin) -> BestCandidate {
        BestCandidate::default()
    }

    pub fn process_candidate_chained(
        &self,
        origin: &Origin,
        slot: usize,
        candidate: &Candidate,
        best: &mut BestCandidate,
    ) {
        let ProbeKind::Direction { favor, .. } = &self.kind else { return };
        if candidate.distance > self.radius.get(origin.index) {
            return;
        }
        let dot = self.world_direction(origin).dot(candidate.direction);
        if dot < self.min_dot {
            return;
        }

        let better = !best.is_set()
            || match favor {
                DirectionFavor::Dist => candidate
                    .distance
                    .total_cmp(&best.distance)
                    .then(best.dot.total_cmp(&dot))
                    .then(candidate.point_index.cmp(&best.point_index))
                    .is_lt(),
                DirectionFavor::Dot => best
                    .dot
                    .total_cmp(&dot)
                    .then(candidate.distance.total_cmp(&best.distance))
                    .then(candidate.point_index.cmp(&best.point_index))
                    .is_lt(),
            };
        if better {
            best.take(slot, candidate, dot);
        }
    }

    pub fn process_best(
        &self,
        origin: &Origin,
        best: &BestCandidate,
        candidates: &[Candidate],
        stacks: &mut Option<HashSet<u64>>,
        edges: &mut HashSet<u64>,
    ) {
        let Some(candidate) = best.slot.and_then(|slot| candidates.get(slot)) else { return };
        if claim_direction(stacks, candidate.stacking_key) {
            edges.insert(edge_key(origin.index as u32, candidate.point_index as u32));
        }
    }

    // ========================================================================
    // Shared
    // ========================================================================

    /// Consume the distance-sorted candidate list.
    pub fn process_candidates(
        &self,
        origin: &Origin,
        candidates: &[Candidate],
        stacks: &mut Option<HashSet<u64>>,
        edges: &mut HashSet<u64>,
    ) {
        let r2 = self.radius.get(origin.index);
        match &self.kind {
            &ProbeKind::Closest { max_connections } => {
                let mut added = 0;
                for c in candidates.iter().take_while(|c| c.distance <= r2) {
                    if added >= max_connections {
                        break;
                    }
                    if claim_direction(stacks, c.stacking_key) {
                        edges.insert(edge_key(origin.index as u32, c.point_index as u32));
                        added += 1;
                    }
                }
            }
            ProbeKind::AllInRange => {
                for c in candidates.iter().take_while(|c| c.distance <= r2) {
                    if claim_direction(stacks, c.stacking_key) {
                        edges.insert(edge_key(origin.index as u32, c.point_index as u32));
                    }
                }
            }
            ProbeKind::Direction { .. } => {
                let mut best = self.prepare_best(origin);
                for (slot, c) in candidates.iter().enumerate() {
                    self.process_candidate_chained(origin, slot, c, &mut best);
                }
                self.process_best(origin, &best, candidates, stacks, edges);
            }
            ProbeKind::Index { .. } => {}
        }
    }

    // ========================================================================
    // Direct
    // ========================================================================

    pub fn process_node(
        &self,
        origin: &Origin,
        positions: &[DVec3],
        stacking: Option<DVec3>,
        stacks: &mut Option<HashSet<u64>>,
        edges: &mut HashSet<u64>,
    ) {
        let &ProbeKind::Index { mode, wrap } = &self.kind else { return };
        let n = positions.len() as i64;
        if n == 0 {
            return;
        }
        let raw = match mode {
            IndexMode::Offset(offset) => origin.index as i64 + offset,
            IndexMode::Target(target) => target as i64,
        };
        let target = if wrap {
            raw.rem_euclid(n)
        } else if (0..n).contains(&raw) {
            raw
        } else {
            return;
        };
        let target = target as usize;
        if target == origin.index {
            return;
        }

        let key = match stacking {
            Some(inv) => {
                let dir = (positions[target] - origin.position).normalize_or_zero();
                crate::spatial::quantized_hash(dir, inv)
            }
            None => 0,
        };
        if claim_direction(stacks, key) {
            edges.insert(edge_key(origin.index as u32, target as u32));
        }
    }
}
