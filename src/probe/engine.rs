//! Per-point probe driver over a shared, read-only octree.

use glam::{DQuat, DVec3};
use hashbrown::HashSet;

use super::op::{Origin, ProbeOp};
use super::{Candidate, ProbingSettings};
use crate::model::PointSet;
use crate::spatial::{quantized_hash, Aabb, Octree};
use crate::{Error, Result};

/// Half-size of the box each point occupies in the probe octree.
const POINT_EXTENT: f64 = 0.05;

/// Read a truthy (bool / non-zero number) attribute as a mask.
fn read_mask(points: &PointSet, name: &str) -> Result<Vec<bool>> {
    Ok(points.read_floats(name)?.into_iter().map(|v| v != 0.0).collect())
}

/// Everything needed to probe one point set. Immutable once built, so a
/// single engine is shared by every worker batch.
#[derive(Debug)]
pub struct ProbeEngine {
    shared: Vec<ProbeOp>,
    chained: Vec<ProbeOp>,
    direct: Vec<ProbeOp>,
    positions: Vec<DVec3>,
    rotations: Vec<DQuat>,
    can_generate: Vec<bool>,
    octree: Option<Octree<usize>>,
    /// `1 / stacking_tolerance` when stacking prevention is on.
    stacking: Option<DVec3>,
}

impl ProbeEngine {
    /// Resolve probes and build the octree.
    ///
    /// Fails with [`Error::NoProbes`] when nothing is configured and with
    /// [`Error::InvalidAttribute`] when a radius or mask attribute is missing.
    pub fn new(points: &PointSet, settings: &ProbingSettings) -> Result<Self> {
        if settings.probes.is_empty() {
            return Err(Error::NoProbes);
        }

        let mut shared = Vec::new();
        let mut chained = Vec::new();
        let mut direct = Vec::new();
        for probe in &settings.probes {
            let op = ProbeOp::prepare(probe, points)?;
            if op.requires_direct_processing() {
                direct.push(op);
            } else if op.requires_chain_processing() {
                chained.push(op);
            } else {
                shared.push(op);
            }
        }

        let positions: Vec<DVec3> = match &settings.projection {
            Some(projection) => points.points.iter().map(|p| projection.project(p.position())).collect(),
            None => points.positions(),
        };
        let rotations = points.points.iter().map(|p| p.transform.rotation).collect();

        let can_generate = match &settings.generators {
            Some(name) => read_mask(points, name)?,
            None => vec![true; points.len()],
        };
        let connectable = match &settings.connectables {
            Some(name) => Some(read_mask(points, name)?),
            None => None,
        };

        let spatial = !shared.is_empty() || !chained.is_empty();
        let octree = match Aabb::from_points(positions.iter().copied()) {
            Some(bounds) if spatial => {
                let mut tree = Octree::from_bounds(&bounds.expand_by(POINT_EXTENT));
                for (i, p) in positions.iter().enumerate() {
                    if connectable.as_ref().is_some_and(|mask| !mask[i]) {
                        continue;
                    }
                    tree.add_element(Aabb::from_center_extents(*p, DVec3::splat(POINT_EXTENT)), i);
                }
                Some(tree)
            }
            _ => None,
        };

        let stacking = settings.prevent_stacking.then(|| DVec3::splat(1.0 / settings.stacking_tolerance));

        tracing::debug!(
            io_index = points.io_index,
            shared = shared.len(),
            chained = chained.len(),
            direct = direct.len(),
            "probe engine ready"
        );

        Ok(Self { shared, chained, direct, positions, rotations, can_generate, octree, stacking })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Probe from `index`, adding packed edge keys to `edges`.
    pub fn probe_point(&self, index: usize, edges: &mut HashSet<u64>) {
        if !self.can_generate.get(index).copied().unwrap_or(false) {
            return;
        }

        let origin = Origin { index, position: self.positions[index], rotation: self.rotations[index] };
        let mut stacks = self.stacking.map(|_| HashSet::new());

        if let Some(octree) = &self.octree {
            let mut best: Vec<_> = self.chained.iter().map(|op| op.prepare_best(&origin)).collect();

            let max_radius = self
                .shared
                .iter()
                .chain(&self.chained)
                .map(|op| op.radius.get(index))
                .fold(0.0_f64, f64::max);
            let query = Aabb::from_center_extents(origin.position, DVec3::splat(max_radius.sqrt()));

            let mut candidates: Vec<Candidate> = Vec::new();
            octree.find_elements_with_bounds_test(&query, |&other| {
                if other == index {
                    return;
                }
                let position = self.positions[other];
                let direction = (position - origin.position).normalize_or_zero();
                let key = self.stacking.map_or(0, |inv| quantized_hash(direction, inv));
                let candidate = Candidate::new(origin.position, other, position, key);
                let slot = candidates.len();
                for (op, best) in self.chained.iter().zip(best.iter_mut()) {
                    op.process_candidate_chained(&origin, slot, &candidate, best);
                }
                candidates.push(candidate);
            });

            for (op, best) in self.chained.iter().zip(&best) {
                op.process_best(&origin, best, &candidates, &mut stacks, edges);
            }

            candidates.sort_by(Candidate::by_distance);
            for op in &self.shared {
                op.process_candidates(&origin, &candidates, &mut stacks, edges);
            }
        }

        for op in &self.direct {
            op.process_node(&origin, &self.positions, self.stacking, &mut stacks, edges);
        }
    }

    /// Probe every point in `range` into one batch-local set.
    pub fn probe_range(&self, range: std::ops::Range<usize>) -> HashSet<u64> {
        let mut edges = HashSet::new();
        for index in range {
            self.probe_point(index, &mut edges);
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{edge_key, Value};
    use crate::probe::{DirectionFavor, ProbeKind, ProbeSettings, SearchRadius};

    fn all_in_range(radius: f64) -> ProbingSettings {
        ProbingSettings::default()
            .with_probe(ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(radius)))
    }

    #[test]
    fn test_no_probes_is_an_error() {
        let points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X]);
        assert!(matches!(ProbeEngine::new(&points, &ProbingSettings::default()), Err(Error::NoProbes)));
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X * 2.0]);

        let at = ProbeEngine::new(&points, &all_in_range(2.0)).unwrap();
        assert!(at.probe_range(0..2).contains(&edge_key(0, 1)));

        let below = ProbeEngine::new(&points, &all_in_range(2.0 - 1e-9)).unwrap();
        assert!(below.probe_range(0..2).is_empty());
    }

    #[test]
    fn test_stacking_keeps_nearest() {
        let points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X, DVec3::X * 2.0]);
        let mut settings = all_in_range(5.0);
        settings.prevent_stacking = true;

        let engine = ProbeEngine::new(&points, &settings).unwrap();
        let mut edges = HashSet::new();
        engine.probe_point(0, &mut edges);
        assert_eq!(edges.len(), 1);
        assert!(edges.contains(&edge_key(0, 1)));
    }

    #[test]
    fn test_generator_and_connectable_masks() {
        let mut points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X, DVec3::Y]);
        points.set_attribute(
            "gen",
            Value::Bool(false),
            vec![Value::Bool(true), Value::Bool(false), Value::Bool(false)],
        );
        points.set_attribute("conn", Value::Int(1), vec![Value::Int(1), Value::Int(1), Value::Int(0)]);

        let mut settings = all_in_range(5.0);
        settings.generators = Some("gen".into());
        settings.connectables = Some("conn".into());

        let engine = ProbeEngine::new(&points, &settings).unwrap();
        let edges = engine.probe_range(0..3);
        assert_eq!(edges.len(), 1);
        assert!(edges.contains(&edge_key(0, 1)));

        settings.generators = Some("missing".into());
        assert!(matches!(ProbeEngine::new(&points, &settings), Err(Error::InvalidAttribute { .. })));
    }

    #[test]
    fn test_chained_and_shared_direction_agree() {
        let points = PointSet::from_positions(
            0,
            [DVec3::ZERO, DVec3::new(1.0, 0.1, 0.0), DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 3.0, 0.0)],
        );
        let probe = |chained| {
            ProbingSettings::default().with_probe(ProbeSettings::new(
                ProbeKind::Direction {
                    direction: DVec3::X.into(),
                    max_angle: 30.0,
                    favor: DirectionFavor::Dot,
                    transform_direction: false,
                    chained,
                },
                SearchRadius::Constant(10.0),
            ))
        };
        let a = ProbeEngine::new(&points, &probe(true)).unwrap().probe_range(0..4);
        let b = ProbeEngine::new(&points, &probe(false)).unwrap().probe_range(0..4);
        assert_eq!(a, b);
        assert!(a.contains(&edge_key(0, 2)));
    }
}
