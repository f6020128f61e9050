//! Candidates discovered around one origin point.

use std::cmp::Ordering;

use glam::DVec3;

/// A neighbour found by the spatial query around an origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub point_index: usize,
    /// Unit vector from the origin towards the candidate.
    pub direction: DVec3,
    /// Squared distance to the origin.
    pub distance: f64,
    /// Quantized direction hash, `0` when stacking prevention is off.
    pub stacking_key: u64,
}

impl Candidate {
    pub fn new(origin: DVec3, point_index: usize, position: DVec3, stacking_key: u64) -> Self {
        Self {
            point_index,
            direction: (position - origin).normalize_or_zero(),
            distance: origin.distance_squared(position),
            stacking_key,
        }
    }

    /// Nearest first, lower point index on ties.
    pub fn by_distance(a: &Candidate, b: &Candidate) -> Ordering {
        a.distance.total_cmp(&b.distance).then(a.point_index.cmp(&b.point_index))
    }
}

/// Running best for one chained probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestCandidate {
    /// Index into the candidate list, not a point index.
    pub slot: Option<usize>,
    pub point_index: usize,
    pub dot: f64,
    pub distance: f64,
}

impl Default for BestCandidate {
    fn default() -> Self {
        Self { slot: None, point_index: usize::MAX, dot: f64::NEG_INFINITY, distance: f64::INFINITY }
    }
}

impl BestCandidate {
    pub fn is_set(&self) -> bool {
        self.slot.is_some()
    }

    pub fn take(&mut self, slot: usize, candidate: &Candidate, dot: f64) {
        self.slot = Some(slot);
        self.point_index = candidate.point_index;
        self.dot = dot;
        self.distance = candidate.distance;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_direction_points_away_from_origin() {
        let c = Candidate::new(DVec3::ONE, 3, DVec3::new(1.0, 4.0, 1.0), 0);
        assert_eq!(c.direction, DVec3::Y);
        assert_eq!(c.distance, 9.0);
    }

    #[test]
    fn test_sort_breaks_ties_by_index() {
        let mut list = vec![
            Candidate::new(DVec3::ZERO, 5, DVec3::X, 0),
            Candidate::new(DVec3::ZERO, 2, DVec3::Y, 0),
            Candidate::new(DVec3::ZERO, 9, DVec3::ZERO + DVec3::X * 0.5, 0),
        ];
        list.sort_by(Candidate::by_distance);
        let order: Vec<usize> = list.iter().map(|c| c.point_index).collect();
        assert_eq!(order, vec![9, 2, 5]);
    }
}
