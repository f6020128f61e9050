//! Axis-aligned bounding box.

use glam::DVec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    pub fn from_center_extents(center: DVec3, extents: DVec3) -> Self {
        Self::new(center - extents, center + extents)
    }

    pub fn from_segment(a: DVec3, b: DVec3) -> Self {
        Self::new(a, b)
    }

    pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self::new(first, first), |b, p| Self { min: b.min.min(p), max: b.max.max(p) }))
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    pub fn expand_by(&self, amount: f64) -> Self {
        Self { min: self.min - DVec3::splat(amount), max: self.max + DVec3::splat(amount) }
    }

    /// Inclusive overlap test: touching boxes intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// True if `other` lies fully inside (inclusive).
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }
}
