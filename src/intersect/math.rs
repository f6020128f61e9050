//! Segment math for intersection detection.

use glam::DVec3;

/// Below this squared length (or cross product) a segment pair is degenerate.
const EPSILON: f64 = 1e-12;

/// Parameter and position of the point on `a..b` closest to `p`, unclamped.
/// `None` for a zero-length segment.
pub fn project_on_segment(p: DVec3, a: DVec3, b: DVec3) -> Option<(f64, DVec3)> {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 <= EPSILON {
        return None;
    }
    let t = (p - a).dot(ab) / len2;
    Some((t, a + ab * t))
}

/// Closest approach between two segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestApproach {
    /// Parameter along the first segment.
    pub s: f64,
    /// Parameter along the second segment.
    pub t: f64,
    pub on_first: DVec3,
    pub on_second: DVec3,
}

impl ClosestApproach {
    pub fn distance_squared(&self) -> f64 {
        self.on_first.distance_squared(self.on_second)
    }

    pub fn midpoint(&self) -> DVec3 {
        self.on_first.lerp(self.on_second, 0.5)
    }
}

/// Closest points between segments `p0..p1` and `q0..q1`, parameters clamped
/// to `[0, 1]`. `None` when either segment is degenerate or they are parallel.
pub fn segment_closest_approach(p0: DVec3, p1: DVec3, q0: DVec3, q1: DVec3) -> Option<ClosestApproach> {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.length_squared();
    let e = d2.length_squared();
    if a <= EPSILON || e <= EPSILON {
        return None;
    }

    let b = d1.dot(d2);
    let c = d1.dot(r);
    let f = d2.dot(r);
    let denom = a * e - b * b;
    if denom <= EPSILON * a * e {
        return None;
    }

    let mut s = ((b * f - c * e) / denom).clamp(0.0, 1.0);
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }

    Some(ClosestApproach { s, t, on_first: p0 + d1 * s, on_second: q0 + d2 * t })
}

/// Acute angle between two lines, in degrees (`0..=90`).
pub fn line_angle_degrees(d1: DVec3, d2: DVec3) -> f64 {
    let (a, b) = (d1.normalize_or_zero(), d2.normalize_or_zero());
    a.dot(b).abs().clamp(0.0, 1.0).acos().to_degrees()
}
