//! Tolerance-quantized hashing of vectors.

use glam::DVec3;

const AXIS_BITS: u32 = 21;
const AXIS_MASK: u64 = (1 << AXIS_BITS) - 1;

/// Quantize `v` by `inv_tolerance` (i.e. `1 / tolerance` per axis) and pack
/// the three cells into one key. Vectors closer than the tolerance mostly
/// share a key; the rounding boundary is the usual grid caveat.
#[inline]
pub fn quantized_hash(v: DVec3, inv_tolerance: DVec3) -> u64 {
    let q = (v * inv_tolerance).round();
    let pack = |c: f64| (c as i64 as u64) & AXIS_MASK;
    (pack(q.x) << (AXIS_BITS * 2)) | (pack(q.y) << AXIS_BITS) | pack(q.z)
}

/// Integer grid cell of `p` for cell size `size` (per axis).
#[inline]
pub fn grid_cell(p: DVec3, size: DVec3) -> (i64, i64, i64) {
    let c = (p / size).floor();
    (c.x as i64, c.y as i64, c.z as i64)
}
