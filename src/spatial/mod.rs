//! # Spatial primitives
//!
//! Bounding boxes, an octree for candidate lookups, and quantized hashes
//! used for stacking prevention and tolerance bucketing.

pub mod aabb;
pub mod hash;
pub mod octree;

pub use aabb::Aabb;
pub use hash::{grid_cell, quantized_hash};
pub use octree::Octree;
