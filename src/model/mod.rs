//! # Point & Graph Model
//!
//! Plain data types shared by every stage: points and their attribute bag,
//! packed edge keys, indexed edges and graph nodes.
//!
//! Design rule: no locks, no task handles, no spatial indices here.
//! This module is pure data; the engine modules own the behavior.

pub mod edge;
pub mod node;
pub mod point;
pub mod value;

pub use edge::{adjacency_entry, edge_key, split_adjacency_entry, split_edge_key, IndexedEdge};
pub use node::Node;
pub use point::{AttributeColumn, Attributes, Point, PointSet, Transform};
pub use value::Value;
