//! # pcgraph — Procedural Graph Construction over Point Clouds
//!
//! Builds indexed undirected graphs from unordered points and ordered paths,
//! fuses near-coincident vertices, and resolves point-edge and edge-edge
//! intersections before compiling the result into output clusters.
//!
//! ## Design Principles
//!
//! 1. **Arena ownership**: the graph owns every node and edge by value; everything else holds indices
//! 2. **Invalidate, never remove**: edge and node slots stay put so queued work keeps valid indices
//! 3. **Closed variant sets**: probe kinds and blend modes are enums dispatched with a match
//! 4. **Submit, don't spawn**: all parallel work goes through a [`TaskManager`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use glam::DVec3;
//! use pcgraph::{ConnectPoints, PointSet, ProcessorConfig, TaskManager};
//!
//! # fn example() -> pcgraph::Result<()> {
//! let config = ProcessorConfig::from_json(r#"{
//!     "probing": { "probes": [ { "kind": "all_in_range", "radius": { "constant": 1.5 } } ] }
//! }"#)?;
//!
//! let points = PointSet::from_positions(0, [DVec3::ZERO, DVec3::X, DVec3::Y]);
//! let output = ConnectPoints::new(Arc::new(config), TaskManager::rayon()).process(&points)?;
//!
//! println!("{} vertices, {} edges", output.vertex_count(), output.edge_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Probing | [`probe`] | Per-point radius / direction / index probes over an octree |
//! | Fusion | [`compound`] | Tolerance-bucketed merge of coincident path vertices |
//! | Building | [`graph`] | Dedup, adjacency, clusters, output writing |
//! | Intersections | [`intersect`] | Point-edge and edge-edge splits with metadata blending |
//! | Orchestration | [`processor`] | The compound state machine and the two entry processors |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod spatial;
pub mod mt;
pub mod blend;
pub mod probe;
pub mod compound;
pub mod graph;
pub mod intersect;
pub mod processor;
pub mod config;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    IndexedEdge, Node, Point, PointSet, Transform, Value,
    edge_key, split_edge_key,
};

// ============================================================================
// Re-exports: Engine
// ============================================================================

pub use blend::{BlendMode, BlendingSettings, MetadataBlender};
pub use compound::{CompoundGraph, FuseSettings, FusedGraph, PointRef};
pub use graph::{Graph, GraphBuilder, GraphBuilderSettings, GraphOutput, OutputContext};
pub use intersect::{EdgeEdgeSettings, PointEdgeSettings};
pub use mt::{TaskGroup, TaskManager};
pub use probe::{DirectionSource, ProbeKind, ProbeSettings, ProbingSettings, SearchRadius};

// ============================================================================
// Re-exports: Processors
// ============================================================================

pub use config::ProcessorConfig;
pub use processor::{CompoundProcessor, CompoundState, ConnectPoints, Outcome, PathsToClusters};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Input {io_index} has {count} point(s), at least 2 are required")]
    NotEnoughPoints { io_index: usize, count: usize },

    #[error("No probe configured")]
    NoProbes,

    #[error("Graph for input {io_index} compiled with no valid edges")]
    CompilationFailed { io_index: usize },

    #[error("Task '{task}' failed")]
    TaskFailed { task: &'static str },

    #[error("Processing aborted")]
    Aborted,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
