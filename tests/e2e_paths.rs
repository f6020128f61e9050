//! End-to-end tests for turning ordered paths into clusters.
//!
//! Each test exercises: config -> path edges -> (fusion) -> compile -> output.

use std::sync::Arc;

use glam::DVec3;
use pcgraph::processor::COMPOUND_IO_INDEX;
use pcgraph::{PathsToClusters, PointSet, ProcessorConfig, TaskManager, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

fn paths(json: &str, manager: TaskManager) -> PathsToClusters {
    PathsToClusters::new(Arc::new(ProcessorConfig::from_json(json).unwrap()), manager)
}

fn path(io_index: usize, positions: &[(f64, f64)]) -> PointSet {
    PointSet::from_positions(io_index, positions.iter().map(|&(x, y)| DVec3::new(x, y, 0.0)))
}

// ============================================================================
// 1. Separate paths stay separate
// ============================================================================

#[test]
fn test_separate_paths_one_output_each() {
    let a = path(0, &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    let b = path(1, &[(2.0, 0.0), (3.0, 0.0)]);

    let ctx = paths("{}", TaskManager::inline()).process_all(&[a, b]);

    assert_eq!(ctx.vertices.len(), 2);
    assert_eq!(ctx.vertices[0].len(), 3);
    assert_eq!(ctx.vertices[1].len(), 2);
    assert_eq!(ctx.edges.iter().map(PointSet::len).sum::<usize>(), 3);
    assert!(ctx.suppressed.is_empty());
}

#[test]
fn test_closed_loop_adds_closing_edge() {
    let triangle = path(0, &[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);

    let open = paths("{}", TaskManager::inline()).process_all(std::slice::from_ref(&triangle));
    let closed = paths(r#"{"closed_loop": true}"#, TaskManager::inline()).process_all(&[triangle]);

    assert_eq!(open.edges[0].len(), 2);
    assert_eq!(closed.edges[0].len(), 3);
}

#[test]
fn test_two_point_closed_loop_has_single_edge() {
    let segment = path(0, &[(0.0, 0.0), (1.0, 0.0)]);
    let ctx = paths(r#"{"closed_loop": true}"#, TaskManager::inline()).process_all(&[segment]);
    assert_eq!(ctx.edges[0].len(), 1);
}

#[test]
fn test_edge_points_carry_blended_endpoints() {
    let mut a = path(0, &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
    a.set_attribute("heat", Value::Float(0.0), vec![Value::Float(1.0), Value::Float(3.0), Value::Float(9.0)]);

    let ctx = paths(r#"{"edges_blending": {"default_mode": "min"}}"#, TaskManager::inline()).process_all(&[a]);

    let edges = &ctx.edges[0];
    assert_eq!(edges.value("heat", 0), Some(&Value::Float(1.0)));
    assert_eq!(edges.value("heat", 1), Some(&Value::Float(3.0)));
}

// ============================================================================
// 2. Fusion merges coincident vertices across paths
// ============================================================================

#[test]
fn test_fused_paths_share_vertices() {
    let config = r#"{"fuse_paths": true, "fuse": {"tolerance": 0.01}}"#;
    // A star: three paths leaving (near) the same center.
    let a = path(0, &[(0.0, 0.0), (1.0, 0.0)]);
    let b = path(1, &[(0.001, 0.0), (0.0, 1.0)]);
    let c = path(2, &[(0.0, 0.002), (-1.0, 0.0)]);

    let ctx = paths(config, TaskManager::rayon()).process_all(&[a, b, c]);

    assert_eq!(ctx.vertices.len(), 1);
    let vertices = &ctx.vertices[0];
    assert_eq!(vertices.io_index, COMPOUND_IO_INDEX);
    assert_eq!(vertices.len(), 4);
    assert_eq!(ctx.edges.len(), 1);
    assert_eq!(ctx.edges[0].len(), 3);
}

#[test]
fn test_fused_attributes_are_blended() {
    let config = r#"{"fuse_paths": true, "fuse": {"tolerance": 0.01}, "points_blending": {"default_mode": "average"}}"#;
    let mut a = path(0, &[(0.0, 0.0), (1.0, 0.0)]);
    let mut b = path(1, &[(1.0, 0.0), (2.0, 0.0)]);
    a.set_attribute("heat", Value::Float(0.0), vec![Value::Float(1.0), Value::Float(2.0)]);
    b.set_attribute("heat", Value::Float(0.0), vec![Value::Float(4.0), Value::Float(8.0)]);

    let ctx = paths(config, TaskManager::inline()).process_all(&[a, b]);
    let vertices = &ctx.vertices[0];

    let shared = (0..vertices.len())
        .find(|&i| vertices.points[i].position().distance(DVec3::X) < 1e-9)
        .unwrap();
    assert_eq!(vertices.value("heat", shared), Some(&Value::Float(3.0)));
}

#[test]
fn test_fused_without_usable_paths_is_suppressed() {
    let config = r#"{"fuse_paths": true}"#;
    let ctx = paths(config, TaskManager::inline()).process_all(&[path(0, &[(0.0, 0.0)]), PointSet::new(1)]);
    assert!(ctx.is_empty());
    assert_eq!(ctx.suppressed, vec![COMPOUND_IO_INDEX]);
}

#[test]
fn test_cancelled_fusion_is_suppressed() {
    let manager = TaskManager::inline();
    manager.cancel();
    let ctx = paths(r#"{"fuse_paths": true}"#, manager)
        .process_all(&[path(0, &[(0.0, 0.0), (1.0, 0.0)])]);
    assert!(ctx.is_empty());
}

// ============================================================================
// 3. Fusion is deterministic under scheduling and input order
// ============================================================================

fn arb_path() -> impl Strategy<Value = Vec<(f64, f64)>> {
    proptest::collection::vec((0i32..6, 0i32..6, 0i32..3), 2..8).prop_map(|raw| {
        raw.into_iter()
            .map(|(x, y, jitter)| (x as f64 + jitter as f64 * 0.001, y as f64))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_fusion_is_deterministic(raw in proptest::collection::vec(arb_path(), 1..5)) {
        let inputs: Vec<PointSet> = raw.iter().enumerate().map(|(io, p)| path(io, p)).collect();
        let reversed: Vec<PointSet> = inputs.iter().rev().cloned().collect();
        let config = r#"{"fuse_paths": true, "fuse": {"tolerance": 0.01}}"#;

        let inline = paths(config, TaskManager::inline()).process_fused(&inputs).ok();
        let pooled = paths(config, TaskManager::rayon()).process_fused(&reversed).ok();
        prop_assert_eq!(inline, pooled);
    }
}
