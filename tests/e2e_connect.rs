//! End-to-end tests for connecting unordered points.
//!
//! Each test exercises: config -> probe -> graph builder -> compound processor -> output.

use std::collections::BTreeSet;
use std::sync::Arc;

use glam::DVec3;
use pcgraph::probe::DirectionFavor;
use pcgraph::{
    ConnectPoints, Error, GraphOutput, PointSet, ProbeKind, ProbeSettings, ProbingSettings, ProcessorConfig,
    SearchRadius, TaskManager, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

type Segment = ([i64; 3], [i64; 3]);

fn unit_square(io_index: usize) -> PointSet {
    PointSet::from_positions(
        io_index,
        [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::new(1.0, 1.0, 0.0)],
    )
}

fn key(p: DVec3) -> [i64; 3] {
    [(p.x * 1000.0).round() as i64, (p.y * 1000.0).round() as i64, (p.z * 1000.0).round() as i64]
}

/// Output edges as unordered position pairs, independent of vertex order.
fn segments(output: &GraphOutput) -> BTreeSet<Segment> {
    output
        .edge_endpoints()
        .into_iter()
        .map(|(s, e)| {
            let a = key(output.vertices.points[s].position());
            let b = key(output.vertices.points[e].position());
            if a <= b { (a, b) } else { (b, a) }
        })
        .collect()
}

fn direction(dir: DVec3, chained: bool) -> ProbeSettings {
    ProbeSettings::new(
        ProbeKind::Direction {
            direction: dir.into(),
            max_angle: 45.0,
            favor: DirectionFavor::Dist,
            transform_direction: false,
            chained,
        },
        SearchRadius::Constant(2.0),
    )
}

fn connect(probing: ProbingSettings, manager: TaskManager) -> ConnectPoints {
    ConnectPoints::new(Arc::new(ProcessorConfig { probing, ..ProcessorConfig::default() }), manager)
}

// ============================================================================
// 1. Direction probes connect a unit square along its sides only
// ============================================================================

#[test]
fn test_unit_square_direction_probes() {
    let probing = ProbingSettings::default()
        .with_probe(direction(DVec3::X, false))
        .with_probe(direction(DVec3::Y, false));

    let output = connect(probing, TaskManager::inline()).process(&unit_square(0)).unwrap();

    assert_eq!(output.vertex_count(), 4);
    assert_eq!(output.edge_count(), 4);
    assert_eq!(output.cluster_count(), 1);

    let diagonal = (key(DVec3::ZERO), key(DVec3::new(1.0, 1.0, 0.0)));
    assert!(!segments(&output).contains(&diagonal));
}

// ============================================================================
// 2. All-in-range adds the diagonals
// ============================================================================

#[test]
fn test_unit_square_all_in_range() {
    let json = r#"{
        "probing": { "probes": [ { "kind": "all_in_range", "radius": { "constant": 2.0 } } ] }
    }"#;
    let config = ProcessorConfig::from_json(json).unwrap();

    let output = ConnectPoints::new(Arc::new(config), TaskManager::inline())
        .process(&unit_square(0))
        .unwrap();

    assert_eq!(output.vertex_count(), 4);
    assert_eq!(output.edge_count(), 6);
}

// ============================================================================
// 3. Chained and shared direction probes agree
// ============================================================================

#[test]
fn test_chained_direction_matches_shared() {
    let points = PointSet::from_positions(
        0,
        (0..5).flat_map(|x| (0..5).map(move |y| DVec3::new(x as f64, y as f64, 0.0))),
    );

    let shared = ProbingSettings::default()
        .with_probe(direction(DVec3::X, false))
        .with_probe(direction(DVec3::Y, false));
    let chained = ProbingSettings::default()
        .with_probe(direction(DVec3::X, true))
        .with_probe(direction(DVec3::Y, true));

    let a = connect(shared, TaskManager::inline()).process(&points).unwrap();
    let b = connect(chained, TaskManager::inline()).process(&points).unwrap();

    // 5x5 grid: 4 horizontal + 4 vertical edges per row/column.
    assert_eq!(a.edge_count(), 40);
    assert_eq!(segments(&a), segments(&b));
}

// ============================================================================
// 4. Attribute carried through to output vertices
// ============================================================================

#[test]
fn test_attributes_survive_to_output() {
    let mut points = unit_square(0);
    points.set_attribute(
        "label",
        Value::String(String::new()),
        vec!["a".into(), "b".into(), "c".into(), "d".into()],
    );
    let probing = ProbingSettings::default()
        .with_probe(ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(1.0)));

    let output = connect(probing, TaskManager::inline()).process(&points).unwrap();

    let labels: BTreeSet<String> = (0..output.vertex_count())
        .filter_map(|i| output.vertices.value("label", i)?.as_str().map(str::to_owned))
        .collect();
    assert_eq!(labels, ["a", "b", "c", "d"].into_iter().map(String::from).collect());
}

// ============================================================================
// 5. Rejected inputs never affect their siblings
// ============================================================================

#[test]
fn test_rejected_inputs_are_suppressed() {
    let probing = ProbingSettings::default()
        .with_probe(ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(2.0)));
    let processor = connect(probing, TaskManager::inline());

    let empty = PointSet::new(1);
    let single = PointSet::from_positions(2, [DVec3::ZERO]);
    let isolated = PointSet::from_positions(3, [DVec3::ZERO, DVec3::X * 100.0]);

    let ctx = processor.process_all(&[unit_square(0), empty, single, isolated]);

    assert_eq!(ctx.vertices.len(), 1);
    assert_eq!(ctx.suppressed, vec![1, 2, 3]);

    let err = processor.process(&PointSet::from_positions(2, [DVec3::ZERO])).unwrap_err();
    assert!(matches!(err, Error::NotEnoughPoints { io_index: 2, count: 1 }));
}

#[test]
fn test_missing_radius_attribute_rejected() {
    let probing = ProbingSettings::default().with_probe(ProbeSettings::new(
        ProbeKind::AllInRange,
        SearchRadius::Attribute("reach".into()),
    ));
    let err = connect(probing, TaskManager::inline()).process(&unit_square(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidAttribute { .. }));
}

// ============================================================================
// 6. Cancellation produces no output
// ============================================================================

#[test]
fn test_cancelled_manager_aborts() {
    let manager = TaskManager::inline();
    manager.cancel();
    let probing = ProbingSettings::default()
        .with_probe(ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(2.0)));

    let err = connect(probing, manager).process(&unit_square(0)).unwrap_err();
    assert!(matches!(err, Error::Aborted));
}

// ============================================================================
// 7. Thread pool and inline runs agree
// ============================================================================

#[test]
fn test_rayon_matches_inline() {
    let points = PointSet::from_positions(
        0,
        (0..2000).map(|i| DVec3::new((i % 50) as f64, (i / 50) as f64, ((i * 7) % 3) as f64)),
    );
    let probing = ProbingSettings::default()
        .with_probe(ProbeSettings::new(ProbeKind::Closest { max_connections: 2 }, SearchRadius::Constant(1.5)));

    let inline = connect(probing.clone(), TaskManager::inline()).process(&points).unwrap();
    let pooled = connect(probing, TaskManager::rayon()).process(&points).unwrap();

    assert_eq!(inline, pooled);
}

// ============================================================================
// 8. Edge set does not depend on input order
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_input_order_does_not_change_edges(
        raw in proptest::collection::btree_set((0i8..12, 0i8..12), 2..40)
    ) {
        let positions: Vec<DVec3> = raw.iter().map(|&(x, y)| DVec3::new(x as f64, y as f64, 0.0)).collect();
        let forward = PointSet::from_positions(0, positions.iter().copied());
        let backward = PointSet::from_positions(0, positions.iter().rev().copied());

        let probing = ProbingSettings::default()
            .with_probe(ProbeSettings::new(ProbeKind::AllInRange, SearchRadius::Constant(2.5)));
        let processor = connect(probing, TaskManager::inline());

        let a = processor.process(&forward).ok().map(|o| segments(&o));
        let b = processor.process(&backward).ok().map(|o| segments(&o));
        prop_assert_eq!(a, b);
    }
}
