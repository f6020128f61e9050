//! Property tests for graph dedup and compilation.

use std::collections::BTreeSet;

use glam::DVec3;
use pcgraph::{edge_key, Graph, GraphBuilder, GraphBuilderSettings};
use proptest::prelude::*;

fn line_positions(n: usize) -> Vec<DVec3> {
    (0..n).map(|i| DVec3::new(i as f64, (i * i % 7) as f64, 0.0)).collect()
}

fn valid_keys(graph: &Graph) -> BTreeSet<u64> {
    graph.edges.iter().filter(|e| e.valid).map(|e| e.key()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Duplicates in either orientation collapse to one edge and self-loops
    /// never land, whatever order the pairs arrive in.
    #[test]
    fn test_dedup_is_order_independent(pairs in proptest::collection::vec((0u32..16, 0u32..16), 0..60)) {
        let mut forward = Graph::with_nodes(16);
        let mut backward = Graph::with_nodes(16);
        for &(a, b) in &pairs {
            forward.insert_edge(a, b, Some(0));
        }
        for &(a, b) in pairs.iter().rev() {
            backward.insert_edge(b, a, Some(1));
        }

        let expected: BTreeSet<u64> = pairs.iter().filter(|(a, b)| a != b).map(|&(a, b)| edge_key(a, b)).collect();
        prop_assert_eq!(valid_keys(&forward), expected.clone());
        prop_assert_eq!(valid_keys(&backward), expected.clone());
        prop_assert_eq!(forward.valid_edge_count(), expected.len());
        prop_assert!(forward.edges.iter().all(|e| e.start != e.end));
    }

    /// Compiling the same key set twice, collected in different orders,
    /// gives identical graphs and clusters.
    #[test]
    fn test_compile_is_deterministic(pairs in proptest::collection::vec((0u32..24, 0u32..24), 1..80)) {
        let keys: Vec<u64> = pairs.iter().map(|&(a, b)| edge_key(a, b)).collect();
        let reversed: Vec<u64> = keys.iter().rev().copied().collect();
        let positions = line_positions(24);

        let mut first = GraphBuilder::new(0, 24, GraphBuilderSettings::default());
        first.insert_edges(&keys, Some(0));
        let mut second = GraphBuilder::new(0, 24, GraphBuilderSettings::default());
        second.insert_edges(&reversed, Some(0));

        let ok_first = first.compile(&positions);
        let ok_second = second.compile(&positions);

        prop_assert_eq!(ok_first, ok_second);
        prop_assert_eq!(&first.graph.edges, &second.graph.edges);
        prop_assert_eq!(
            first.graph.nodes.iter().map(|n| (n.valid, n.adjacency.to_vec())).collect::<Vec<_>>(),
            second.graph.nodes.iter().map(|n| (n.valid, n.adjacency.to_vec())).collect::<Vec<_>>()
        );
        prop_assert_eq!(&first.subgraphs, &second.subgraphs);
    }
}
