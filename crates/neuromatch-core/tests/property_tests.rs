//! Property-based tests for subgraph sampling, labeling and batching.
//!
//! These tests verify invariants that should hold for any input graph:
//! - Sampled node sets are connected and of the requested size
//! - Induced samples are recognized by the oracle, anchored at their start
//! - Batches preserve node and edge counts
//! - Cached labels come back unchanged

use neuromatch_core::petgraph::graph::NodeIndex;
use neuromatch_core::{batch_graphs, sample_connected, Graph, SubgraphMatcher};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

/// Random connected graph: a random spanning tree plus extra edges.
fn arb_connected_graph(max_nodes: usize) -> impl Strategy<Value = Graph> {
    (2..=max_nodes).prop_flat_map(|n| {
        let parents = proptest::collection::vec(any::<prop::sample::Index>(), n - 1);
        let extra = proptest::collection::vec((0..n, 0..n), 0..n);
        (Just(n), parents, extra).prop_map(|(n, parents, extra)| {
            let mut edges: Vec<(usize, usize)> = parents
                .iter()
                .enumerate()
                .map(|(i, p)| (i + 1, p.index(i + 1)))
                .collect();
            edges.extend(extra.into_iter().filter(|(a, b)| a != b));
            Graph::from_edges(n, &edges)
        })
    })
}

mod sampling_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn sample_is_connected_and_exact(
            graph in arb_connected_graph(30),
            frac in 0.0f64..1.0,
            seed in any::<u64>(),
        ) {
            let size = 1 + (frac * (graph.node_count() - 1) as f64) as usize;
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let nodes = sample_connected(&graph, size, 1000, &mut rng).unwrap();

            prop_assert_eq!(nodes.len(), size);
            let mut dedup = nodes.clone();
            dedup.sort();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), size, "repeated nodes in {:?}", nodes);
            prop_assert!(graph.is_connected_subset(&nodes));
        }

        #[test]
        fn induced_sample_embeds_at_anchor(
            graph in arb_connected_graph(16),
            frac in 0.0f64..1.0,
            seed in any::<u64>(),
        ) {
            let size = 1 + (frac * (graph.node_count() - 1) as f64).min(7.0) as usize;
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let nodes = sample_connected(&graph, size, 1000, &mut rng).unwrap();

            let mut target = graph.clone();
            target.set_anchor(nodes[0]);
            let query = target.induced_subgraph(&nodes);

            prop_assert_eq!(query.anchor(), Some(NodeIndex::new(0)));
            let embedding = SubgraphMatcher::new(&target, &query)
                .anchored(true)
                .find_embedding();
            prop_assert!(embedding.is_some());
            prop_assert_eq!(embedding.unwrap()[0], nodes[0]);
        }

        #[test]
        fn oversized_request_fails(graph in arb_connected_graph(10), seed in any::<u64>()) {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            prop_assert!(sample_connected(&graph, graph.node_count() + 1, 10, &mut rng).is_err());
            prop_assert!(sample_connected(&graph, 0, 10, &mut rng).is_err());
        }
    }
}

mod batch_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn batch_preserves_counts(graphs in proptest::collection::vec(arb_connected_graph(12), 0..6)) {
            let nodes: usize = graphs.iter().map(Graph::node_count).sum();
            let edges: usize = graphs.iter().map(Graph::edge_count).sum();
            let count = graphs.len();

            let batch = batch_graphs(graphs, None).unwrap();
            prop_assert_eq!(batch.num_graphs(), count);
            prop_assert_eq!(batch.num_nodes(), nodes);
            prop_assert_eq!(batch.edge_index().len(), 2 * edges);
            prop_assert_eq!(batch.ptr().len(), count + 1);
            let membership = batch.batch_index();
            let within_graph = batch
                .edge_index()
                .iter()
                .all(|&(a, b)| membership[a] == membership[b]);
            prop_assert!(within_graph);
        }

        #[test]
        fn explicit_anchors_mark_one_node_per_graph(
            graphs in proptest::collection::vec(arb_connected_graph(12), 1..6),
        ) {
            let anchors: Vec<NodeIndex> = graphs
                .iter()
                .map(|g| NodeIndex::new(g.node_count() - 1))
                .collect();
            let count = graphs.len();
            let batch = batch_graphs(graphs, Some(&anchors)).unwrap();
            let column = batch.anchor().unwrap();
            prop_assert_eq!(column.sum() as usize, count);
            for (i, &a) in anchors.iter().enumerate() {
                prop_assert_eq!(column[batch.ptr()[i] + a.index()], 1.0);
            }
        }
    }
}

mod cache_props {
    use super::*;
    use neuromatch_core::cache::{CacheKey, LabelCache, LabeledGraphs};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn cache_roundtrip(
            pairs in proptest::collection::vec(
                (arb_connected_graph(10), arb_connected_graph(10), any::<bool>()),
                0..6,
            ),
            batch_idx in 0usize..1000,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let cache = LabelCache::new(dir.path());
            let key = CacheKey {
                prefix: "imbalanced".into(),
                dataset: "Syn".into(),
                node_anchored: true,
                use_whole_targets: false,
                use_feats: false,
                target_larger: true,
                batch_idx,
            };

            let mut graphs = LabeledGraphs::default();
            for (t, q, positive) in pairs {
                graphs.push(t, q, positive);
            }
            cache.store(&key, &graphs).unwrap();
            let loaded = cache.load(&key).unwrap().unwrap();

            prop_assert_eq!(loaded.num_positive(), graphs.num_positive());
            prop_assert_eq!(loaded.num_negative(), graphs.num_negative());
            for (a, b) in loaded.pos_a.iter().zip(&graphs.pos_a) {
                prop_assert_eq!(a.node_count(), b.node_count());
                prop_assert_eq!(a.edges().collect::<Vec<_>>(), b.edges().collect::<Vec<_>>());
            }
            let expected = format!("imbalanced-syn-true-false-false-true-{batch_idx}");
            prop_assert!(cache.path_for(&key).ends_with(&expected));
        }
    }
}
