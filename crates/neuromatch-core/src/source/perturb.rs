//! Imbalanced pairs with constructed positives.
//!
//! Works like [`ImbalancedSource`] but plans its streams so that every even
//! pair of a batch is a true (target, subgraph) pair: the query is grown
//! inside a freshly drawn target, which then replaces the first-stream graph
//! at that position. Odd pairs keep an unrelated target and are labeled by
//! the oracle. Targets are larger than in the plain imbalanced source.

use super::imbalanced::GraphPool;
use super::{
    check_batch_size, draw_between, BatchOptions, BatchPlan, BatchSource, ImbalancedConfig,
    ImbalancedSource, LabeledBatch, PlannedBatch,
};
use crate::algo::sampling::sample_neigh;
use crate::dataset::DatasetLoader;
use crate::{Error, Graph, Result};
use rand::prelude::*;

/// Size cap used by this source regardless of configuration.
pub const PERTURB_MAX_SIZE: usize = 40;

/// Smallest first-stream target.
pub const PERTURB_MIN_TARGET_SIZE: usize = 20;

/// Whole-graph targets need more nodes than this.
const MIN_WHOLE_TARGET: usize = 5;

/// Imbalanced source whose even pairs are positive by construction.
#[derive(Debug)]
pub struct PerturbSource {
    inner: ImbalancedSource,
}

impl PerturbSource {
    /// Open the configured pool. `max_size` is replaced by
    /// [`PERTURB_MAX_SIZE`] and precomputed positives are switched on.
    pub fn new(config: ImbalancedConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        let pool = GraphPool::open(&config, loader)?;
        Self::with_pool(config, pool)
    }

    /// Source over an explicit pool.
    pub fn with_pool(config: ImbalancedConfig, pool: GraphPool) -> Result<Self> {
        let inner = ImbalancedSource::with_pool(Self::adjust(config), pool, "imbalanced-perturb")?;
        Ok(Self { inner })
    }

    fn adjust(mut config: ImbalancedConfig) -> ImbalancedConfig {
        config.max_size = PERTURB_MAX_SIZE;
        config.use_precomputed_positives = true;
        config
    }

    /// The wrapped imbalanced source.
    pub fn inner(&self) -> &ImbalancedSource {
        &self.inner
    }

    fn whole_target(&mut self, train: bool) -> Result<Graph> {
        let src = &mut self.inner;
        let Some(ds) = src.pool.dataset() else {
            return Err(Error::InvalidConfig(
                "whole targets need a dataset, not generated graphs".into(),
            ));
        };
        let candidates: Vec<&Graph> = ds
            .split(train)
            .iter()
            .filter(|g| g.node_count() > MIN_WHOLE_TARGET)
            .collect();
        candidates
            .choose(&mut src.rng)
            .map(|g| (*g).clone())
            .ok_or(Error::SamplingExhausted {
                size: MIN_WHOLE_TARGET + 1,
                attempts: 0,
            })
    }

    /// Returns (target, query) for position `j` of a batch.
    fn plan_pair(&mut self, j: usize, train: bool) -> Result<(Graph, Graph)> {
        let whole = self.inner.config.use_whole_targets;
        let min = self.inner.config.min_size;
        let attempts = self.inner.config.max_attempts;
        let cap = self.inner.pool.cap(PERTURB_MAX_SIZE, train);
        let constructed = j % 2 == 0;

        let target = if whole {
            self.whole_target(train)?
        } else {
            let size = draw_between(&mut self.inner.rng, PERTURB_MIN_TARGET_SIZE.min(cap), cap);
            self.inner.pool.sample(size, train, attempts, &mut self.inner.rng)?
        };

        let src = &mut self.inner;
        if whole {
            let ds = src.pool.dataset().ok_or_else(|| {
                Error::InvalidConfig("whole targets need a dataset".into())
            })?;
            let high = cap.min(target.node_count());
            let size = draw_between(&mut src.rng, min.min(high), high);
            let (graph, nodes) = sample_neigh(ds.split(train), size, attempts, &mut src.rng)?;
            let query = graph.induced_subgraph(&nodes);
            let target = if constructed { graph.clone() } else { target };
            Ok((target, query))
        } else {
            let tgt_graph = src
                .pool
                .sample(target.node_count(), train, attempts, &mut src.rng)?;
            let n = tgt_graph.node_count();
            let size = draw_between(&mut src.rng, min.min(n), n);
            let (_, nodes) =
                sample_neigh(std::slice::from_ref(&tgt_graph), size, attempts, &mut src.rng)?;
            let query = tgt_graph.induced_subgraph(&nodes);
            let target = if constructed { tgt_graph } else { target };
            Ok((target, query))
        }
    }
}

impl BatchSource for PerturbSource {
    fn prepare(&mut self, total: usize, batch_size: usize, train: bool) -> Result<BatchPlan> {
        check_batch_size(batch_size)?;
        let half = batch_size / 2;
        let mut batches = Vec::with_capacity(total / batch_size);
        for _ in 0..total / batch_size {
            let mut first = Vec::with_capacity(half);
            let mut second = Vec::with_capacity(half);
            for j in 0..half {
                let (target, query) = self.plan_pair(j, train)?;
                first.push(target);
                second.push(query);
            }
            batches.push(PlannedBatch::Paired { first, second });
        }
        Ok(BatchPlan::new(batches))
    }

    fn generate_batch(
        &mut self,
        planned: PlannedBatch,
        train: bool,
        options: &BatchOptions,
    ) -> Result<LabeledBatch> {
        self.inner.generate_batch(planned, train, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::generator::CombinedGenerator;
    use crate::SubgraphMatcher;

    fn ring(n: usize) -> Graph {
        let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        Graph::from_edges(n, &edges)
    }

    #[test]
    fn test_even_pairs_are_true_subgraphs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImbalancedConfig::default()
            .with_sizes(5, 29)
            .with_node_anchored(true)
            .with_cache_dir(dir.path());
        let pool = GraphPool::Synthetic(CombinedGenerator::new(6, 40).unwrap());
        let mut src = PerturbSource::with_pool(config, pool).unwrap();
        assert_eq!(src.inner().config().max_size, PERTURB_MAX_SIZE);

        let plan = src.prepare(8, 8, true).unwrap();
        let planned = plan.iter().next().cloned().unwrap();
        let PlannedBatch::Paired { first, second } = &planned else {
            panic!("expected a paired plan");
        };
        for j in (0..4).step_by(2) {
            assert!(first[j].node_count() >= PERTURB_MIN_TARGET_SIZE);
            assert!(SubgraphMatcher::new(&first[j], &second[j]).is_subgraph());
        }

        let batch = src
            .generate_batch(planned, true, &BatchOptions::default())
            .unwrap();
        assert!(batch.num_positive() >= 2);
        for (t, q) in batch.pos_target.graphs().iter().zip(batch.pos_query.graphs()) {
            assert!(SubgraphMatcher::new(t, q).anchored(true).is_subgraph());
        }
        assert!(src
            .inner()
            .cache()
            .path_for(&src.inner().cache_key())
            .to_string_lossy()
            .contains("imbalanced-perturb-syn-true"));
    }

    #[test]
    fn test_whole_targets_from_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let ds = Dataset::new("rings", vec![ring(12), ring(30)], vec![ring(25)]);
        let config = ImbalancedConfig::new("rings")
            .with_sizes(4, 29)
            .with_whole_targets(true)
            .with_cache_dir(dir.path());
        let mut src = PerturbSource::with_pool(config, GraphPool::Dataset(ds)).unwrap();
        let plan = src.prepare(4, 4, false).unwrap();
        let PlannedBatch::Paired { first, second } = plan.iter().next().unwrap() else {
            panic!("expected a paired plan");
        };
        // Constructed pair: the target is the query's whole source graph.
        assert_eq!(first[0].node_count(), 25);
        assert!(second[0].node_count() <= 25);
        assert!(SubgraphMatcher::new(&first[0], &second[0]).is_subgraph());
    }
}
