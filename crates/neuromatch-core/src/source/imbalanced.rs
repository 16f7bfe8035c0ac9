//! Oracle-labeled pairs with a persistent label cache.
//!
//! [`BatchSource::prepare`] draws two independent graph streams; each batch
//! pairs `first[i]` with `second[i]` and asks the isomorphism oracle whether
//! the second embeds in the first. Most random pairs are not subgraphs of one
//! another, so the label distribution is skewed toward negatives.
//!
//! Labeling is expensive, so finished batches are written to the
//! [`LabelCache`] under a key built from the configuration and a batch
//! counter that advances on every call. A later run with the same
//! configuration replays the cached batches instead of the planned graphs.

use super::{
    add_anchor, check_batch_size, check_sizes, draw_between, reseed, BatchOptions, BatchPlan,
    BatchSource, LabeledBatch, PlannedBatch, SourceRng,
};
use crate::algo::sampling::{sample_neigh, DEFAULT_MAX_ATTEMPTS};
use crate::cache::{CacheKey, LabelCache, LabeledGraphs, DEFAULT_CACHE_DIR};
use crate::dataset::{Dataset, DatasetLoader, SYNTHETIC};
use crate::generator::{CombinedGenerator, SyntheticGenerator};
use crate::{Error, Graph, Result, SubgraphMatcher};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Configuration of [`ImbalancedSource`] and [`super::PerturbSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImbalancedConfig {
    /// Dataset name, or `syn` for generated graphs.
    pub dataset: String,
    /// Give every graph a random anchor.
    pub node_anchored: bool,
    /// Smallest sample size.
    pub min_size: usize,
    /// Largest sample size.
    pub max_size: usize,
    /// Use whole dataset graphs as the first stream.
    pub use_whole_targets: bool,
    /// Keep stored node features.
    pub use_feats: bool,
    /// Swap each pair so the first graph is the larger.
    pub target_larger: bool,
    /// Label every even pair positive without running the oracle.
    pub use_precomputed_positives: bool,
    /// Directory of cached labeled batches.
    pub cache_dir: PathBuf,
    /// Growth attempts before giving up on a sample.
    pub max_attempts: usize,
    /// Initial RNG seed.
    pub seed: u64,
}

impl Default for ImbalancedConfig {
    fn default() -> Self {
        Self {
            dataset: SYNTHETIC.into(),
            node_anchored: false,
            min_size: 5,
            max_size: 29,
            use_whole_targets: false,
            use_feats: false,
            target_larger: true,
            use_precomputed_positives: false,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: 0,
        }
    }
}

impl ImbalancedConfig {
    /// Config for `dataset` with default knobs.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Set the size bounds.
    pub fn with_sizes(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Enable node anchoring.
    pub fn with_node_anchored(mut self, node_anchored: bool) -> Self {
        self.node_anchored = node_anchored;
        self
    }

    /// Use whole dataset graphs as targets.
    pub fn with_whole_targets(mut self, use_whole_targets: bool) -> Self {
        self.use_whole_targets = use_whole_targets;
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Keep stored node features.
    pub fn with_feats(mut self, use_feats: bool) -> Self {
        self.use_feats = use_feats;
        self
    }

    /// Set the initial seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Where imbalanced sources draw graphs from.
#[derive(Debug)]
pub enum GraphPool {
    /// Samples of a stored dataset.
    Dataset(Dataset),
    /// Freshly generated graphs.
    Synthetic(CombinedGenerator),
}

impl GraphPool {
    pub(crate) fn open(config: &ImbalancedConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        if config.dataset == SYNTHETIC {
            return Ok(GraphPool::Synthetic(CombinedGenerator::new(
                config.min_size + 1,
                config.max_size,
            )?));
        }
        let dataset = loader.load(&config.dataset, config.use_feats)?;
        dataset.ensure_nonempty()?;
        Ok(GraphPool::Dataset(dataset))
    }

    /// Induced connected sample with `size` nodes, or a generated graph.
    pub(crate) fn sample(
        &self,
        size: usize,
        train: bool,
        max_attempts: usize,
        rng: &mut SourceRng,
    ) -> Result<Graph> {
        match self {
            GraphPool::Dataset(ds) => {
                let (graph, nodes) = sample_neigh(ds.split(train), size, max_attempts, rng)?;
                Ok(graph.induced_subgraph(&nodes))
            }
            GraphPool::Synthetic(generator) => Ok(generator.generate(size, rng)),
        }
    }

    /// Size cap for samples: `max_size`, or less if the split is smaller.
    pub(crate) fn cap(&self, max_size: usize, train: bool) -> usize {
        match self {
            GraphPool::Dataset(ds) => max_size.min(ds.largest(train)),
            GraphPool::Synthetic(_) => max_size,
        }
    }

    /// The dataset, for pools backed by one.
    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            GraphPool::Dataset(ds) => Some(ds),
            GraphPool::Synthetic(_) => None,
        }
    }
}

/// Oracle-labeled source with a persistent cache.
#[derive(Debug)]
pub struct ImbalancedSource {
    pub(crate) config: ImbalancedConfig,
    pub(crate) pool: GraphPool,
    pub(crate) rng: SourceRng,
    cache: LabelCache,
    prefix: String,
    batch_idx: usize,
}

impl ImbalancedSource {
    /// Open the configured pool; datasets are loaded through `loader`.
    pub fn new(config: ImbalancedConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        let pool = GraphPool::open(&config, loader)?;
        Self::with_pool(config, pool, "imbalanced")
    }

    /// Source over an explicit pool, caching under `prefix`.
    pub fn with_pool(config: ImbalancedConfig, pool: GraphPool, prefix: &str) -> Result<Self> {
        check_sizes(config.min_size, config.max_size)?;
        let rng = SourceRng::seed_from_u64(config.seed);
        let cache = LabelCache::new(config.cache_dir.clone());
        Ok(Self {
            config,
            pool,
            rng,
            cache,
            prefix: prefix.to_string(),
            batch_idx: 0,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &ImbalancedConfig {
        &self.config
    }

    /// Index the next generated batch will be cached under.
    pub fn batch_idx(&self) -> usize {
        self.batch_idx
    }

    /// Cache in use.
    pub fn cache(&self) -> &LabelCache {
        &self.cache
    }

    /// Cache key of the next batch.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            prefix: self.prefix.clone(),
            dataset: self.config.dataset.clone(),
            node_anchored: self.config.node_anchored,
            use_whole_targets: self.config.use_whole_targets,
            use_feats: self.config.use_feats,
            target_larger: self.config.target_larger,
            batch_idx: self.batch_idx,
        }
    }

    fn whole_target(&mut self, train: bool) -> Result<Graph> {
        let GraphPool::Dataset(ds) = &self.pool else {
            return Err(Error::InvalidConfig(
                "whole targets need a dataset, not generated graphs".into(),
            ));
        };
        ds.split(train)
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| Error::EmptyDataset(ds.name.clone()))
    }

    fn stream_graph(&mut self, train: bool, first: bool) -> Result<Graph> {
        if first && self.config.use_whole_targets {
            return self.whole_target(train);
        }
        let (min, max) = match &self.pool {
            GraphPool::Synthetic(generator) => generator.sizes(),
            GraphPool::Dataset(_) => (
                self.config.min_size,
                self.pool.cap(self.config.max_size, train),
            ),
        };
        let size = draw_between(&mut self.rng, min, max);
        self.pool
            .sample(size, train, self.config.max_attempts, &mut self.rng)
    }

    /// Label each pair with the oracle, or by position for precomputed
    /// positives.
    fn label(&mut self, first: Vec<Graph>, second: Vec<Graph>) -> LabeledGraphs {
        let node_anchored = self.config.node_anchored;
        let precomputed = self.config.use_precomputed_positives;
        let mut out = LabeledGraphs::default();

        for (i, (mut a, mut b)) in first.into_iter().zip(second).enumerate() {
            add_anchor(&mut a, node_anchored, &mut self.rng);
            add_anchor(&mut b, node_anchored, &mut self.rng);
            if self.config.target_larger && a.node_count() < b.node_count() {
                std::mem::swap(&mut a, &mut b);
            }
            let constructed = precomputed && i % 2 == 0;
            if constructed && node_anchored {
                // The query was cut from the target; anchor both on the same node.
                let source = b.anchor().and_then(|q| b.source_id(q));
                if let Some(s) = source.filter(|&s| s < a.node_count()) {
                    a.set_anchor(NodeIndex::new(s));
                }
            }
            let positive = constructed
                || SubgraphMatcher::new(&a, &b)
                    .anchored(node_anchored)
                    .is_subgraph();
            out.push(a, b, positive);
        }
        out
    }
}

impl BatchSource for ImbalancedSource {
    fn prepare(&mut self, total: usize, batch_size: usize, train: bool) -> Result<BatchPlan> {
        check_batch_size(batch_size)?;
        let half = batch_size / 2;
        let mut batches = Vec::with_capacity(total / batch_size);
        for _ in 0..total / batch_size {
            let mut first = Vec::with_capacity(half);
            let mut second = Vec::with_capacity(half);
            for _ in 0..half {
                first.push(self.stream_graph(train, true)?);
            }
            for _ in 0..half {
                second.push(self.stream_graph(train, false)?);
            }
            batches.push(PlannedBatch::Paired { first, second });
        }
        Ok(BatchPlan::new(batches))
    }

    fn generate_batch(
        &mut self,
        planned: PlannedBatch,
        _train: bool,
        options: &BatchOptions,
    ) -> Result<LabeledBatch> {
        let PlannedBatch::Paired { first, second } = planned else {
            return Err(Error::InvalidConfig(
                "imbalanced sources expect paired batches".into(),
            ));
        };
        reseed(&mut self.rng, options);
        let key = self.cache_key();

        let graphs = match self.cache.load(&key)? {
            Some(graphs) => graphs,
            None => {
                info!(key = %key.file_name(), pairs = first.len().min(second.len()), "labeling new batch");
                let graphs = self.label(first, second);
                self.cache.store(&key, &graphs)?;
                graphs
            }
        };
        info!(
            batch = self.batch_idx,
            positives = graphs.num_positive(),
            negatives = graphs.num_negative(),
            "imbalanced batch"
        );
        self.batch_idx += 1;
        LabeledBatch::from_graphs(graphs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> Graph {
        let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        Graph::from_edges(n, &edges)
    }

    fn source(dir: &std::path::Path, config: ImbalancedConfig) -> ImbalancedSource {
        let generator = CombinedGenerator::new(config.min_size + 1, config.max_size).unwrap();
        let config = config.with_cache_dir(dir);
        ImbalancedSource::with_pool(config, GraphPool::Synthetic(generator), "imbalanced").unwrap()
    }

    #[test]
    fn test_labels_match_oracle() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(
            dir.path(),
            ImbalancedConfig::default().with_sizes(3, 7).with_node_anchored(true),
        );
        let plan = src.prepare(24, 12, true).unwrap();
        assert_eq!(plan.len(), 2);

        for planned in plan {
            let batch = src
                .generate_batch(planned, true, &BatchOptions::default())
                .unwrap();
            assert_eq!(batch.num_positive() + batch.num_negative(), 6);
            for (t, q) in batch.pos_target.graphs().iter().zip(batch.pos_query.graphs()) {
                assert!(t.node_count() >= q.node_count());
                assert!(SubgraphMatcher::new(t, q).anchored(true).is_subgraph());
            }
            for (t, q) in batch.neg_target.graphs().iter().zip(batch.neg_query.graphs()) {
                assert!(!SubgraphMatcher::new(t, q).anchored(true).is_subgraph());
            }
        }
        assert_eq!(src.batch_idx(), 2);
    }

    #[test]
    fn test_cache_replayed() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImbalancedConfig::default().with_sizes(4, 9).with_seed(4);

        let mut first = source(dir.path(), config.clone());
        let planned = first.prepare(8, 8, true).unwrap().into_iter().next().unwrap();
        let original = first
            .generate_batch(planned, true, &BatchOptions::default())
            .unwrap();
        assert!(first.cache().contains(&CacheKey {
            batch_idx: 0,
            ..first.cache_key()
        }));

        // A fresh source with a different seed replays batch 0 from disk.
        let mut second = source(dir.path(), config.with_seed(77));
        let planned = second.prepare(8, 8, true).unwrap().into_iter().next().unwrap();
        let replayed = second
            .generate_batch(planned, true, &BatchOptions::default())
            .unwrap();
        assert_eq!(original.num_positive(), replayed.num_positive());
        assert_eq!(original.neg_target.num_nodes(), replayed.neg_target.num_nodes());
        assert_eq!(original.pos_query.edge_index(), replayed.pos_query.edge_index());
    }

    #[test]
    fn test_unanchored_indicator_is_uniform() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(dir.path(), ImbalancedConfig::default().with_sizes(3, 6));
        let planned = src.prepare(4, 4, true).unwrap().into_iter().next().unwrap();
        let batch = src
            .generate_batch(planned, true, &BatchOptions::default())
            .unwrap();
        let anchor = batch.neg_target.anchor().or(batch.pos_target.anchor()).unwrap();
        assert!(anchor.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_target_larger_swap() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(dir.path(), ImbalancedConfig::default().with_sizes(3, 6));
        let planned = PlannedBatch::Paired {
            first: vec![ring(3), ring(4)],
            second: vec![ring(6), Graph::from_edges(2, &[(0, 1)])],
        };
        let batch = src
            .generate_batch(planned, true, &BatchOptions::default())
            .unwrap();
        let targets: Vec<&Graph> = batch
            .pos_target
            .graphs()
            .iter()
            .chain(batch.neg_target.graphs())
            .collect();
        let queries: Vec<&Graph> = batch
            .pos_query
            .graphs()
            .iter()
            .chain(batch.neg_query.graphs())
            .collect();
        for (t, q) in targets.iter().zip(&queries) {
            assert!(t.node_count() >= q.node_count());
        }
    }

    #[test]
    fn test_whole_targets_need_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(
            dir.path(),
            ImbalancedConfig::default().with_sizes(3, 6).with_whole_targets(true),
        );
        assert!(matches!(src.prepare(4, 4, true), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_sized_plan_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut src = source(dir.path(), ImbalancedConfig::default());
        assert!(src
            .generate_batch(PlannedBatch::Sized(4), true, &BatchOptions::default())
            .is_err());
    }
}
