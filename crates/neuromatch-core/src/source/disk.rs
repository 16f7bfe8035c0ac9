//! Balanced pairs sampled from a stored dataset.
//!
//! Each positive pair is two nested connected samples from one source graph:
//! with tree-pair sampling the query is a prefix of the target's growth
//! order, so both are anchored at the shared start node. Negatives are two
//! independent samples; with [`BatchOptions::filter_negs`] any negative whose
//! query still embeds in its target is thrown away and redrawn.

use super::{
    check_sizes, draw_between, reject_synthetic, reseed, BatchOptions, BatchPlan, BatchSource,
    LabeledBatch, PlannedBatch, SourceRng,
};
use crate::algo::sampling::{sample_connected, sample_neigh, SamplingMethod, DEFAULT_MAX_ATTEMPTS};
use crate::cache::LabeledGraphs;
use crate::dataset::{Dataset, DatasetLoader};
use crate::{Error, Graph, Result, SubgraphMatcher};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration of [`DiskSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Dataset name.
    pub dataset: String,
    /// Anchor pairs at the sample's start node.
    pub node_anchored: bool,
    /// Smallest query size.
    pub min_size: usize,
    /// Largest target size.
    pub max_size: usize,
    /// Keep stored node features.
    pub use_feats: bool,
    /// How pairs are drawn.
    pub sampling_method: SamplingMethod,
    /// Growth attempts, and negative redraws, before giving up.
    pub max_attempts: usize,
    /// Initial RNG seed.
    pub seed: u64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            dataset: "enzymes".into(),
            node_anchored: false,
            min_size: 5,
            max_size: 50,
            use_feats: false,
            sampling_method: SamplingMethod::TreePair,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: 0,
        }
    }
}

impl DiskConfig {
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

    /// Set the sampling method.
    pub fn with_sampling_method(mut self, method: SamplingMethod) -> Self {
        self.sampling_method = method;
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

/// A sampled pair before anchoring: nodes of the larger and smaller side.
struct Draw<'g> {
    graph_a: &'g Graph,
    a: Vec<NodeIndex>,
    graph_b: &'g Graph,
    b: Vec<NodeIndex>,
    /// Position of the shared anchor inside `a`, for nested pairs.
    anchor_a: usize,
}

impl Draw<'_> {
    fn into_pair(self, node_anchored: bool) -> (Graph, Graph) {
        let mut target = self.graph_a.induced_subgraph(&self.a);
        let mut query = self.graph_b.induced_subgraph(&self.b);
        if node_anchored {
            target.set_anchor(NodeIndex::new(self.anchor_a));
            query.set_anchor(NodeIndex::new(0));
        }
        (target, query)
    }
}

/// Dataset-backed source with by-construction positives.
#[derive(Debug)]
pub struct DiskSource {
    config: DiskConfig,
    dataset: Dataset,
    rng: SourceRng,
}

impl DiskSource {
    /// Load the configured dataset.
    pub fn new(config: DiskConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        reject_synthetic(&config.dataset, "disk")?;
        let dataset = loader.load(&config.dataset, config.use_feats)?;
        Self::from_dataset(config, dataset)
    }

    /// Source over an already loaded dataset.
    pub fn from_dataset(config: DiskConfig, dataset: Dataset) -> Result<Self> {
        check_sizes(config.min_size, config.max_size)?;
        dataset.ensure_nonempty()?;
        let rng = SourceRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            dataset,
            rng,
        })
    }

    /// The loaded dataset.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Largest usable target size for a split.
    fn max_size(&self, train: bool) -> Result<usize> {
        let max_size = self.config.max_size.min(self.dataset.largest(train));
        if max_size <= self.config.min_size {
            return Err(Error::InvalidConfig(format!(
                "{} has no graph with more than {} nodes",
                self.dataset.name, self.config.min_size
            )));
        }
        Ok(max_size)
    }

    fn whole_graph<'g>(
        graphs: &'g [Graph],
        min_nodes: usize,
        rng: &mut SourceRng,
    ) -> Result<&'g Graph> {
        let candidates: Vec<&Graph> = graphs.iter().filter(|g| g.node_count() >= min_nodes).collect();
        candidates.choose(rng).copied().ok_or(Error::SamplingExhausted {
            size: min_nodes,
            attempts: 0,
        })
    }

    fn draw_positive<'g>(
        config: &DiskConfig,
        graphs: &'g [Graph],
        max_size: usize,
        rng: &mut SourceRng,
    ) -> Result<Draw<'g>> {
        let min = config.min_size;
        match config.sampling_method {
            SamplingMethod::TreePair | SamplingMethod::RandomWalks => {
                let size = draw_between(rng, min + 1, max_size);
                let (graph, a) = sample_neigh(graphs, size, config.max_attempts, rng)?;
                let cut = draw_between(rng, min, a.len() - 1);
                let b = a[..cut].to_vec();
                Ok(Draw {
                    graph_a: graph,
                    a,
                    graph_b: graph,
                    b,
                    anchor_a: 0,
                })
            }
            SamplingMethod::SubgraphTree => {
                let graph = Self::whole_graph(graphs, min + 1, rng)?;
                let size = draw_between(rng, min, graph.node_count() - 1);
                let b = sample_connected(graph, size, config.max_attempts, rng)?;
                Ok(Draw {
                    graph_a: graph,
                    a: graph.nodes().collect(),
                    graph_b: graph,
                    anchor_a: b[0].index(),
                    b,
                })
            }
        }
    }

    fn draw_negative<'g>(
        config: &DiskConfig,
        graphs: &'g [Graph],
        max_size: usize,
        rng: &mut SourceRng,
    ) -> Result<Draw<'g>> {
        let min = config.min_size;
        let (graph_a, a) = match config.sampling_method {
            SamplingMethod::TreePair | SamplingMethod::RandomWalks => {
                let size = draw_between(rng, min + 1, max_size);
                sample_neigh(graphs, size, config.max_attempts, rng)?
            }
            SamplingMethod::SubgraphTree => {
                let graph = Self::whole_graph(graphs, min + 1, rng)?;
                (graph, graph.nodes().collect())
            }
        };
        let size = draw_between(rng, min, a.len() - 1);
        let (graph_b, b) = sample_neigh(graphs, size, config.max_attempts, rng)?;
        Ok(Draw {
            graph_a,
            a,
            graph_b,
            b,
            anchor_a: 0,
        })
    }
}

impl BatchSource for DiskSource {
    fn prepare(&mut self, total: usize, batch_size: usize, _train: bool) -> Result<BatchPlan> {
        BatchPlan::sized(total, batch_size)
    }

    fn generate_batch(
        &mut self,
        planned: PlannedBatch,
        train: bool,
        options: &BatchOptions,
    ) -> Result<LabeledBatch> {
        let PlannedBatch::Sized(batch_size) = planned else {
            return Err(Error::InvalidConfig("disk source expects sized batches".into()));
        };
        reseed(&mut self.rng, options);
        let max_size = self.max_size(train)?;
        let graphs = self.dataset.split(train);
        let config = &self.config;
        let rng = &mut self.rng;
        let half = batch_size / 2;
        let mut out = LabeledGraphs::default();

        for _ in 0..half {
            let (target, query) =
                Self::draw_positive(config, graphs, max_size, rng)?.into_pair(config.node_anchored);
            out.push(target, query, true);
        }

        let mut rejected = 0;
        while out.num_negative() < half {
            let (target, query) =
                Self::draw_negative(config, graphs, max_size, rng)?.into_pair(config.node_anchored);
            if options.filter_negs && SubgraphMatcher::new(&target, &query).is_subgraph() {
                rejected += 1;
                if rejected >= config.max_attempts {
                    return Err(Error::SamplingExhausted {
                        size: half,
                        attempts: rejected,
                    });
                }
                continue;
            }
            out.push(target, query, false);
        }

        LabeledBatch::from_graphs(out)
    }
}
