//! Hop-curriculum pairs.
//!
//! Targets are neighborhoods (or whole graphs) of a dataset. A positive query
//! is grown inside the ball of `query_hops` hops around a center node of its
//! own target; a negative query is grown the same way inside an unrelated
//! target. Even positions of a batch are positive, odd positions negative.
//!
//! The hop radius follows the training epoch, `min(epoch, MAX_QUERY_HOPS)`,
//! so early epochs see queries concentrated around the anchor and later ones
//! see queries spread across the target.
//!
//! | Phase | Query center |
//! |-------|--------------|
//! | [`Phase::All`] (training) | any node of the target |
//! | [`Phase::Center`] (evaluation) | the target's center node |
//!
//! Negatives checked with [`BatchOptions::filter_negs`] are redrawn until the
//! oracle rejects them, each retry reaching further from the query center.
//!
//! With `edge_induced` set, queries additionally lose a random subset of the
//! edges outside a BFS spanning tree, so they embed as monomorphisms rather
//! than as induced subgraphs.

use super::{
    check_sizes, draw_between, random_node, reject_synthetic, reseed, BatchOptions, BatchPlan,
    BatchSource, LabeledBatch, PlannedBatch, SourceRng,
};
use crate::algo::isomorphism::MatchMode;
use crate::algo::sampling::{grow_from, hop_ball, sample_neigh, DEFAULT_MAX_ATTEMPTS};
use crate::cache::LabeledGraphs;
use crate::dataset::{Dataset, DatasetLoader};
use crate::{Error, Graph, Result, SubgraphMatcher};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::info;

/// Upper bound of the hop curriculum.
pub const MAX_QUERY_HOPS: usize = 4;

/// Probability of dropping each non-tree edge of an edge-induced query.
const EDGE_DROP_PROB: f64 = 0.5;

/// Datasets made of a few large graphs, sampled as neighborhoods by default.
const NEIGHBORHOOD_DATASETS: &[&str] = &["WN", "ppi", "reddit-binary"];

/// Where query centers are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Anywhere in the target.
    All,
    /// At the target's center node.
    Center,
}

impl Phase {
    /// Training uses [`Phase::All`], evaluation [`Phase::Center`].
    pub fn for_split(train: bool) -> Self {
        if train {
            Phase::All
        } else {
            Phase::Center
        }
    }
}

/// Configuration of [`BasisSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasisConfig {
    /// Dataset name.
    pub dataset: String,
    /// Anchor targets at the query center.
    pub node_anchored: bool,
    /// Smallest query size.
    pub min_size: usize,
    /// Largest target and query size.
    pub max_size: usize,
    /// Keep stored node features.
    pub use_feats: bool,
    /// Thin queries to non-induced subgraphs.
    pub edge_induced: bool,
    /// Sample neighborhoods instead of using whole graphs as targets.
    /// Defaults to true for datasets of a few large graphs.
    pub sample_neighborhoods: Option<bool>,
    /// Growth attempts, and negative redraws, before giving up.
    pub max_attempts: usize,
    /// Initial RNG seed.
    pub seed: u64,
}

impl Default for BasisConfig {
    fn default() -> Self {
        Self {
            dataset: "enzymes".into(),
            node_anchored: true,
            min_size: 5,
            max_size: 15,
            use_feats: false,
            edge_induced: false,
            sample_neighborhoods: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: 0,
        }
    }
}

impl BasisConfig {
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

    /// Enable edge-induced queries.
    pub fn with_edge_induced(mut self, edge_induced: bool) -> Self {
        self.edge_induced = edge_induced;
        self
    }

    /// Force neighborhood sampling on or off.
    pub fn with_sample_neighborhoods(mut self, sample: bool) -> Self {
        self.sample_neighborhoods = Some(sample);
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

    fn samples_neighborhoods(&self) -> bool {
        self.sample_neighborhoods
            .unwrap_or_else(|| NEIGHBORHOOD_DATASETS.contains(&self.dataset.as_str()))
    }

    fn match_mode(&self) -> MatchMode {
        if self.edge_induced {
            MatchMode::Monomorphism
        } else {
            MatchMode::Induced
        }
    }
}

/// A target together with its center node.
struct Target {
    graph: Graph,
    center: NodeIndex,
}

/// Dataset-backed source with a hop curriculum.
#[derive(Debug)]
pub struct BasisSource {
    config: BasisConfig,
    dataset: Dataset,
    query_hops: usize,
    rng: SourceRng,
}

impl BasisSource {
    /// Load the configured dataset.
    pub fn new(config: BasisConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        reject_synthetic(&config.dataset, "basis")?;
        let dataset = loader.load(&config.dataset, config.use_feats)?;
        Self::from_dataset(config, dataset)
    }

    /// Source over an already loaded dataset.
    pub fn from_dataset(config: BasisConfig, dataset: Dataset) -> Result<Self> {
        check_sizes(config.min_size, config.max_size)?;
        dataset.ensure_nonempty()?;
        let rng = SourceRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            dataset,
            query_hops: 1,
            rng,
        })
    }

    /// Current hop radius.
    pub fn query_hops(&self) -> usize {
        self.query_hops
    }

    /// Move the curriculum to `epoch`.
    pub fn set_epoch(&mut self, epoch: usize) {
        let hops = epoch.clamp(1, MAX_QUERY_HOPS);
        if hops != self.query_hops {
            info!(hops, epoch, "query hop radius changed");
            self.query_hops = hops;
        }
    }

    fn sample_target(&mut self, train: bool, phase: Phase) -> Result<Target> {
        let min = self.config.min_size;
        let graphs = self.dataset.split(train);

        let (graph, start) = if self.config.samples_neighborhoods() {
            let cap = self.config.max_size.min(self.dataset.largest(train));
            let size = draw_between(&mut self.rng, (min + 1).min(cap), cap);
            let (source, nodes) =
                sample_neigh(graphs, size, self.config.max_attempts, &mut self.rng)?;
            (source.induced_subgraph(&nodes), NodeIndex::new(0))
        } else {
            let candidates: Vec<&Graph> = graphs.iter().filter(|g| g.node_count() > min).collect();
            let whole = candidates.choose(&mut self.rng).ok_or_else(|| {
                Error::EmptyDataset(format!("{} (no graph above {min} nodes)", self.dataset.name))
            })?;
            let graph = (*whole).clone();
            let start = random_node(&graph, &mut self.rng).unwrap_or(NodeIndex::new(0));
            (graph, start)
        };

        let center = match phase {
            Phase::Center => start,
            Phase::All => random_node(&graph, &mut self.rng).unwrap_or(start),
        };
        Ok(Target { graph, center })
    }

    /// Grow a query of at least `floor` nodes (when the ball allows) around
    /// `center`, within `hops` hops. The query center is node 0 of the result.
    fn grow_query(&mut self, source: &Graph, center: NodeIndex, hops: usize, floor: usize) -> Graph {
        let ball = hop_ball(source, center, hops);
        let local = source.induced_subgraph(&ball);
        let high = ball.len().min(self.config.max_size);
        let size = draw_between(&mut self.rng, floor.min(high), high);
        // Every prefix of a BFS order is connected, so it backs up growth.
        let nodes = grow_from(&local, NodeIndex::new(0), size, &mut self.rng)
            .unwrap_or_else(|| (0..size).map(NodeIndex::new).collect());

        // Node i of `local` is ball[i].
        let nodes: Vec<NodeIndex> = nodes.iter().map(|n| ball[n.index()]).collect();
        let mut query = source.induced_subgraph(&nodes);
        if self.config.edge_induced {
            self.drop_non_tree_edges(&mut query);
        }
        query
    }

    /// Target, center and unrelated query of a negative pair.
    ///
    /// When `filter` is set, a pair whose query still embeds at the center is
    /// redrawn on both sides, and each rejection widens the query's hop radius
    /// and raises its minimum size, so compact queries that fit anywhere in
    /// a uniform dataset give way to spread-out ones that do not.
    fn negative_pair(
        &mut self,
        train: bool,
        phase: Phase,
        filter: bool,
    ) -> Result<(Graph, NodeIndex, Graph)> {
        for rejected in 0..self.config.max_attempts {
            let Target { graph, center } = self.sample_target(train, phase)?;
            let other = self.sample_target(train, phase)?;
            let query = self.grow_query(
                &other.graph,
                other.center,
                self.query_hops + rejected,
                self.config.min_size + rejected,
            );
            if !filter || !self.embeds_at(&graph, center, &query) {
                return Ok((graph, center, query));
            }
        }
        Err(Error::SamplingExhausted {
            size: self.config.max_size,
            attempts: self.config.max_attempts,
        })
    }

    /// Whether `query`, anchored at its node 0, embeds in `target` at `center`.
    fn embeds_at(&self, target: &Graph, center: NodeIndex, query: &Graph) -> bool {
        let mut target = target.clone();
        let mut query = query.clone();
        self.anchor(&mut target, center);
        self.anchor(&mut query, NodeIndex::new(0));
        SubgraphMatcher::new(&target, &query)
            .anchored(self.config.node_anchored)
            .mode(self.config.match_mode())
            .is_subgraph()
    }

    fn drop_non_tree_edges(&mut self, query: &mut Graph) {
        let Some(root) = query.nodes().next() else {
            return;
        };
        let mut tree: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(n) = queue.pop_front() {
            let mut neighbors: Vec<NodeIndex> = query.neighbors(n).collect();
            neighbors.sort();
            for nb in neighbors {
                if seen.insert(nb) {
                    tree.insert((n.min(nb), n.max(nb)));
                    queue.push_back(nb);
                }
            }
        }
        let extra: Vec<(NodeIndex, NodeIndex)> = query
            .edges()
            .filter(|&(a, b)| !tree.contains(&(a.min(b), a.max(b))))
            .collect();
        for (a, b) in extra {
            if self.rng.random_bool(EDGE_DROP_PROB) {
                query.remove_edge(a, b);
            }
        }
    }

    fn anchor(&self, graph: &mut Graph, node: NodeIndex) {
        if self.config.node_anchored {
            graph.set_anchor(node);
        }
    }
}

impl BatchSource for BasisSource {
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
            return Err(Error::InvalidConfig("basis source expects sized batches".into()));
        };
        reseed(&mut self.rng, options);
        if let Some(epoch) = options.epoch {
            self.set_epoch(epoch);
        }
        let phase = Phase::for_split(train);
        let mut out = LabeledGraphs::default();

        for i in 0..batch_size {
            let positive = i % 2 == 0;
            let (mut graph, center, mut query) = if positive {
                let Target { graph, center } = self.sample_target(train, phase)?;
                let query =
                    self.grow_query(&graph, center, self.query_hops, self.config.min_size);
                (graph, center, query)
            } else {
                self.negative_pair(train, phase, options.filter_negs)?
            };

            self.anchor(&mut graph, center);
            self.anchor(&mut query, NodeIndex::new(0));
            out.push(graph, query, positive);
        }

        LabeledBatch::from_graphs(out)
    }
}
