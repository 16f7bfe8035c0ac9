//! On-the-fly synthetic pairs.
//!
//! Positive targets come fresh from the generator and each positive query is
//! a connected sample grown inside its target. Negative queries are sampled
//! from an independently generated graph of the same size as the negative
//! target, so they are negative only with high probability.
//!
//! A fraction of the negatives are *hard*: the query is sampled from the
//! negative target itself and then perturbed by inserting a few random
//! non-edges, which keeps it structurally close to the target.

use super::{
    check_sizes, random_node, reseed, BatchOptions, BatchPlan, BatchSource, LabeledBatch,
    PlannedBatch, SourceRng,
};
use crate::algo::sampling::{sample_connected, SamplerConfig, SizePolicy, DEFAULT_MAX_ATTEMPTS};
use crate::cache::LabeledGraphs;
use crate::generator::{CombinedGenerator, SyntheticGenerator};
use crate::{Error, Graph, Result, SubgraphMatcher};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Probability of perturbing a hard negative by adding edges rather than by
/// moving its anchor. At 1.0 the anchor branch never runs.
pub const HARD_NEGATIVE_EDGE_PROB: f64 = 1.0;

/// Upper bound on edges inserted into a hard negative.
pub const MAX_HARD_NEGATIVE_EDGES: usize = 5;

/// Configuration of [`OtfSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtfConfig {
    /// Give every graph an anchor node.
    pub node_anchored: bool,
    /// Smallest query size.
    pub min_size: usize,
    /// Largest target size.
    pub max_size: usize,
    /// Training-time query size distribution.
    pub size_policy: SizePolicy,
    /// Fraction of negatives built by perturbing the negative target.
    pub hard_neg_fraction: f64,
    /// Growth attempts before giving up on a sample.
    pub max_attempts: usize,
    /// Initial RNG seed.
    pub seed: u64,
}

impl Default for OtfConfig {
    fn default() -> Self {
        Self {
            node_anchored: false,
            min_size: 5,
            max_size: 29,
            size_policy: SizePolicy::Uniform,
            hard_neg_fraction: 0.5,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            seed: 0,
        }
    }
}

impl OtfConfig {
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

    /// Set the hard negative fraction (clamped to `[0, 1]`).
    pub fn with_hard_neg_fraction(mut self, fraction: f64) -> Self {
        self.hard_neg_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set the training-time size policy.
    pub fn with_size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    /// Set the initial seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sampler settings carried by this config.
    pub fn sampler(&self) -> SamplerConfig {
        SamplerConfig::default()
            .with_sizes(self.min_size, self.max_size)
            .with_size_policy(self.size_policy)
            .with_max_attempts(self.max_attempts)
    }
}

/// Synthetic source with by-construction labels.
#[derive(Debug)]
pub struct OtfSource {
    config: OtfConfig,
    generator: CombinedGenerator,
    rng: SourceRng,
}

impl OtfSource {
    /// Source generating targets with `min_size + 1..=max_size` nodes.
    pub fn new(config: OtfConfig) -> Result<Self> {
        config.sampler().validate()?;
        let generator = CombinedGenerator::new(config.min_size + 1, config.max_size)?;
        let rng = SourceRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            generator,
            rng,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &OtfConfig {
        &self.config
    }

    /// Change the size range for subsequent batches.
    pub fn set_size_range(&mut self, min_size: usize, max_size: usize) -> Result<()> {
        check_sizes(min_size, max_size)?;
        self.generator.set_size_range(min_size + 1, max_size)?;
        self.config.min_size = min_size;
        self.config.max_size = max_size;
        Ok(())
    }

    fn query_size(&mut self, target_len: usize, train: bool) -> usize {
        let high = target_len.saturating_sub(1).max(1);
        let policy = self.config.sampler().policy_for(train);
        let size = if policy == SizePolicy::PowerLaw {
            let low = self.config.min_size.min(high);
            SizePolicy::PowerLaw.draw(low, high, self.config.min_size, &mut self.rng)
        } else {
            // Training also admits queries one node below min_size.
            let low = if train {
                self.config.min_size.saturating_sub(1)
            } else {
                self.config.min_size
            };
            SizePolicy::Uniform.draw(low.clamp(1, high), high, self.config.min_size, &mut self.rng)
        };
        size.clamp(1, target_len.max(1))
    }

    /// Grow a query in `source`, anchoring `source` at the start node when
    /// anchoring is on.
    fn sample_query(&mut self, source: &mut Graph, train: bool) -> Result<Graph> {
        let size = self.query_size(source.node_count(), train);
        let nodes = sample_connected(source, size, self.config.max_attempts, &mut self.rng)?;
        if self.config.node_anchored {
            source.set_anchor(nodes[0]);
        }
        Ok(source.induced_subgraph(&nodes))
    }

    /// Insert between 1 and [`MAX_HARD_NEGATIVE_EDGES`] random non-edges, or
    /// move the anchor.
    fn perturb(&mut self, query: &mut Graph) {
        if self.rng.random::<f64>() < HARD_NEGATIVE_EDGE_PROB || !self.config.node_anchored {
            let non_edges = query.non_edges();
            if non_edges.is_empty() {
                return;
            }
            let k = self
                .rng
                .random_range(1..=non_edges.len().min(MAX_HARD_NEGATIVE_EDGES));
            for &(a, b) in non_edges.choose_multiple(&mut self.rng, k) {
                query.add_edge(a, b);
            }
        } else if let Some(anchor) = random_node(query, &mut self.rng) {
            query.set_anchor(anchor);
        }
    }

    /// Perturbed sample of `target`, or `None` if filtering rejected every
    /// attempt.
    fn hard_negative(&mut self, target: &mut Graph, filter_negs: bool) -> Result<Option<Graph>> {
        for _ in 0..self.config.max_attempts {
            let mut query = self.sample_query(target, true)?;
            self.perturb(&mut query);
            if !filter_negs
                || !SubgraphMatcher::new(target, &query)
                    .anchored(self.config.node_anchored)
                    .is_subgraph()
            {
                return Ok(Some(query));
            }
        }
        Ok(None)
    }
}

impl BatchSource for OtfSource {
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
            return Err(Error::InvalidConfig(
                "on-the-fly source expects sized batches".into(),
            ));
        };
        reseed(&mut self.rng, options);
        let half = batch_size / 2;
        let mut out = LabeledGraphs::default();

        for _ in 0..half {
            let mut target = self.generator.generate_sized(&mut self.rng);
            let query = self.sample_query(&mut target, train)?;
            out.push(target, query, true);
        }

        // Unperturbed samples of the target would be positives, so evaluation
        // batches only use independent negatives.
        let hard_count = if train {
            (half as f64 * self.config.hard_neg_fraction) as usize
        } else {
            0
        };
        let hard: HashSet<usize> = rand::seq::index::sample(&mut self.rng, half, hard_count.min(half))
            .into_iter()
            .collect();

        for i in 0..half {
            let mut target = self.generator.generate_sized(&mut self.rng);
            let hard_query = if hard.contains(&i) {
                let query = self.hard_negative(&mut target, options.filter_negs)?;
                if query.is_none() {
                    debug!(index = i, "hard negative filtered out, using an independent query");
                    target.clear_anchor();
                }
                query
            } else {
                None
            };
            let query = match hard_query {
                Some(query) => query,
                None => {
                    let mut source = self.generator.generate(target.node_count(), &mut self.rng);
                    self.sample_query(&mut source, train)?
                }
            };
            if self.config.node_anchored {
                if let Some(anchor) = random_node(&target, &mut self.rng) {
                    target.fill_missing_anchor(anchor);
                }
            }
            out.push(target, query, false);
        }

        LabeledBatch::from_graphs(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use petgraph::graph::NodeIndex;

    fn source(config: OtfConfig) -> OtfSource {
        OtfSource::new(config).unwrap()
    }

    #[test]
    fn test_balanced_and_sized() {
        let mut src = source(OtfConfig::default().with_sizes(5, 12).with_seed(1));
        let batch = src
            .generate_batch(PlannedBatch::Sized(16), true, &BatchOptions::default())
            .unwrap();
        assert_eq!(batch.num_positive(), 8);
        assert_eq!(batch.num_negative(), 8);

        for (t, q) in batch.pos_target.graphs().iter().zip(batch.pos_query.graphs()) {
            assert!((6..=12).contains(&t.node_count()));
            assert!(q.node_count() < t.node_count());
            assert!(q.node_count() >= 4);
            assert!(q.is_connected());
        }
    }

    #[test]
    fn test_positives_are_subgraphs() {
        let mut src = source(
            OtfConfig::default()
                .with_sizes(4, 10)
                .with_node_anchored(true)
                .with_seed(3),
        );
        let batch = src
            .generate_batch(PlannedBatch::Sized(12), false, &BatchOptions::default())
            .unwrap();
        for (t, q) in batch.pos_target.graphs().iter().zip(batch.pos_query.graphs()) {
            assert!(SubgraphMatcher::new(t, q).anchored(true).is_subgraph());
            assert_eq!(q.anchor(), Some(NodeIndex::new(0)));
        }
        // Every graph carries an indicator column in anchored mode.
        assert!(batch.neg_target.anchor().is_some());
        assert!(batch.neg_query.anchor().is_some());
    }

    #[test]
    fn test_hard_negatives_derive_from_target() {
        let mut src = source(
            OtfConfig::default()
                .with_sizes(5, 15)
                .with_hard_neg_fraction(1.0)
                .with_seed(8),
        );
        let batch = src
            .generate_batch(PlannedBatch::Sized(20), true, &BatchOptions::default())
            .unwrap();
        for (t, q) in batch.neg_target.graphs().iter().zip(batch.neg_query.graphs()) {
            // Every query node maps back into the target.
            assert!(q.nodes().all(|n| q.source_id(n).is_some_and(|s| s < t.node_count())));
            let added = q
                .edges()
                .filter(|&(a, b)| {
                    let (sa, sb) = (q.source_id(a).unwrap(), q.source_id(b).unwrap());
                    !t.has_edge(NodeIndex::new(sa), NodeIndex::new(sb))
                })
                .count();
            let complete = q.non_edges().is_empty();
            assert!(added <= MAX_HARD_NEGATIVE_EDGES);
            assert!(added >= 1 || complete);
        }
    }

    #[test]
    fn test_reseed_reproduces() {
        let mut src = source(OtfConfig::default());
        let options = BatchOptions::default().with_seed(99);
        let a = src.generate_batch(PlannedBatch::Sized(8), true, &options).unwrap();
        let b = src.generate_batch(PlannedBatch::Sized(8), true, &options).unwrap();
        let sizes = |batch: &LabeledBatch| -> Vec<usize> {
            batch.pos_query.graphs().iter().map(Graph::node_count).collect()
        };
        assert_eq!(sizes(&a), sizes(&b));
        assert_eq!(a.neg_target.num_nodes(), b.neg_target.num_nodes());
    }

    #[test]
    fn test_set_size_range() {
        let mut src = source(OtfConfig::default());
        src.set_size_range(10, 20).unwrap();
        assert!(src.set_size_range(20, 10).is_err());
        let batch = src
            .generate_batch(PlannedBatch::Sized(10), false, &BatchOptions::default())
            .unwrap();
        assert!(batch
            .pos_target
            .graphs()
            .iter()
            .all(|g| (11..=20).contains(&g.node_count())));
    }

    #[test]
    fn test_paired_plan_rejected() {
        let mut src = source(OtfConfig::default());
        let planned = PlannedBatch::Paired {
            first: Vec::new(),
            second: Vec::new(),
        };
        assert!(src
            .generate_batch(planned, true, &BatchOptions::default())
            .is_err());
    }
}
