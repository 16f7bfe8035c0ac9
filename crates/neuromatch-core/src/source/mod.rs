//! Training data sources.
//!
//! A data source turns raw graphs into labeled (target, query) pairs and packs
//! them into four [`Batch`]es. All variants share the same two-step protocol:
//!
//! 1. [`BatchSource::prepare`] plans a run of batches. For most variants a
//!    plan is just a batch size; imbalanced variants pre-sample the two graph
//!    streams that get paired up.
//! 2. [`BatchSource::generate_batch`] consumes one planned batch and returns a
//!    [`LabeledBatch`].
//!
//! | Variant | Graphs | Labels | Cache |
//! |---------|--------|--------|-------|
//! | [`OtfSource`] | synthetic generator | by construction | - |
//! | [`DiskSource`] | dataset | by construction, optional filtering | - |
//! | [`ImbalancedSource`] | dataset or generator | oracle per pair | [`LabelCache`] |
//! | [`PerturbSource`] | dataset or generator | by construction on even pairs | [`LabelCache`] |
//! | [`BasisSource`] | dataset | by construction, hop curriculum | - |
//!
//! Every source owns its RNG; [`BatchOptions::seed`] reseeds it for one call.
//!
//! [`LabelCache`]: crate::cache::LabelCache

mod basis;
mod disk;
mod imbalanced;
mod otf;
mod perturb;

pub use basis::{BasisConfig, BasisSource, Phase, MAX_QUERY_HOPS};
pub use disk::{DiskConfig, DiskSource};
pub use imbalanced::{GraphPool, ImbalancedConfig, ImbalancedSource};
pub use otf::{OtfConfig, OtfSource, HARD_NEGATIVE_EDGE_PROB, MAX_HARD_NEGATIVE_EDGES};
pub use perturb::{PerturbSource, PERTURB_MAX_SIZE, PERTURB_MIN_TARGET_SIZE};

use crate::cache::LabeledGraphs;
use crate::dataset::{DatasetLoader, SYNTHETIC};
use crate::{batch_graphs, Batch, Error, Graph, Result};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

/// RNG owned by every data source.
pub type SourceRng = XorShiftRng;

/// Per-call knobs of [`BatchSource::generate_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Current training epoch, for curriculum-driven sources.
    pub epoch: Option<usize>,
    /// Reseed the source RNG before generating.
    pub seed: Option<u64>,
    /// Verify negatives with the oracle and resample false ones.
    pub filter_negs: bool,
}

impl BatchOptions {
    /// Set the epoch.
    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Set the per-call seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable negative filtering.
    pub fn with_filter_negs(mut self, filter_negs: bool) -> Self {
        self.filter_negs = filter_negs;
        self
    }
}

/// One entry of a [`BatchPlan`].
#[derive(Debug, Clone)]
pub enum PlannedBatch {
    /// Generate `n` examples (half positive, half negative) from scratch.
    Sized(usize),
    /// Label `first[i]` against `second[i]`.
    Paired {
        /// Candidate targets.
        first: Vec<Graph>,
        /// Candidate queries.
        second: Vec<Graph>,
    },
}

impl PlannedBatch {
    /// Number of examples the batch will hold.
    pub fn num_examples(&self) -> usize {
        match self {
            PlannedBatch::Sized(n) => *n,
            PlannedBatch::Paired { first, second } => first.len().min(second.len()),
        }
    }
}

/// Batches planned by [`BatchSource::prepare`].
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    batches: Vec<PlannedBatch>,
}

impl BatchPlan {
    /// Plan from explicit entries.
    pub fn new(batches: Vec<PlannedBatch>) -> Self {
        Self { batches }
    }

    /// `total / batch_size` batches of `batch_size` examples each.
    pub fn sized(total: usize, batch_size: usize) -> Result<Self> {
        check_batch_size(batch_size)?;
        Ok(Self::new(vec![PlannedBatch::Sized(batch_size); total / batch_size]))
    }

    /// Number of planned batches.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// True when nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Planned batches, in order.
    pub fn iter(&self) -> std::slice::Iter<'_, PlannedBatch> {
        self.batches.iter()
    }
}

impl IntoIterator for BatchPlan {
    type Item = PlannedBatch;
    type IntoIter = std::vec::IntoIter<PlannedBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}

/// Positive and negative (target, query) batches.
///
/// `pos_query` graph `i` is paired with `pos_target` graph `i`, likewise for
/// the negative side. Either side may be empty.
#[derive(Debug, Clone, Default)]
pub struct LabeledBatch {
    /// Targets of positive pairs.
    pub pos_target: Batch,
    /// Queries of positive pairs.
    pub pos_query: Batch,
    /// Targets of negative pairs.
    pub neg_target: Batch,
    /// Queries of negative pairs.
    pub neg_query: Batch,
}

impl LabeledBatch {
    /// Pack labeled graph lists, using the anchor indicators they carry.
    pub fn from_graphs(graphs: LabeledGraphs) -> Result<Self> {
        Ok(Self {
            pos_target: batch_graphs(graphs.pos_a, None)?,
            pos_query: batch_graphs(graphs.pos_b, None)?,
            neg_target: batch_graphs(graphs.neg_a, None)?,
            neg_query: batch_graphs(graphs.neg_b, None)?,
        })
    }

    /// Number of positive pairs.
    pub fn num_positive(&self) -> usize {
        self.pos_target.num_graphs()
    }

    /// Number of negative pairs.
    pub fn num_negative(&self) -> usize {
        self.neg_target.num_graphs()
    }
}

/// Plan-then-generate protocol shared by every source.
pub trait BatchSource {
    /// Plan `total / batch_size` batches for the given phase.
    fn prepare(&mut self, total: usize, batch_size: usize, train: bool) -> Result<BatchPlan>;

    /// Produce one labeled batch.
    fn generate_batch(
        &mut self,
        planned: PlannedBatch,
        train: bool,
        options: &BatchOptions,
    ) -> Result<LabeledBatch>;
}

/// Serializable description of a data source, tagged by `kind`.
///
/// ```json
/// {"kind": "disk", "dataset": "enzymes", "min_size": 5, "max_size": 10}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DataSourceConfig {
    /// On-the-fly synthetic pairs.
    OnTheFly(OtfConfig),
    /// Balanced pairs sampled from a dataset.
    Disk(DiskConfig),
    /// Oracle-labeled pairs with a persistent cache.
    Imbalanced(ImbalancedConfig),
    /// Imbalanced pairs with constructed positives.
    Perturb(ImbalancedConfig),
    /// Hop-curriculum pairs.
    Basis(BasisConfig),
}

impl DataSourceConfig {
    /// Dataset the source reads, if any.
    pub fn dataset(&self) -> Option<&str> {
        match self {
            DataSourceConfig::OnTheFly(_) => None,
            DataSourceConfig::Disk(c) => Some(&c.dataset),
            DataSourceConfig::Imbalanced(c) | DataSourceConfig::Perturb(c) => Some(&c.dataset),
            DataSourceConfig::Basis(c) => Some(&c.dataset),
        }
    }
}

/// One of the data source variants.
#[derive(Debug)]
pub enum DataSource {
    /// See [`OtfSource`].
    OnTheFly(OtfSource),
    /// See [`DiskSource`].
    Disk(DiskSource),
    /// See [`ImbalancedSource`].
    DiskImbalanced(ImbalancedSource),
    /// See [`PerturbSource`].
    PerturbTarget(PerturbSource),
    /// See [`BasisSource`].
    Basis(BasisSource),
}

impl DataSource {
    /// Build a source, loading its dataset through `loader`.
    ///
    /// Dataset problems (unknown name, empty splits) surface here rather than
    /// in the middle of a run.
    pub fn from_config(config: DataSourceConfig, loader: &dyn DatasetLoader) -> Result<Self> {
        Ok(match config {
            DataSourceConfig::OnTheFly(c) => DataSource::OnTheFly(OtfSource::new(c)?),
            DataSourceConfig::Disk(c) => DataSource::Disk(DiskSource::new(c, loader)?),
            DataSourceConfig::Imbalanced(c) => {
                DataSource::DiskImbalanced(ImbalancedSource::new(c, loader)?)
            }
            DataSourceConfig::Perturb(c) => DataSource::PerturbTarget(PerturbSource::new(c, loader)?),
            DataSourceConfig::Basis(c) => DataSource::Basis(BasisSource::new(c, loader)?),
        })
    }

    /// Variant name, as used in configs.
    pub fn kind(&self) -> &'static str {
        match self {
            DataSource::OnTheFly(_) => "on-the-fly",
            DataSource::Disk(_) => "disk",
            DataSource::DiskImbalanced(_) => "imbalanced",
            DataSource::PerturbTarget(_) => "perturb",
            DataSource::Basis(_) => "basis",
        }
    }

    fn inner(&mut self) -> &mut dyn BatchSource {
        match self {
            DataSource::OnTheFly(s) => s,
            DataSource::Disk(s) => s,
            DataSource::DiskImbalanced(s) => s,
            DataSource::PerturbTarget(s) => s,
            DataSource::Basis(s) => s,
        }
    }
}

impl BatchSource for DataSource {
    fn prepare(&mut self, total: usize, batch_size: usize, train: bool) -> Result<BatchPlan> {
        self.inner().prepare(total, batch_size, train)
    }

    fn generate_batch(
        &mut self,
        planned: PlannedBatch,
        train: bool,
        options: &BatchOptions,
    ) -> Result<LabeledBatch> {
        self.inner().generate_batch(planned, train, options)
    }
}

pub(crate) fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size < 2 {
        return Err(Error::InvalidConfig(format!(
            "batch size must be at least 2, got {batch_size}"
        )));
    }
    Ok(())
}

pub(crate) fn check_sizes(min_size: usize, max_size: usize) -> Result<()> {
    if min_size == 0 || min_size >= max_size {
        return Err(Error::InvalidConfig(format!(
            "need 0 < min_size < max_size, got {min_size}..{max_size}"
        )));
    }
    Ok(())
}

pub(crate) fn reject_synthetic(dataset: &str, kind: &str) -> Result<()> {
    if dataset == SYNTHETIC {
        return Err(Error::InvalidConfig(format!(
            "the {kind} source needs a real dataset, not '{SYNTHETIC}'"
        )));
    }
    Ok(())
}

pub(crate) fn reseed(rng: &mut SourceRng, options: &BatchOptions) {
    if let Some(seed) = options.seed {
        *rng = SourceRng::seed_from_u64(seed);
    }
}

/// Inclusive draw that degrades to `low` on an empty range.
pub(crate) fn draw_between<R: Rng + ?Sized>(rng: &mut R, low: usize, high: usize) -> usize {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

pub(crate) fn random_node<R: Rng + ?Sized>(g: &Graph, rng: &mut R) -> Option<NodeIndex> {
    (!g.is_empty()).then(|| NodeIndex::new(rng.random_range(0..g.node_count())))
}

/// Give `g` a random anchor, or mark every node when anchoring is off.
///
/// The all-ones indicator keeps feature widths equal between anchored and
/// unanchored runs of the oracle-labeled sources.
pub(crate) fn add_anchor<R: Rng + ?Sized>(g: &mut Graph, node_anchored: bool, rng: &mut R) {
    if !node_anchored {
        g.set_uniform_anchor(true);
    } else if let Some(anchor) = random_node(g, rng) {
        g.set_anchor(anchor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sized_plan() {
        let plan = BatchPlan::sized(100, 32).unwrap();
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|p| p.num_examples() == 32));
        assert!(BatchPlan::sized(10, 1).is_err());
        assert!(BatchPlan::sized(10, 16).unwrap().is_empty());
    }

    #[test]
    fn test_config_json() {
        let json = r#"{"kind": "disk", "dataset": "enzymes", "min_size": 5, "max_size": 10}"#;
        let config: DataSourceConfig = serde_json::from_str(json).unwrap();
        let DataSourceConfig::Disk(disk) = &config else {
            panic!("expected disk config, got {config:?}");
        };
        assert_eq!(disk.max_size, 10);
        assert!(!disk.node_anchored);
        assert_eq!(config.dataset(), Some("enzymes"));

        let otf: DataSourceConfig = serde_json::from_str(r#"{"kind": "on-the-fly"}"#).unwrap();
        assert_eq!(otf, DataSourceConfig::OnTheFly(OtfConfig::default()));
    }

    #[test]
    fn test_add_anchor() {
        let mut rng = SourceRng::seed_from_u64(0);
        let mut g = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        add_anchor(&mut g, true, &mut rng);
        assert_eq!(g.nodes().filter(|&n| g.anchor_flag(n)).count(), 1);

        add_anchor(&mut g, false, &mut rng);
        assert!(g.nodes().all(|n| g.anchor_flag(n)));
    }

    #[test]
    fn test_empty_labeled_batch() {
        let batch = LabeledBatch::from_graphs(LabeledGraphs::default()).unwrap();
        assert_eq!(batch.num_positive(), 0);
        assert_eq!(batch.num_negative(), 0);
        assert_eq!(batch.pos_query.num_nodes(), 0);
    }
}
