//! Connected-subgraph sampling.
//!
//! Grows a random connected node set by frontier expansion:
//!
//! 1. Pick a uniformly random start node.
//! 2. Keep a frontier of unvisited neighbors of the selected nodes. A node
//!    adjacent to several selected nodes appears once per such neighbor.
//! 3. Repeatedly pick a uniformly random frontier entry, select it, and push
//!    its unvisited neighbors.
//!
//! The result is *not* uniform over connected subgraphs of a given size:
//! because frontier entries are counted with multiplicity, well-connected
//! nodes are picked more often. Training distributions depend on this bias.
//!
//! # Key Types
//!
//! - [`sample_connected`] - bounded-retry growth on a single graph
//! - [`sample_neigh`] - pick a graph (weighted by size) and grow on it
//! - [`SizePolicy`] - uniform or power-law subgraph size draws
//! - [`hop_ball`] - nodes within k hops of a center

use crate::{Error, Graph, Result};
use petgraph::graph::NodeIndex;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::str::FromStr;

/// Default bound on growth attempts before reporting exhaustion.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Exponent of the power-law size distribution.
pub const POWER_LAW_EXPONENT: f64 = -1.1;

/// How a subgraph size is drawn from an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizePolicy {
    /// Uniform integer in the range.
    #[default]
    Uniform,
    /// Weight `(s - min_size + 2)^-1.1`, favoring small subgraphs.
    PowerLaw,
}

impl SizePolicy {
    /// Draw a size in `[low, high]`.
    ///
    /// `min_size` anchors the power-law offset. Returns `low` if the range is
    /// empty.
    pub fn draw<R: Rng + ?Sized>(self, low: usize, high: usize, min_size: usize, rng: &mut R) -> usize {
        if high <= low {
            return low;
        }
        match self {
            SizePolicy::Uniform => rng.random_range(low..=high),
            SizePolicy::PowerLaw => {
                let weights: Vec<f64> = (low..=high)
                    .map(|s| (s as f64 - min_size as f64 + 2.0).max(1.0).powf(POWER_LAW_EXPONENT))
                    .collect();
                match WeightedIndex::new(&weights) {
                    Ok(dist) => low + dist.sample(rng),
                    Err(_) => rng.random_range(low..=high),
                }
            }
        }
    }
}

/// Strategy used by disk-backed sources to build a (larger, smaller) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMethod {
    /// Grow one connected sample; the smaller side is a prefix of it.
    #[default]
    TreePair,
    /// Same growth as [`SamplingMethod::TreePair`].
    RandomWalks,
    /// Whole source graph on one side, a grown sample on the other.
    SubgraphTree,
}

impl FromStr for SamplingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tree-pair" => Ok(Self::TreePair),
            "random-walks" => Ok(Self::RandomWalks),
            "subgraph-tree" => Ok(Self::SubgraphTree),
            other => Err(Error::InvalidConfig(format!("unknown sampling method: {other}"))),
        }
    }
}

/// Size bounds and retry budget shared by the samplers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Smallest subgraph size.
    pub min_size: usize,
    /// Largest subgraph size.
    pub max_size: usize,
    /// Training-time size distribution. Evaluation always draws uniformly.
    pub size_policy: SizePolicy,
    /// Growth attempts before [`Error::SamplingExhausted`].
    pub max_attempts: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_size: 5,
            max_size: 29,
            size_policy: SizePolicy::Uniform,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl SamplerConfig {
    /// Set the size bounds.
    pub fn with_sizes(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    /// Set the training-time size policy.
    pub fn with_size_policy(mut self, policy: SizePolicy) -> Self {
        self.size_policy = policy;
        self
    }

    /// Set the retry budget.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Reject empty or inverted size ranges.
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 || self.min_size >= self.max_size {
            return Err(Error::InvalidConfig(format!(
                "need 0 < min_size < max_size, got {}..{}",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }

    /// Policy to use for the given phase.
    pub fn policy_for(&self, train: bool) -> SizePolicy {
        if train {
            self.size_policy
        } else {
            SizePolicy::Uniform
        }
    }
}

/// Single growth attempt from `start`.
///
/// Returns `None` if the frontier empties before `size` nodes are selected.
/// The first element of the result is always `start`, and every prefix of the
/// result is itself connected.
pub fn grow_from<R: Rng + ?Sized>(
    graph: &Graph,
    start: NodeIndex,
    size: usize,
    rng: &mut R,
) -> Option<Vec<NodeIndex>> {
    if size == 0 || size > graph.node_count() {
        return None;
    }

    let mut neigh = Vec::with_capacity(size);
    neigh.push(start);
    let mut visited: HashSet<NodeIndex> = HashSet::with_capacity(size);
    visited.insert(start);
    let mut frontier: Vec<NodeIndex> = graph.neighbors(start).filter(|&n| n != start).collect();

    while neigh.len() < size {
        let &next = frontier.choose(rng)?;
        neigh.push(next);
        visited.insert(next);
        frontier.extend(graph.neighbors(next));
        frontier.retain(|n| !visited.contains(n));
    }
    Some(neigh)
}

/// Single growth attempt from a uniformly random start node.
pub fn grow_connected<R: Rng + ?Sized>(
    graph: &Graph,
    size: usize,
    rng: &mut R,
) -> Option<Vec<NodeIndex>> {
    if graph.is_empty() {
        return None;
    }
    let start = NodeIndex::new(rng.random_range(0..graph.node_count()));
    grow_from(graph, start, size, rng)
}

/// Grow a connected node set of exactly `size` nodes, restarting from a new
/// random node whenever growth stalls.
///
/// # Errors
///
/// [`Error::SamplingExhausted`] after `max_attempts` stalled attempts, or
/// immediately if `size` is zero or exceeds the graph.
pub fn sample_connected<R: Rng + ?Sized>(
    graph: &Graph,
    size: usize,
    max_attempts: usize,
    rng: &mut R,
) -> Result<Vec<NodeIndex>> {
    if size == 0 || size > graph.node_count() {
        return Err(Error::SamplingExhausted { size, attempts: 0 });
    }
    for _ in 0..max_attempts {
        if let Some(nodes) = grow_connected(graph, size, rng) {
            return Ok(nodes);
        }
    }
    Err(Error::SamplingExhausted {
        size,
        attempts: max_attempts,
    })
}

/// Pick a graph with probability proportional to its node count and grow a
/// connected sample of `size` nodes in it.
///
/// Every stalled growth redraws both the graph and the start node.
///
/// # Errors
///
/// - [`Error::EmptyDataset`] if `graphs` holds no nodes at all
/// - [`Error::SamplingExhausted`] if no attempt reaches `size`
pub fn sample_neigh<'g, R: Rng + ?Sized>(
    graphs: &'g [Graph],
    size: usize,
    max_attempts: usize,
    rng: &mut R,
) -> Result<(&'g Graph, Vec<NodeIndex>)> {
    let weights: Vec<usize> = graphs.iter().map(Graph::node_count).collect();
    let largest = weights.iter().copied().max().unwrap_or(0);
    if largest == 0 {
        return Err(Error::EmptyDataset("no nodes to sample from".into()));
    }
    if size == 0 || size > largest {
        return Err(Error::SamplingExhausted { size, attempts: 0 });
    }
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| Error::InvalidConfig(format!("graph weights: {e}")))?;

    for _ in 0..max_attempts {
        let graph = &graphs[dist.sample(rng)];
        if graph.node_count() < size {
            continue;
        }
        if let Some(nodes) = grow_connected(graph, size, rng) {
            return Ok((graph, nodes));
        }
    }
    Err(Error::SamplingExhausted {
        size,
        attempts: max_attempts,
    })
}

/// Nodes within `hops` of `center`, in BFS order with `center` first.
pub fn hop_ball(graph: &Graph, center: NodeIndex, hops: usize) -> Vec<NodeIndex> {
    let mut seen = HashSet::from([center]);
    let mut order = vec![center];
    let mut queue = VecDeque::from([(center, 0usize)]);

    while let Some((n, depth)) = queue.pop_front() {
        if depth == hops {
            continue;
        }
        for nb in graph.neighbors(n) {
            if seen.insert(nb) {
                order.push(nb);
                queue.push_back((nb, depth + 1));
            }
        }
    }
    order
}
