//! Synthetic graph generators.
//!
//! Every generator returns a connected graph with exactly the requested number
//! of nodes and constant `[1.0]` node features.
//!
//! | Family | Shape |
//! |--------|-------|
//! | [`Family::ErdosRenyi`] | `G(n, p)` with `p` around the connectivity threshold |
//! | [`Family::WattsStrogatz`] | ring lattice with random rewiring |
//! | [`Family::BarabasiAlbert`] | preferential attachment, `m` edges per new node |
//! | [`Family::PowerLawTree`] | tree grown by degree-weighted attachment |
//!
//! Families that can come out disconnected are stitched together afterwards
//! by linking each stray component to the first one.

use crate::{Error, Graph, Result};
use petgraph::graph::NodeIndex;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Source of random connected graphs with a configurable size range.
pub trait SyntheticGenerator {
    /// A connected graph with exactly `size` nodes.
    fn generate(&self, size: usize, rng: &mut dyn RngCore) -> Graph;

    /// Inclusive size range used by [`SyntheticGenerator::generate_sized`].
    fn sizes(&self) -> (usize, usize);

    /// Replace the size range.
    fn set_size_range(&mut self, min_size: usize, max_size: usize) -> Result<()>;

    /// A graph whose size is drawn uniformly from [`SyntheticGenerator::sizes`].
    fn generate_sized(&self, rng: &mut dyn RngCore) -> Graph {
        let (lo, hi) = self.sizes();
        let size = if hi > lo { rng.random_range(lo..=hi) } else { lo };
        self.generate(size, rng)
    }
}

/// Random graph family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Family {
    /// Erdős–Rényi `G(n, p)`.
    ErdosRenyi,
    /// Watts–Strogatz small world.
    WattsStrogatz,
    /// Barabási–Albert preferential attachment.
    BarabasiAlbert,
    /// Tree with heavy-tailed degrees.
    PowerLawTree,
}

impl Family {
    /// All families, in declaration order.
    pub const ALL: [Family; 4] = [
        Family::ErdosRenyi,
        Family::WattsStrogatz,
        Family::BarabasiAlbert,
        Family::PowerLawTree,
    ];

    fn build<R: Rng + ?Sized>(self, n: usize, rng: &mut R) -> Graph {
        match self {
            Family::ErdosRenyi => erdos_renyi(n, rng),
            Family::WattsStrogatz => watts_strogatz(n, rng),
            Family::BarabasiAlbert => barabasi_albert(n, rng),
            Family::PowerLawTree => power_law_tree(n, rng),
        }
    }
}

/// Picks a family uniformly at random for every graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedGenerator {
    min_size: usize,
    max_size: usize,
    families: Vec<Family>,
}

impl CombinedGenerator {
    /// Generator over all families with sizes in `[min_size, max_size]`.
    pub fn new(min_size: usize, max_size: usize) -> Result<Self> {
        let mut generator = Self {
            min_size: 1,
            max_size: 1,
            families: Family::ALL.to_vec(),
        };
        generator.set_size_range(min_size, max_size)?;
        Ok(generator)
    }

    /// Restrict the mix to `families`. An empty list keeps the current mix.
    pub fn with_families(mut self, families: &[Family]) -> Self {
        if !families.is_empty() {
            self.families = families.to_vec();
        }
        self
    }

    /// Families in the mix.
    pub fn families(&self) -> &[Family] {
        &self.families
    }
}

impl SyntheticGenerator for CombinedGenerator {
    fn generate(&self, size: usize, rng: &mut dyn RngCore) -> Graph {
        let family = self
            .families
            .choose(rng)
            .copied()
            .unwrap_or(Family::PowerLawTree);
        let mut g = family.build(size, rng);
        connect_components(&mut g, rng);
        g
    }

    fn sizes(&self) -> (usize, usize) {
        (self.min_size, self.max_size)
    }

    fn set_size_range(&mut self, min_size: usize, max_size: usize) -> Result<()> {
        if min_size == 0 || min_size > max_size {
            return Err(Error::InvalidConfig(format!(
                "generator sizes must satisfy 0 < min <= max, got {min_size}..={max_size}"
            )));
        }
        self.min_size = min_size;
        self.max_size = max_size;
        Ok(())
    }
}

fn node(i: usize) -> NodeIndex {
    NodeIndex::new(i)
}

fn erdos_renyi<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Graph {
    let mut g = Graph::with_nodes(n, &[1.0]);
    if n < 2 {
        return g;
    }
    // Between 1x and 2x the connectivity threshold ln(n)/n.
    let threshold = (n as f64).ln().max(1.0) / n as f64;
    let p = (threshold * rng.random_range(1.0..2.0)).min(1.0);
    for a in 0..n {
        for b in a + 1..n {
            if rng.random_bool(p) {
                g.add_edge(node(a), node(b));
            }
        }
    }
    g
}

fn watts_strogatz<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Graph {
    let mut g = Graph::with_nodes(n, &[1.0]);
    if n < 2 {
        return g;
    }
    let half_k = rng.random_range(1..=((n - 1) / 2).clamp(1, 3));
    let rewire = rng.random_range(0.05..0.5);
    for a in 0..n {
        for offset in 1..=half_k {
            g.add_edge(node(a), node((a + offset) % n));
        }
    }
    let lattice: Vec<(NodeIndex, NodeIndex)> = g.edges().collect();
    for (a, b) in lattice {
        if rng.random_bool(rewire) {
            let c = node(rng.random_range(0..n));
            if c != a && !g.has_edge(a, c) {
                g.remove_edge(a, b);
                g.add_edge(a, c);
            }
        }
    }
    g
}

fn barabasi_albert<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Graph {
    let mut g = Graph::with_nodes(n, &[1.0]);
    if n < 2 {
        return g;
    }
    let m = rng.random_range(1..=(n - 1).min(4));
    // Seed clique on m + 1 nodes; every endpoint goes into the urn.
    let mut urn = Vec::new();
    for a in 0..=m {
        for b in a + 1..=m {
            g.add_edge(node(a), node(b));
            urn.push(a);
            urn.push(b);
        }
    }
    for new in m + 1..n {
        let mut linked = 0;
        while linked < m {
            let Some(&target) = urn.choose(rng) else {
                break;
            };
            if g.add_edge(node(new), node(target)) {
                urn.push(target);
                linked += 1;
            }
        }
        urn.extend(std::iter::repeat(new).take(linked));
    }
    g
}

fn power_law_tree<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Graph {
    let mut g = Graph::with_nodes(n, &[1.0]);
    let gamma = rng.random_range(1.0..2.0);
    let mut degree = vec![0usize; n];
    for new in 1..n {
        let weights: Vec<f64> = degree[..new]
            .iter()
            .map(|&d| ((d + 1) as f64).powf(gamma))
            .collect();
        let parent = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(rng),
            Err(_) => rng.random_range(0..new),
        };
        g.add_edge(node(new), node(parent));
        degree[new] += 1;
        degree[parent] += 1;
    }
    g
}

/// Link every component to the component of node 0 with one random edge.
fn connect_components<R: Rng + ?Sized>(g: &mut Graph, rng: &mut R) {
    let n = g.node_count();
    let mut label = vec![usize::MAX; n];
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();
    for start in 0..n {
        if label[start] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = vec![node(start)];
        label[start] = id;
        let mut queue = VecDeque::from([node(start)]);
        while let Some(v) = queue.pop_front() {
            for nb in g.neighbors(v) {
                if label[nb.index()] == usize::MAX {
                    label[nb.index()] = id;
                    members.push(nb);
                    queue.push_back(nb);
                }
            }
        }
        components.push(members);
    }

    let Some((first, rest)) = components.split_first() else {
        return;
    };
    for comp in rest {
        if let (Some(&a), Some(&b)) = (first.choose(rng), comp.choose(rng)) {
            g.add_edge(a, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn test_every_family_connected_and_sized() {
        let mut rng = XorShiftRng::seed_from_u64(17);
        for family in Family::ALL {
            let generator = CombinedGenerator::new(1, 40).unwrap().with_families(&[family]);
            for size in [1, 2, 3, 7, 20, 40] {
                let g = generator.generate(size, &mut rng);
                assert_eq!(g.node_count(), size, "{family:?}");
                assert!(g.is_connected(), "{family:?} size {size}");
                assert_eq!(g.feature_dim(), Some(1));
            }
        }
    }

    #[test]
    fn test_power_law_tree_is_tree() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let g = power_law_tree(30, &mut rng);
        assert_eq!(g.edge_count(), 29);
    }

    #[test]
    fn test_generate_sized_in_range() {
        let mut rng = XorShiftRng::seed_from_u64(9);
        let generator = CombinedGenerator::new(6, 12).unwrap();
        for _ in 0..50 {
            let n = generator.generate_sized(&mut rng).node_count();
            assert!((6..=12).contains(&n));
        }
    }

    #[test]
    fn test_set_size_range() {
        let mut generator = CombinedGenerator::new(6, 12).unwrap();
        generator.set_size_range(10, 30).unwrap();
        assert_eq!(generator.sizes(), (10, 30));
        assert!(generator.set_size_range(9, 3).is_err());
        assert!(CombinedGenerator::new(0, 3).is_err());
    }

    #[test]
    fn test_connect_components() {
        let mut rng = XorShiftRng::seed_from_u64(4);
        let mut g = Graph::from_edges(6, &[(0, 1), (2, 3)]);
        connect_components(&mut g, &mut rng);
        assert!(g.is_connected());
        assert_eq!(g.edge_count(), 5);
    }
}
