//! Subgraph isomorphism oracle.
//!
//! Decides whether a query graph embeds into a target graph. Two notions are
//! supported:
//!
//! | Mode | Query edge | Query non-edge |
//! |------|------------|----------------|
//! | [`MatchMode::Induced`] | must map to an edge | must map to a non-edge |
//! | [`MatchMode::Monomorphism`] | must map to an edge | unconstrained |
//!
//! With anchoring enabled, a query node may only map to a target node with
//! the same anchor indicator, so the query anchor lands on the target anchor.
//!
//! Induced existence checks go through petgraph's VF2 matcher. Embeddings and
//! monomorphisms use exhaustive backtracking here: query nodes are visited in a
//! connectivity-first order (each node after the first is adjacent to an
//! already-matched node when the query is connected), so candidates come from
//! the neighborhood of a matched node instead of the whole target.
//!
//! Node features other than the anchor indicator are ignored.

use crate::{Graph, NodeAttr};
use petgraph::algo::is_isomorphic_subgraph_matching;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

const UNMAPPED: usize = usize::MAX;

/// Which structure an embedding has to preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// Node-induced subgraph isomorphism.
    #[default]
    Induced,
    /// Edge-preserving injection (non-induced).
    Monomorphism,
}

/// Backtracking subgraph matcher.
///
/// # Example
///
/// ```rust
/// use neuromatch_core::{Graph, SubgraphMatcher};
///
/// let triangle = Graph::from_edges(3, &[(0, 1), (1, 2), (0, 2)]);
/// let path = Graph::from_edges(3, &[(0, 1), (1, 2)]);
///
/// // A path is not an induced subgraph of a triangle...
/// assert!(!SubgraphMatcher::new(&triangle, &path).is_subgraph());
/// // ...but it is contained edge-wise.
/// assert!(SubgraphMatcher::new(&triangle, &path)
///     .mode(neuromatch_core::MatchMode::Monomorphism)
///     .is_subgraph());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SubgraphMatcher<'a> {
    target: &'a Graph,
    query: &'a Graph,
    anchored: bool,
    mode: MatchMode,
}

impl<'a> SubgraphMatcher<'a> {
    /// Matcher for "is `query` a subgraph of `target`".
    pub fn new(target: &'a Graph, query: &'a Graph) -> Self {
        Self {
            target,
            query,
            anchored: false,
            mode: MatchMode::Induced,
        }
    }

    /// Require anchor indicators to agree between mapped nodes.
    pub fn anchored(mut self, anchored: bool) -> Self {
        self.anchored = anchored;
        self
    }

    /// Set the matching mode.
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether any embedding exists.
    pub fn is_subgraph(&self) -> bool {
        match self.mode {
            MatchMode::Induced => self.is_induced_subgraph(),
            MatchMode::Monomorphism => self.find_embedding().is_some(),
        }
    }

    fn is_induced_subgraph(&self) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let anchored = self.anchored;
        is_isomorphic_subgraph_matching(
            self.query.as_petgraph(),
            self.target.as_petgraph(),
            |q: &NodeAttr, t: &NodeAttr| {
                !anchored || q.anchor.unwrap_or(false) == t.anchor.unwrap_or(false)
            },
            |_: &(), _: &()| true,
        )
    }

    /// First embedding found, as `mapping[i]` = target node for query node `i`.
    pub fn find_embedding(&self) -> Option<Vec<NodeIndex>> {
        let qn = self.query.node_count();
        let tn = self.target.node_count();
        if qn == 0 {
            return Some(Vec::new());
        }
        if qn > tn || self.query.edge_count() > self.target.edge_count() {
            return None;
        }

        let t_adj = adjacency(self.target);
        let q_adj = adjacency(self.query);
        if !degrees_dominated(&t_adj, &q_adj) {
            return None;
        }

        let t_flags: Vec<bool> = self.target.nodes().map(|n| self.target.anchor_flag(n)).collect();
        let q_flags: Vec<bool> = self.query.nodes().map(|n| self.query.anchor_flag(n)).collect();
        if self.anchored && !flags_fit(&t_flags, &q_flags) {
            return None;
        }

        let (order, parent) = match_order(&q_adj, self.anchored.then_some(&q_flags[..]));
        let mut state = SearchState {
            t_adj: &t_adj,
            q_adj: &q_adj,
            t_flags: &t_flags,
            q_flags: &q_flags,
            anchored: self.anchored,
            induced: self.mode == MatchMode::Induced,
            order: &order,
            parent: &parent,
            q2t: vec![UNMAPPED; qn],
            t2q: vec![UNMAPPED; tn],
        };

        if state.extend(0) {
            Some(state.q2t.into_iter().map(NodeIndex::new).collect())
        } else {
            None
        }
    }
}

/// Node-induced subgraph test with optional anchor correspondence.
pub fn is_subgraph(target: &Graph, query: &Graph, anchored: bool) -> bool {
    SubgraphMatcher::new(target, query).anchored(anchored).is_subgraph()
}

fn adjacency(graph: &Graph) -> Vec<Vec<usize>> {
    let mut adj: Vec<Vec<usize>> = graph
        .nodes()
        .map(|n| graph.neighbors(n).map(NodeIndex::index).collect())
        .collect();
    for list in &mut adj {
        list.sort_unstable();
    }
    adj
}

fn adjacent(adj: &[Vec<usize>], a: usize, b: usize) -> bool {
    adj[a].binary_search(&b).is_ok()
}

/// The i-th largest query degree must not exceed the i-th largest target degree.
fn degrees_dominated(t_adj: &[Vec<usize>], q_adj: &[Vec<usize>]) -> bool {
    let mut t: Vec<usize> = t_adj.iter().map(Vec::len).collect();
    let mut q: Vec<usize> = q_adj.iter().map(Vec::len).collect();
    t.sort_unstable_by(|a, b| b.cmp(a));
    q.sort_unstable_by(|a, b| b.cmp(a));
    q.iter().zip(&t).all(|(qd, td)| qd <= td)
}

/// Anchored embeddings are injective per indicator class.
fn flags_fit(t_flags: &[bool], q_flags: &[bool]) -> bool {
    let count = |flags: &[bool], v: bool| flags.iter().filter(|&&f| f == v).count();
    count(q_flags, true) <= count(t_flags, true) && count(q_flags, false) <= count(t_flags, false)
}

/// Visit order plus, for each position, an earlier query neighbor (if any).
///
/// Starts at the anchor when anchored, otherwise at the highest-degree node;
/// then repeatedly takes the node with the most already-ordered neighbors.
fn match_order(q_adj: &[Vec<usize>], anchors: Option<&[bool]>) -> (Vec<usize>, Vec<Option<usize>>) {
    let n = q_adj.len();
    let mut placed = vec![false; n];
    let mut links = vec![0usize; n];
    let mut order = Vec::with_capacity(n);
    let mut parent = Vec::with_capacity(n);

    while order.len() < n {
        let next = (0..n)
            .filter(|&v| !placed[v])
            .max_by_key(|&v| {
                let is_anchor = order.is_empty() && anchors.is_some_and(|f| f[v]);
                (is_anchor, links[v], q_adj[v].len(), std::cmp::Reverse(v))
            })
            .unwrap_or_else(|| unreachable!("order shorter than node count"));

        placed[next] = true;
        parent.push(q_adj[next].iter().copied().find(|&w| placed[w] && w != next));
        order.push(next);
        for &w in &q_adj[next] {
            links[w] += 1;
        }
    }
    (order, parent)
}

struct SearchState<'s> {
    t_adj: &'s [Vec<usize>],
    q_adj: &'s [Vec<usize>],
    t_flags: &'s [bool],
    q_flags: &'s [bool],
    anchored: bool,
    induced: bool,
    order: &'s [usize],
    parent: &'s [Option<usize>],
    q2t: Vec<usize>,
    t2q: Vec<usize>,
}

impl SearchState<'_> {
    fn extend(&mut self, depth: usize) -> bool {
        if depth == self.order.len() {
            return true;
        }
        let v = self.order[depth];
        let candidates: Vec<usize> = match self.parent[depth] {
            Some(p) => self.t_adj[self.q2t[p]].clone(),
            None => (0..self.t_adj.len()).collect(),
        };

        for u in candidates {
            if !self.feasible(v, u) {
                continue;
            }
            self.q2t[v] = u;
            self.t2q[u] = v;
            if self.extend(depth + 1) {
                return true;
            }
            self.q2t[v] = UNMAPPED;
            self.t2q[u] = UNMAPPED;
        }
        false
    }

    fn feasible(&self, v: usize, u: usize) -> bool {
        if self.t2q[u] != UNMAPPED {
            return false;
        }
        if self.anchored && self.t_flags[u] != self.q_flags[v] {
            return false;
        }
        if self.t_adj[u].len() < self.q_adj[v].len() {
            return false;
        }
        // Every matched query neighbor must be a target neighbor.
        for &w in &self.q_adj[v] {
            let mapped = self.q2t[w];
            if mapped != UNMAPPED && !adjacent(self.t_adj, u, mapped) {
                return false;
            }
        }
        // Induced: every matched target neighbor must be a query neighbor.
        if self.induced {
            for &x in &self.t_adj[u] {
                let back = self.t2q[x];
                if back != UNMAPPED && !adjacent(self.q_adj, v, back) {
                    return false;
                }
            }
        }
        true
    }
}
