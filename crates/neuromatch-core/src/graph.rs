use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Per-node payload: a feature vector plus the optional anchor indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttr {
    /// Semantic node features.
    pub feature: Vec<f32>,
    /// Anchor indicator. `None` until node-anchored mode touches the graph.
    #[serde(default)]
    pub anchor: Option<bool>,
    /// Index of this node in the graph it was extracted from, if any.
    #[serde(default)]
    pub source_id: Option<usize>,
}

impl NodeAttr {
    /// Node with the given features and no anchor indicator.
    pub fn new(feature: Vec<f32>) -> Self {
        Self {
            feature,
            anchor: None,
            source_id: None,
        }
    }
}

/// An undirected, simple graph with per-node features.
///
/// Uses petgraph's undirected graph internally. Self loops and parallel edges
/// are rejected at insertion, so neighbor lists never contain duplicates.
///
/// # Example
///
/// ```rust
/// use neuromatch_core::Graph;
///
/// let g = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
/// assert_eq!(g.node_count(), 4);
/// assert_eq!(g.edge_count(), 3);
/// assert!(g.is_connected());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    inner: UnGraph<NodeAttr, ()>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            inner: UnGraph::new_undirected(),
        }
    }

    /// Create an empty graph with estimated capacity.
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            inner: UnGraph::with_capacity(nodes, edges),
        }
    }

    /// `n` isolated nodes, all carrying `feature`.
    pub fn with_nodes(n: usize, feature: &[f32]) -> Self {
        let mut g = Self::with_capacity(n, 0);
        for _ in 0..n {
            g.add_node(feature.to_vec());
        }
        g
    }

    /// Build from an edge list over `n` nodes with constant `[1.0]` features.
    ///
    /// Endpoints `>= n`, self loops and duplicates are skipped.
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Self {
        let mut g = Self::with_nodes(n, &[1.0]);
        for &(a, b) in edges {
            if a < n && b < n {
                g.add_edge(NodeIndex::new(a), NodeIndex::new(b));
            }
        }
        g
    }

    /// Add a node, returning its index.
    pub fn add_node(&mut self, feature: Vec<f32>) -> NodeIndex {
        self.inner.add_node(NodeAttr::new(feature))
    }

    /// Add a node with a full attribute record.
    pub fn add_node_attr(&mut self, attr: NodeAttr) -> NodeIndex {
        self.inner.add_node(attr)
    }

    /// Add an undirected edge. Returns `false` for self loops and existing edges.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        if a == b || self.has_edge(a, b) {
            return false;
        }
        self.inner.add_edge(a, b, ());
        true
    }

    /// Remove the edge between `a` and `b`, if present.
    pub fn remove_edge(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        match self.inner.find_edge(a, b) {
            Some(e) => self.inner.remove_edge(e).is_some(),
            None => false,
        }
    }

    /// Whether `a` and `b` are adjacent.
    pub fn has_edge(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.inner.find_edge(a, b).is_some()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Node indices in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.node_indices()
    }

    /// Neighbors of `n`.
    pub fn neighbors(&self, n: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.inner.neighbors(n)
    }

    /// Degree of `n`.
    pub fn degree(&self, n: NodeIndex) -> usize {
        self.inner.neighbors(n).count()
    }

    /// Undirected edges, each reported once.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.inner.edge_references().map(|e| (e.source(), e.target()))
    }

    /// Attribute record of `n`.
    pub fn attr(&self, n: NodeIndex) -> &NodeAttr {
        &self.inner[n]
    }

    /// Feature vector of `n`.
    pub fn feature(&self, n: NodeIndex) -> &[f32] {
        &self.inner[n].feature
    }

    /// Feature width, taken from the first node.
    pub fn feature_dim(&self) -> Option<usize> {
        self.inner.node_weights().next().map(|a| a.feature.len())
    }

    /// Index of `n` in the graph this one was extracted from.
    pub fn source_id(&self, n: NodeIndex) -> Option<usize> {
        self.inner[n].source_id
    }

    /// Node-induced subgraph on `nodes`.
    ///
    /// Node `i` of the result is `nodes[i]`; features and anchor flags are
    /// inherited and `source_id` records the index in `self`. Repeated entries
    /// are ignored after their first occurrence.
    pub fn induced_subgraph(&self, nodes: &[NodeIndex]) -> Graph {
        let mut sub = Graph::with_capacity(nodes.len(), nodes.len());
        let mut mapping: HashMap<NodeIndex, NodeIndex> = HashMap::with_capacity(nodes.len());
        let mut kept = Vec::with_capacity(nodes.len());

        for &n in nodes {
            if mapping.contains_key(&n) {
                continue;
            }
            let mut attr = self.inner[n].clone();
            attr.source_id = Some(n.index());
            let new = sub.add_node_attr(attr);
            mapping.insert(n, new);
            kept.push((n, new));
        }

        // Walk in node order so neighbor iteration order is reproducible.
        for &(old, new) in &kept {
            for nb in self.inner.neighbors(old) {
                if let Some(&new_nb) = mapping.get(&nb) {
                    if new < new_nb {
                        sub.inner.add_edge(new, new_nb, ());
                    }
                }
            }
        }
        sub
    }

    /// All unordered pairs of distinct, non-adjacent nodes.
    pub fn non_edges(&self) -> Vec<(NodeIndex, NodeIndex)> {
        let nodes: Vec<NodeIndex> = self.nodes().collect();
        let mut out = Vec::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                if !self.has_edge(a, b) {
                    out.push((a, b));
                }
            }
        }
        out
    }

    /// Whether the graph is non-empty and connected.
    pub fn is_connected(&self) -> bool {
        let nodes: Vec<NodeIndex> = self.nodes().collect();
        self.is_connected_subset(&nodes)
    }

    /// Whether `nodes` is non-empty and induces a connected subgraph.
    pub fn is_connected_subset(&self, nodes: &[NodeIndex]) -> bool {
        let Some(&start) = nodes.first() else {
            return false;
        };
        let allowed: HashSet<NodeIndex> = nodes.iter().copied().collect();
        let mut seen = HashSet::with_capacity(allowed.len());
        let mut queue = VecDeque::from([start]);
        seen.insert(start);

        while let Some(n) = queue.pop_front() {
            for nb in self.inner.neighbors(n) {
                if allowed.contains(&nb) && seen.insert(nb) {
                    queue.push_back(nb);
                }
            }
        }
        seen.len() == allowed.len()
    }

    /// Mark `anchor` with indicator 1 and every other node with 0.
    pub fn set_anchor(&mut self, anchor: NodeIndex) {
        for n in self.inner.node_indices() {
            self.inner[n].anchor = Some(n == anchor);
        }
    }

    /// Give every node the same indicator value.
    pub fn set_uniform_anchor(&mut self, flag: bool) {
        for attr in self.inner.node_weights_mut() {
            attr.anchor = Some(flag);
        }
    }

    /// Set the indicator only on nodes that do not carry one yet.
    pub fn fill_missing_anchor(&mut self, anchor: NodeIndex) {
        for n in self.inner.node_indices() {
            if self.inner[n].anchor.is_none() {
                self.inner[n].anchor = Some(n == anchor);
            }
        }
    }

    /// Drop all anchor indicators.
    pub fn clear_anchor(&mut self) {
        for attr in self.inner.node_weights_mut() {
            attr.anchor = None;
        }
    }

    /// First node whose indicator is set.
    pub fn anchor(&self) -> Option<NodeIndex> {
        self.inner
            .node_indices()
            .find(|&n| self.inner[n].anchor == Some(true))
    }

    /// Indicator value of `n`; missing counts as 0.
    pub fn anchor_flag(&self, n: NodeIndex) -> bool {
        self.inner[n].anchor.unwrap_or(false)
    }

    /// Whether any node carries an indicator.
    pub fn has_anchor_indicator(&self) -> bool {
        self.inner.node_weights().any(|a| a.anchor.is_some())
    }

    /// Access the underlying petgraph graph.
    pub fn as_petgraph(&self) -> &UnGraph<NodeAttr, ()> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(n: usize) -> Graph {
        let edges: Vec<(usize, usize)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
        Graph::from_edges(n, &edges)
    }

    #[test]
    fn test_rejects_loops_and_duplicates() {
        let mut g = Graph::with_nodes(3, &[1.0]);
        let (a, b) = (NodeIndex::new(0), NodeIndex::new(1));
        assert!(g.add_edge(a, b));
        assert!(!g.add_edge(b, a));
        assert!(!g.add_edge(a, a));
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.degree(a), 1);
    }

    #[test]
    fn test_induced_subgraph_keeps_order_and_edges() {
        // 0-1-2-3 plus chord 0-2
        let g = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 3), (0, 2)]);
        let nodes = [NodeIndex::new(2), NodeIndex::new(0), NodeIndex::new(1)];
        let sub = g.induced_subgraph(&nodes);

        assert_eq!(sub.node_count(), 3);
        assert_eq!(sub.edge_count(), 3);
        assert_eq!(sub.source_id(NodeIndex::new(0)), Some(2));
        assert_eq!(sub.source_id(NodeIndex::new(1)), Some(0));
        assert!(sub.has_edge(NodeIndex::new(0), NodeIndex::new(1)));
    }

    #[test]
    fn test_induced_subgraph_inherits_anchor() {
        let mut g = path(5);
        g.set_anchor(NodeIndex::new(3));
        let sub = g.induced_subgraph(&[NodeIndex::new(3), NodeIndex::new(4)]);
        assert_eq!(sub.anchor(), Some(NodeIndex::new(0)));
        assert!(!sub.anchor_flag(NodeIndex::new(1)));
    }

    #[test]
    fn test_connectivity() {
        let g = Graph::from_edges(5, &[(0, 1), (1, 2), (3, 4)]);
        assert!(!g.is_connected());
        assert!(g.is_connected_subset(&[NodeIndex::new(0), NodeIndex::new(2), NodeIndex::new(1)]));
        assert!(!g.is_connected_subset(&[NodeIndex::new(0), NodeIndex::new(2)]));
        assert!(!Graph::new().is_connected());
    }

    #[test]
    fn test_non_edges() {
        let g = path(4);
        // 6 pairs, 3 edges
        assert_eq!(g.non_edges().len(), 3);
    }

    #[test]
    fn test_fill_missing_anchor_keeps_existing() {
        let mut g = path(3);
        g.set_anchor(NodeIndex::new(1));
        g.fill_missing_anchor(NodeIndex::new(2));
        assert_eq!(g.anchor(), Some(NodeIndex::new(1)));

        let mut h = path(3);
        h.fill_missing_anchor(NodeIndex::new(2));
        assert_eq!(h.anchor(), Some(NodeIndex::new(2)));
    }

    #[test]
    fn test_remove_edge() {
        let mut g = path(3);
        assert!(g.remove_edge(NodeIndex::new(1), NodeIndex::new(0)));
        assert!(!g.remove_edge(NodeIndex::new(1), NodeIndex::new(0)));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut g = path(4);
        g.set_anchor(NodeIndex::new(0));
        let json = serde_json::to_string(&g).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.node_count(), 4);
        assert_eq!(back.edge_count(), 3);
        assert_eq!(back.anchor(), Some(NodeIndex::new(0)));
    }
}
