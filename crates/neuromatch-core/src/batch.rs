//! Model-ready batches.
//!
//! A [`Batch`] concatenates the nodes of several graphs into one feature
//! matrix, PyG style:
//!
//! ```text
//! node_features  (N x F)   rows of all graphs, graph 0 first
//! batch          (N)       graph id of each row
//! ptr            (G + 1)   row offset of each graph
//! edge_index     (2E)      (src, dst) row pairs, both directions
//! anchor         (N)       1.0 at each graph's anchor, 0.0 elsewhere
//! ```

use crate::{Error, Graph, Result};
use ndarray::{s, Array1, Array2};
use petgraph::graph::NodeIndex;

/// A collection of graphs packed for model consumption.
#[derive(Debug, Clone)]
pub struct Batch {
    graphs: Vec<Graph>,
    node_features: Array2<f32>,
    batch: Vec<usize>,
    ptr: Vec<usize>,
    edge_index: Vec<(usize, usize)>,
    anchor: Option<Array1<f32>>,
}

impl Default for Batch {
    fn default() -> Self {
        Self::empty()
    }
}

impl Batch {
    /// A batch with zero graphs and zero nodes.
    pub fn empty() -> Self {
        Self {
            graphs: Vec::new(),
            node_features: Array2::zeros((0, 0)),
            batch: Vec::new(),
            ptr: vec![0],
            edge_index: Vec::new(),
            anchor: None,
        }
    }

    /// Number of graphs.
    pub fn num_graphs(&self) -> usize {
        self.graphs.len()
    }

    /// Total number of nodes across graphs.
    pub fn num_nodes(&self) -> usize {
        self.batch.len()
    }

    /// True when the batch holds no graphs.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// The packed graphs, in input order.
    pub fn graphs(&self) -> &[Graph] {
        &self.graphs
    }

    /// Consume the batch, returning its graphs.
    pub fn into_graphs(self) -> Vec<Graph> {
        self.graphs
    }

    /// Stacked node features.
    pub fn node_features(&self) -> &Array2<f32> {
        &self.node_features
    }

    /// Graph membership of each node row.
    pub fn batch_index(&self) -> &[usize] {
        &self.batch
    }

    /// Row offsets; graph `i` spans `ptr[i]..ptr[i + 1]`.
    pub fn ptr(&self) -> &[usize] {
        &self.ptr
    }

    /// Edges as row pairs, each undirected edge listed in both directions.
    pub fn edge_index(&self) -> &[(usize, usize)] {
        &self.edge_index
    }

    /// Per-node anchor indicator, when the graphs carry one.
    pub fn anchor(&self) -> Option<&Array1<f32>> {
        self.anchor.as_ref()
    }

    /// Node features with the anchor indicator appended as the last column.
    ///
    /// Without an indicator this is a copy of [`Batch::node_features`].
    pub fn features_with_anchor(&self) -> Array2<f32> {
        let Some(anchor) = &self.anchor else {
            return self.node_features.clone();
        };
        let (rows, dim) = self.node_features.dim();
        let mut out = Array2::zeros((rows, dim + 1));
        out.slice_mut(s![.., ..dim]).assign(&self.node_features);
        out.column_mut(dim).assign(anchor);
        out
    }
}

/// Pack graphs into a [`Batch`].
///
/// With `anchors`, graph `i` gets its indicator set to 1 at `anchors[i]` and
/// 0 elsewhere before packing. Without, indicators already present on the
/// graphs are used (missing values count as 0); if no graph has one, the
/// batch has no anchor column.
///
/// An empty input yields an empty batch.
///
/// # Errors
///
/// - [`Error::InvalidConfig`] if `anchors` and `graphs` differ in length
/// - [`Error::FeatureMismatch`] if feature widths differ
pub fn batch_graphs(mut graphs: Vec<Graph>, anchors: Option<&[NodeIndex]>) -> Result<Batch> {
    if let Some(anchors) = anchors {
        if anchors.len() != graphs.len() {
            return Err(Error::InvalidConfig(format!(
                "{} anchors for {} graphs",
                anchors.len(),
                graphs.len()
            )));
        }
        for (g, &a) in graphs.iter_mut().zip(anchors) {
            g.set_anchor(a);
        }
    }
    if graphs.is_empty() {
        return Ok(Batch::empty());
    }

    let dim = graphs.iter().find_map(Graph::feature_dim).unwrap_or(0);
    let total: usize = graphs.iter().map(Graph::node_count).sum();
    let with_anchor = graphs.iter().any(Graph::has_anchor_indicator);

    let mut node_features = Array2::zeros((total, dim));
    let mut anchor = with_anchor.then(|| Array1::zeros(total));
    let mut batch = Vec::with_capacity(total);
    let mut ptr = Vec::with_capacity(graphs.len() + 1);
    let mut edge_index = Vec::new();
    ptr.push(0);

    let mut row = 0;
    for (gi, g) in graphs.iter().enumerate() {
        let offset = row;
        for n in g.nodes() {
            let feature = g.feature(n);
            if feature.len() != dim {
                return Err(Error::FeatureMismatch {
                    expected: dim,
                    found: feature.len(),
                });
            }
            for (j, &x) in feature.iter().enumerate() {
                node_features[[row, j]] = x;
            }
            if let Some(col) = anchor.as_mut() {
                col[row] = if g.anchor_flag(n) { 1.0 } else { 0.0 };
            }
            batch.push(gi);
            row += 1;
        }
        for (a, b) in g.edges() {
            edge_index.push((offset + a.index(), offset + b.index()));
            edge_index.push((offset + b.index(), offset + a.index()));
        }
        ptr.push(row);
    }

    Ok(Batch {
        graphs,
        node_features,
        batch,
        ptr,
        edge_index,
        anchor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let batch = batch_graphs(Vec::new(), None).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.num_nodes(), 0);
        assert_eq!(batch.ptr(), &[0]);

        let batch = batch_graphs(Vec::new(), Some(&[])).unwrap();
        assert_eq!(batch.num_graphs(), 0);
    }

    #[test]
    fn test_membership_and_edges() {
        let a = Graph::from_edges(3, &[(0, 1), (1, 2)]);
        let b = Graph::from_edges(2, &[(0, 1)]);
        let batch = batch_graphs(vec![a, b], None).unwrap();

        assert_eq!(batch.num_graphs(), 2);
        assert_eq!(batch.num_nodes(), 5);
        assert_eq!(batch.batch_index(), &[0, 0, 0, 1, 1]);
        assert_eq!(batch.ptr(), &[0, 3, 5]);
        assert_eq!(batch.edge_index().len(), 6);
        assert!(batch.edge_index().contains(&(4, 3)));
        assert_eq!(batch.node_features().dim(), (5, 1));
        assert!(batch.anchor().is_none());
    }

    #[test]
    fn test_explicit_anchors() {
        let a = Graph::from_edges(3, &[(0, 1), (1, 2)]);
        let b = Graph::from_edges(2, &[(0, 1)]);
        let anchors = [NodeIndex::new(2), NodeIndex::new(0)];
        let batch = batch_graphs(vec![a, b], Some(&anchors)).unwrap();

        let anchor = batch.anchor().unwrap();
        assert_eq!(anchor.to_vec(), vec![0.0, 0.0, 1.0, 1.0, 0.0]);
        assert_eq!(anchor.sum(), 2.0);

        let feats = batch.features_with_anchor();
        assert_eq!(feats.dim(), (5, 2));
        assert_eq!(feats[[2, 1]], 1.0);
        assert_eq!(feats[[2, 0]], 1.0);
    }

    #[test]
    fn test_indicator_from_graphs() {
        let mut a = Graph::from_edges(2, &[(0, 1)]);
        a.set_anchor(NodeIndex::new(1));
        let b = Graph::from_edges(2, &[(0, 1)]);
        let batch = batch_graphs(vec![a, b], None).unwrap();
        assert_eq!(batch.anchor().unwrap().to_vec(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_anchor_count_mismatch() {
        let a = Graph::from_edges(2, &[(0, 1)]);
        assert!(matches!(
            batch_graphs(vec![a], Some(&[])),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_feature_mismatch() {
        let a = Graph::with_nodes(2, &[1.0, 0.0]);
        let b = Graph::with_nodes(2, &[1.0]);
        assert!(matches!(
            batch_graphs(vec![a, b], None),
            Err(Error::FeatureMismatch { expected: 2, found: 1 })
        ));
    }
}
