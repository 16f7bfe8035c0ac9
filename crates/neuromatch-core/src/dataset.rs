//! Graph datasets on disk.
//!
//! A dataset is one JSON file, `<root>/<name>.json`:
//!
//! ```json
//! {
//!   "task": "graph",
//!   "graphs": [
//!     {"num_nodes": 3, "edges": [[0, 1], [1, 2]], "features": [[0.5], [1.0], [0.0]]}
//!   ]
//! }
//! ```
//!
//! `features` is optional; without it (or with `use_feats` off) every node
//! gets the constant feature `[1.0]`. Loading shuffles the graphs with a
//! seeded RNG and splits them 80/20 into train and test. A dataset made of a
//! single graph is used whole for both splits.

use crate::{Error, Graph, Result};
use petgraph::graph::NodeIndex;
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Reserved name for generator-backed sources.
pub const SYNTHETIC: &str = "syn";

/// Fraction of graphs that go to the training split.
pub const TRAIN_FRACTION: f64 = 0.8;

/// Names with a known on-disk layout. Other names load if their file exists.
pub const KNOWN_DATASETS: &[&str] = &[
    "enzymes",
    "proteins",
    "cox2",
    "dd",
    "msrc",
    "mmdb",
    "aids",
    "reddit-binary",
    "imdb-binary",
    "firstmm_db",
    "dblp",
    "ppi",
    "WN",
    "qm9",
    "atlas",
    "arxiv",
];

/// Datasets whose stored features are meaningless and always replaced.
const FEATURELESS: &[&str] = &["reddit-binary", "imdb-binary", "WN"];

/// Prediction task a dataset was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Graph-level task; each graph is one example.
    #[default]
    Graph,
    /// Node-level task on a few large graphs.
    Node,
}

/// A loaded, split dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Canonical dataset name.
    pub name: String,
    /// Training graphs.
    pub train: Vec<Graph>,
    /// Evaluation graphs.
    pub test: Vec<Graph>,
    /// Task kind.
    pub task: TaskKind,
}

impl Dataset {
    /// In-memory dataset.
    pub fn new(name: impl Into<String>, train: Vec<Graph>, test: Vec<Graph>) -> Self {
        Self {
            name: name.into(),
            train,
            test,
            task: TaskKind::Graph,
        }
    }

    /// The training or evaluation split.
    pub fn split(&self, train: bool) -> &[Graph] {
        if train {
            &self.train
        } else {
            &self.test
        }
    }

    /// Node count of the largest graph in a split.
    pub fn largest(&self, train: bool) -> usize {
        self.split(train).iter().map(Graph::node_count).max().unwrap_or(0)
    }

    /// Reject datasets where either split has nothing to sample.
    pub fn ensure_nonempty(&self) -> Result<()> {
        for (train, label) in [(true, "train"), (false, "test")] {
            if self.largest(train) == 0 {
                return Err(Error::EmptyDataset(format!("{} ({label} split)", self.name)));
            }
        }
        Ok(())
    }
}

/// Resolves dataset names to graphs.
pub trait DatasetLoader {
    /// Load and split the dataset called `name`.
    ///
    /// Stored node features are kept only when `use_feats` is set; otherwise
    /// every node gets the constant feature `[1.0]`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownDataset`] if the name cannot be resolved.
    fn load(&self, name: &str, use_feats: bool) -> Result<Dataset>;
}

/// One graph as stored in a dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Node count.
    pub num_nodes: usize,
    /// Undirected edges as node index pairs.
    #[serde(default)]
    pub edges: Vec<(usize, usize)>,
    /// Optional per-node features, one row per node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Vec<f32>>>,
}

impl GraphRecord {
    /// Record for an in-memory graph, keeping its features.
    pub fn from_graph(g: &Graph) -> Self {
        Self {
            num_nodes: g.node_count(),
            edges: g.edges().map(|(a, b)| (a.index(), b.index())).collect(),
            features: Some(g.nodes().map(|n| g.feature(n).to_vec()).collect()),
        }
    }

    /// Build the graph, with constant features unless `use_feats` is set.
    pub fn to_graph(&self, use_feats: bool) -> Result<Graph> {
        let mut g = Graph::with_capacity(self.num_nodes, self.edges.len());
        match (&self.features, use_feats) {
            (Some(rows), true) => {
                if rows.len() != self.num_nodes {
                    return Err(Error::InvalidConfig(format!(
                        "{} feature rows for {} nodes",
                        rows.len(),
                        self.num_nodes
                    )));
                }
                for row in rows {
                    g.add_node(row.clone());
                }
            }
            _ => {
                for _ in 0..self.num_nodes {
                    g.add_node(vec![1.0]);
                }
            }
        }
        for &(a, b) in &self.edges {
            if a >= self.num_nodes || b >= self.num_nodes {
                return Err(Error::InvalidConfig(format!(
                    "edge ({a}, {b}) out of range for {} nodes",
                    self.num_nodes
                )));
            }
            g.add_edge(NodeIndex::new(a), NodeIndex::new(b));
        }
        Ok(g)
    }
}

/// Contents of a dataset file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Task kind.
    #[serde(default)]
    pub task: TaskKind,
    /// Graphs, in file order.
    pub graphs: Vec<GraphRecord>,
}

impl DatasetFile {
    /// File holding `graphs`.
    pub fn from_graphs(graphs: &[Graph]) -> Self {
        Self {
            task: TaskKind::Graph,
            graphs: graphs.iter().map(GraphRecord::from_graph).collect(),
        }
    }

    /// Read a dataset file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Write a dataset file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Map aliases to the canonical dataset name.
pub fn canonical_name(name: &str) -> &str {
    match name {
        "imdb_binary" => "imdb-binary",
        "reddit_binary" => "reddit-binary",
        other => other,
    }
}

/// Loads `<root>/<name>.json` files.
#[derive(Debug, Clone)]
pub struct JsonDatasetLoader {
    root: PathBuf,
    seed: u64,
}

impl JsonDatasetLoader {
    /// Loader reading from `root` with shuffle seed 0.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seed: 0,
        }
    }

    /// Seed for the train/test shuffle.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Dataset directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File the loader reads for `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", canonical_name(name)))
    }
}

impl DatasetLoader for JsonDatasetLoader {
    fn load(&self, name: &str, use_feats: bool) -> Result<Dataset> {
        if name == SYNTHETIC {
            return Err(Error::InvalidConfig(format!(
                "'{SYNTHETIC}' is generated on the fly and has no dataset file"
            )));
        }
        let canonical = canonical_name(name);
        let path = self.path_for(name);
        let file = match DatasetFile::read(&path) {
            Ok(file) => file,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                if KNOWN_DATASETS.contains(&canonical) {
                    return Err(Error::Io(std::io::Error::new(
                        ErrorKind::NotFound,
                        format!("dataset file {} is missing", path.display()),
                    )));
                }
                return Err(Error::UnknownDataset(name.to_string()));
            }
            Err(e) => return Err(e),
        };
        if file.graphs.is_empty() {
            return Err(Error::EmptyDataset(canonical.to_string()));
        }

        let use_feats = use_feats && !FEATURELESS.contains(&canonical);
        let mut graphs = file
            .graphs
            .iter()
            .map(|r| r.to_graph(use_feats))
            .collect::<Result<Vec<_>>>()?;

        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        graphs.shuffle(&mut rng);

        let (train, test) = if graphs.len() == 1 {
            (graphs.clone(), graphs)
        } else {
            let train_len = (TRAIN_FRACTION * graphs.len() as f64) as usize;
            let test = graphs.split_off(train_len);
            (graphs, test)
        };

        info!(
            dataset = canonical,
            train = train.len(),
            test = test.len(),
            use_feats,
            "loaded dataset"
        );
        Ok(Dataset {
            name: canonical.to_string(),
            train,
            test,
            task: file.task,
        })
    }
}
