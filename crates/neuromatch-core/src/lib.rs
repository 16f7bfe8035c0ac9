// Allow minor clippy style warnings at crate level
// These are mostly style preferences, not bugs
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::uninlined_format_args)]

//! Training data for neural subgraph matching.
//!
//! A subgraph matching model learns to answer "is query `q` a subgraph of
//! target `t`?" from labeled pairs. This crate produces those pairs:
//!
//! - [`algo::sampling`] - connected subgraph sampling (the core primitive)
//! - [`algo::isomorphism`] - exact subgraph isomorphism, used as a label oracle
//! - [`generator`] - synthetic graph families for on-the-fly training
//! - [`dataset`] - graph datasets stored on disk
//! - [`source`] - data sources producing positive and negative pairs
//! - [`cache`] - persistent cache of oracle labels
//! - [`batch_graphs`] - packing graphs into one disjoint-union [`Batch`]
//!
//! # Data sources
//!
//! | Source | Pairs |
//! |--------|-------|
//! | [`source::OtfSource`] | synthetic targets, hard negatives by edge perturbation |
//! | [`source::DiskSource`] | balanced pairs from a dataset |
//! | [`source::ImbalancedSource`] | random pairs labeled by the oracle, cached |
//! | [`source::PerturbSource`] | like imbalanced, half the pairs positive by construction |
//! | [`source::BasisSource`] | hop-limited queries with an epoch curriculum |
//!
//! # Example
//!
//! ```rust
//! use neuromatch_core::source::{BatchOptions, BatchSource, OtfConfig, OtfSource};
//!
//! let mut source = OtfSource::new(OtfConfig::default().with_seed(7)).unwrap();
//! let plan = source.prepare(64, 32, true).unwrap();
//! for planned in plan {
//!     let batch = source
//!         .generate_batch(planned, true, &BatchOptions::default())
//!         .unwrap();
//!     assert_eq!(batch.num_positive(), 16);
//!     assert_eq!(batch.num_negative(), 16);
//! }
//! ```

pub mod algo;
mod batch;
pub mod cache;
pub mod dataset;
mod error;
pub mod generator;
mod graph;
pub mod source;

pub use algo::isomorphism::{is_subgraph, MatchMode, SubgraphMatcher};
pub use algo::sampling::{
    hop_ball, sample_connected, sample_neigh, SamplerConfig, SamplingMethod, SizePolicy,
};
pub use batch::{batch_graphs, Batch};
pub use error::{Error, Result};
pub use graph::{Graph, NodeAttr};
pub use source::{
    BatchOptions, BatchPlan, BatchSource, DataSource, DataSourceConfig, LabeledBatch, PlannedBatch,
};

// Re-export petgraph for node indices and advanced graph operations
pub use petgraph;
