//! Graph algorithms used to build training pairs.
//!
//! - [`sampling`] - connected subgraph growth and size policies
//! - [`isomorphism`] - subgraph isomorphism oracle (ground-truth labels)

pub mod isomorphism;
pub mod sampling;
