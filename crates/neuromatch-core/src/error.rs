//! Error types for neuromatch-core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while sampling, labeling, caching or loading graphs.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A cache file exists but could not be decoded.
    ///
    /// Never downgraded to a cache miss: silently recomputing would hide
    /// stale or truncated training data.
    #[error("corrupt cache file {path}: {reason}")]
    CorruptCache {
        /// Offending file.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// Connected-subgraph growth kept stalling before reaching `size` nodes.
    #[error("could not grow a connected subgraph of {size} nodes after {attempts} attempts")]
    SamplingExhausted {
        /// Requested node count.
        size: usize,
        /// Attempts made before giving up.
        attempts: usize,
    },

    /// Dataset name not recognized by the loader.
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// Dataset (or the split in use) holds no usable graphs.
    #[error("dataset has no graphs: {0}")]
    EmptyDataset(String),

    /// Inconsistent or unsupported configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Node feature widths disagree inside one batch.
    #[error("feature width mismatch: expected {expected}, found {found}")]
    FeatureMismatch {
        /// Width of the first feature vector seen.
        expected: usize,
        /// Width of the offending vector.
        found: usize,
    },
}

/// Result type alias for neuromatch-core.
pub type Result<T> = std::result::Result<T, Error>;
