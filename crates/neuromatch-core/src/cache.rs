//! On-disk cache of labeled pairs.
//!
//! Labeling imbalanced batches runs the isomorphism oracle on every pair, so
//! finished batches are written to one file per (configuration, batch index)
//! and reloaded on later runs.
//!
//! # Layout
//!
//! ```text
//! data/cache/imbalanced-enzymes-false-false-false-true-0
//!            ^prefix    ^dataset ^anchored ^whole ^feats ^larger ^batch
//! ```
//!
//! Each file is a bincode-encoded envelope carrying a format version and the
//! key it was written for. Files are never evicted.
//!
//! | File state | Outcome |
//! |------------|---------|
//! | absent or zero-length | miss, recompute |
//! | older format version | miss, recompute and overwrite |
//! | undecodable or keyed differently | [`Error::CorruptCache`] |
//!
//! Writers go through a temporary file and a rename, so a reader never sees a
//! partial file. Two processes computing the same key race benignly: the
//! last rename wins.

use crate::{Error, Graph, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bumped whenever labeling semantics change, invalidating older files.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "data/cache";

/// Deterministic identity of one cached batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Variant prefix, e.g. `imbalanced` or `imbalanced-perturb`.
    pub prefix: String,
    /// Dataset name (lowercased in the file name).
    pub dataset: String,
    /// Node-anchored mode.
    pub node_anchored: bool,
    /// Targets are whole dataset graphs.
    pub use_whole_targets: bool,
    /// Real node features were kept.
    pub use_feats: bool,
    /// Pairs were swapped so the first graph is the larger.
    pub target_larger: bool,
    /// Position of the batch in the run.
    pub batch_idx: usize,
}

impl CacheKey {
    /// File name for this key.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}-{}",
            self.prefix,
            self.dataset.to_lowercase(),
            self.node_anchored,
            self.use_whole_targets,
            self.use_feats,
            self.target_larger,
            self.batch_idx
        )
    }
}

/// Graphs of one labeled batch, split by label.
///
/// `pos_a[i]`/`pos_b[i]` and `neg_a[i]`/`neg_b[i]` are (target, query) pairs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabeledGraphs {
    /// Targets of positive pairs.
    pub pos_a: Vec<Graph>,
    /// Queries of positive pairs.
    pub pos_b: Vec<Graph>,
    /// Targets of negative pairs.
    pub neg_a: Vec<Graph>,
    /// Queries of negative pairs.
    pub neg_b: Vec<Graph>,
}

impl LabeledGraphs {
    /// Record a labeled pair.
    pub fn push(&mut self, target: Graph, query: Graph, positive: bool) {
        if positive {
            self.pos_a.push(target);
            self.pos_b.push(query);
        } else {
            self.neg_a.push(target);
            self.neg_b.push(query);
        }
    }

    /// Number of positive pairs.
    pub fn num_positive(&self) -> usize {
        self.pos_a.len()
    }

    /// Number of negative pairs.
    pub fn num_negative(&self) -> usize {
        self.neg_a.len()
    }
}

#[derive(Serialize)]
struct EntryRef<'a> {
    version: u32,
    key: &'a CacheKey,
    graphs: &'a LabeledGraphs,
}

#[derive(Deserialize)]
struct Header {
    version: u32,
}

#[derive(Deserialize)]
struct Entry {
    version: u32,
    key: CacheKey,
    graphs: LabeledGraphs,
}

/// Directory of cached labeled batches.
#[derive(Debug, Clone)]
pub struct LabelCache {
    dir: PathBuf,
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

impl LabelCache {
    /// Cache rooted at `dir` (created lazily on first store).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the file for `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Whether a file exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Load the batch stored under `key`, or `None` on a miss.
    pub fn load(&self, key: &CacheKey) -> Result<Option<LabeledGraphs>> {
        let path = self.path_for(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            warn!(path = %path.display(), "empty cache file, recomputing");
            return Ok(None);
        }
        let corrupt = |e: bincode::Error| Error::CorruptCache {
            path: path.clone(),
            reason: e.to_string(),
        };

        // The version prefix decodes the same way in every format.
        let header: Header = bincode::deserialize(&bytes).map_err(corrupt)?;
        if header.version != CACHE_FORMAT_VERSION {
            warn!(
                path = %path.display(),
                found = header.version,
                expected = CACHE_FORMAT_VERSION,
                "stale cache format, recomputing"
            );
            return Ok(None);
        }
        let entry: Entry = bincode::deserialize(&bytes).map_err(corrupt)?;
        if entry.key != *key {
            return Err(Error::CorruptCache {
                path,
                reason: format!("written for {}", entry.key.file_name()),
            });
        }

        info!(
            path = %path.display(),
            positives = entry.graphs.num_positive(),
            negatives = entry.graphs.num_negative(),
            "loaded cached batch"
        );
        Ok(Some(entry.graphs))
    }

    /// Store `graphs` under `key`, replacing any existing file.
    pub fn store(&self, key: &CacheKey, graphs: &LabeledGraphs) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key.file_name(), std::process::id()));

        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let entry = EntryRef {
                version: CACHE_FORMAT_VERSION,
                key,
                graphs,
            };
            bincode::serialize_into(&mut writer, &entry)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        info!(path = %path.display(), "saved cached batch");
        Ok(path)
    }
}
