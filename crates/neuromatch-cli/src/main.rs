//! neuromatch CLI - inspect datasets and prepare subgraph matching batches.
//!
//! # Usage
//!
//! ```bash
//! # Split sizes and node counts of a dataset
//! neuromatch stats enzymes --root data
//!
//! # Build one batch and print its four sides
//! neuromatch sample --kind on-the-fly --batch-size 64
//! neuromatch sample --config source.json --root data --eval
//!
//! # Precompute oracle labels for imbalanced training
//! neuromatch warm-cache --dataset syn --batches 100 --batch-size 64
//! ```
//!
//! Logging goes through `tracing`; set `RUST_LOG=debug` for cache details.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use neuromatch_core::dataset::{Dataset, DatasetLoader, JsonDatasetLoader};
use neuromatch_core::source::{
    BasisConfig, DiskConfig, ImbalancedConfig, ImbalancedSource, OtfConfig, PerturbSource,
};
use neuromatch_core::{
    Batch, BatchOptions, BatchSource, DataSource, DataSourceConfig, Graph, LabeledBatch,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neuromatch")]
#[command(about = "Subgraph matching training data", long_about = None)]
struct Cli {
    /// Directory holding `<dataset>.json` files
    #[arg(long, global = true, default_value = "data")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show split sizes and node counts of a dataset
    Stats {
        /// Dataset name
        dataset: String,

        /// Seed of the train/test shuffle
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Build one batch and print its positive and negative sides
    Sample {
        /// JSON data source config (overrides --kind and --dataset)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data source kind
        #[arg(long, default_value = "on-the-fly")]
        kind: SourceKind,

        /// Dataset name
        #[arg(long, default_value = "enzymes")]
        dataset: String,

        /// Examples in the batch
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Sample from the evaluation split
        #[arg(long)]
        eval: bool,

        /// Training epoch, for curriculum sources
        #[arg(long)]
        epoch: Option<usize>,

        /// Verify negatives with the oracle
        #[arg(long)]
        filter_negs: bool,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Precompute imbalanced label cache files
    WarmCache {
        /// Dataset name, or `syn` for generated graphs
        #[arg(long, default_value = "syn")]
        dataset: String,

        /// Number of batches to label
        #[arg(long, default_value = "10")]
        batches: usize,

        /// Examples per batch
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Cache directory
        #[arg(long, default_value = "data/cache")]
        cache_dir: PathBuf,

        /// Anchor pairs at a node
        #[arg(long)]
        node_anchored: bool,

        /// Use the constructed-positive variant
        #[arg(long)]
        perturb: bool,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    /// Synthetic graphs generated per batch
    OnTheFly,
    /// Balanced pairs from a dataset
    Disk,
    /// Oracle-labeled pairs
    Imbalanced,
    /// Oracle-labeled pairs with constructed positives
    Perturb,
    /// Hop curriculum
    Basis,
}

impl SourceKind {
    fn config(self, dataset: String, seed: u64) -> DataSourceConfig {
        match self {
            SourceKind::OnTheFly => {
                DataSourceConfig::OnTheFly(OtfConfig::default().with_seed(seed))
            }
            SourceKind::Disk => DataSourceConfig::Disk(DiskConfig::new(dataset).with_seed(seed)),
            SourceKind::Imbalanced => {
                DataSourceConfig::Imbalanced(ImbalancedConfig::new(dataset).with_seed(seed))
            }
            SourceKind::Perturb => {
                DataSourceConfig::Perturb(ImbalancedConfig::new(dataset).with_seed(seed))
            }
            SourceKind::Basis => {
                DataSourceConfig::Basis(BasisConfig::new(dataset).with_seed(seed))
            }
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Stats { dataset, seed } => cmd_stats(&cli.root, &dataset, seed),
        Commands::Sample {
            config,
            kind,
            dataset,
            batch_size,
            eval,
            epoch,
            filter_negs,
            seed,
        } => {
            let config = match config {
                Some(path) => read_config(&path)?,
                None => kind.config(dataset, seed),
            };
            let mut options = BatchOptions::default().with_filter_negs(filter_negs);
            if let Some(epoch) = epoch {
                options = options.with_epoch(epoch);
            }
            cmd_sample(&cli.root, config, batch_size, !eval, &options)
        }
        Commands::WarmCache {
            dataset,
            batches,
            batch_size,
            cache_dir,
            node_anchored,
            perturb,
            seed,
        } => {
            let config = ImbalancedConfig::new(dataset)
                .with_node_anchored(node_anchored)
                .with_cache_dir(cache_dir)
                .with_seed(seed);
            cmd_warm_cache(&cli.root, config, batches, batch_size, perturb)
        }
    }
}

fn read_config(path: &Path) -> Result<DataSourceConfig> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse data source config {}", path.display()))
}

fn load_dataset(root: &Path, name: &str, seed: u64) -> Result<Dataset> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {name}..."));

    let loader = JsonDatasetLoader::new(root).with_seed(seed);
    let dataset = loader
        .load(name, true)
        .with_context(|| format!("Failed to load dataset {name} from {}", root.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(dataset)
}

fn cmd_stats(root: &Path, name: &str, seed: u64) -> Result<()> {
    let dataset = load_dataset(root, name, seed)?;

    println!("Dataset {}", dataset.name);
    println!("==========================");
    for (label, graphs) in [("Train", &dataset.train), ("Test", &dataset.test)] {
        let sizes: Vec<usize> = graphs.iter().map(Graph::node_count).collect();
        let edges: usize = graphs.iter().map(Graph::edge_count).sum();
        let min = sizes.iter().min().copied().unwrap_or(0);
        let max = sizes.iter().max().copied().unwrap_or(0);
        let avg = if sizes.is_empty() {
            0.0
        } else {
            sizes.iter().sum::<usize>() as f64 / sizes.len() as f64
        };
        println!("{label} graphs:    {}", graphs.len());
        println!("{label} nodes:     min {min}, max {max}, avg {avg:.2}");
        println!("{label} edges:     {edges}");
    }

    Ok(())
}

fn print_side(label: &str, batch: &Batch) {
    println!(
        "{label:<14} {:>4} graphs {:>6} nodes {:>6} edges",
        batch.num_graphs(),
        batch.num_nodes(),
        batch.edge_index().len() / 2
    );
}

fn print_batch(batch: &LabeledBatch) {
    print_side("pos_target", &batch.pos_target);
    print_side("pos_query", &batch.pos_query);
    print_side("neg_target", &batch.neg_target);
    print_side("neg_query", &batch.neg_query);
}

fn cmd_sample(
    root: &Path,
    config: DataSourceConfig,
    batch_size: usize,
    train: bool,
    options: &BatchOptions,
) -> Result<()> {
    let loader = JsonDatasetLoader::new(root);
    let mut source =
        DataSource::from_config(config, &loader).context("Failed to build data source")?;
    info!(kind = source.kind(), batch_size, train, "sampling one batch");

    let start = Instant::now();
    let plan = source.prepare(batch_size, batch_size, train)?;
    let Some(planned) = plan.into_iter().next() else {
        bail!("batch size {batch_size} produced no batch");
    };
    let batch = source.generate_batch(planned, train, options)?;

    println!("Sampled {} batch in {:.2?}", source.kind(), start.elapsed());
    print_batch(&batch);
    Ok(())
}

fn cmd_warm_cache(
    root: &Path,
    config: ImbalancedConfig,
    batches: usize,
    batch_size: usize,
    perturb: bool,
) -> Result<()> {
    let loader = JsonDatasetLoader::new(root);
    let cache_dir = config.cache_dir.clone();
    let mut source: Box<dyn BatchSource> = if perturb {
        Box::new(PerturbSource::new(config, &loader)?)
    } else {
        Box::new(ImbalancedSource::new(config, &loader)?)
    };

    let pb = ProgressBar::new(batches as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} batches ({eta})")
            .context("Invalid progress template")?,
    );

    let start = Instant::now();
    let plan = source.prepare(batches * batch_size, batch_size, true)?;
    let (mut positives, mut negatives) = (0, 0);
    for planned in plan {
        let batch = source.generate_batch(planned, true, &BatchOptions::default())?;
        positives += batch.num_positive();
        negatives += batch.num_negative();
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Labeled {batches} batches in {:.2?}: {positives} positive, {negatives} negative",
        start.elapsed()
    );
    println!("Cache: {}", cache_dir.display());
    Ok(())
}
