//! # sensor-train
//!
//! Offline training for the scoring service: fits the standard scaler and
//! the isolation forest on a CSV of healthy readings and writes
//! `scaler.json` and `isolation_forest.json` into the model directory.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use sensor_anomaly::ingest;
use sensor_anomaly::ml::{
    Contamination, FeatureScaler, IsolationForest, IsolationForestParams, ModelStore,
    StandardScaler,
};
use sensor_anomaly::pipeline;

#[derive(Parser)]
#[command(name = "sensor-train")]
#[command(about = "Fit scaler and isolation forest artifacts from a CSV", long_about = None)]
struct Cli {
    /// Training CSV (header row required)
    #[arg(short, long)]
    input: PathBuf,

    /// Output model directory
    #[arg(short, long, default_value = "models")]
    output: PathBuf,

    /// Number of trees
    #[arg(short, long, default_value_t = 100)]
    trees: usize,

    /// Subsample size per tree (default: min(256, rows))
    #[arg(long)]
    max_samples: Option<usize>,

    /// "auto" or expected outlier fraction in (0, 0.5]
    #[arg(short, long, default_value = "auto")]
    contamination: Contamination,

    /// Random seed for reproducible artifacts
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_anomaly=info,sensor_train=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let bytes = fs::read(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let records = ingest::parse_csv(&bytes)?;
    anyhow::ensure!(!records.is_empty(), "{} has no data rows", cli.input.display());

    let x = pipeline::feature_matrix(records)?;
    tracing::info!("Training on {} rows", x.nrows());

    let scaler = StandardScaler::fit(&x)?;
    let scaled = scaler.transform(&x)?;

    let params = IsolationForestParams {
        n_estimators: cli.trees,
        max_samples: cli.max_samples,
        contamination: cli.contamination,
        random_state: cli.seed,
    };
    let forest = IsolationForest::fit(&scaled, &params)?;

    ModelStore::save(&cli.output, &scaler, &forest)?;
    tracing::info!(
        "Artifacts written to {} ({} trees, offset {:.4})",
        cli.output.display(),
        forest.trees.len(),
        forest.offset
    );

    Ok(())
}
