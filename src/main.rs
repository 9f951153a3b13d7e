//! streamsed - Stream-Sediment Geochemical Targeting
//!
//! Turns a raw survey CSV export into cleaned sample points, per-element
//! statistics, anomaly-derived follow-up targets, and a QC summary.
//!
//! # Usage
//!
//! ```bash
//! # Default p95 strictness, built-in column mapping
//! streamsed --input survey.csv --out web/data
//!
//! # Stricter cutoff, selected elements only
//! streamsed --input survey.csv --out web/data --percentile p99 \
//!     --element As --element Au
//! ```
//!
//! # Environment Variables
//!
//! - `STREAMSED_CONFIG`: Path to a TOML config (otherwise ./streamsed.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use streamsed::config::PipelineConfig;
use streamsed::pipeline::Pipeline;
use streamsed::types::PercentileKey;
use streamsed::{ingest, writer};
use tracing::info;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "streamsed")]
#[command(about = "Stream-sediment geochemical survey targeting pipeline")]
#[command(version)]
struct CliArgs {
    /// Path to the survey CSV export
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Output directory for samples/targets/stats/QC artifacts
    #[arg(long, value_name = "DIR")]
    out: PathBuf,

    /// Config file path (overrides the STREAMSED_CONFIG / ./streamsed.toml search)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Anomaly strictness: p50, p95, or p99 (overrides config)
    #[arg(long, value_name = "KEY")]
    percentile: Option<String>,

    /// Clustering radius in km (overrides config)
    #[arg(long, value_name = "KM")]
    radius_km: Option<f64>,

    /// Minimum samples per target (overrides config)
    #[arg(long, value_name = "N")]
    min_cluster_size: Option<usize>,

    /// Process only this element (repeatable; default: all analyte columns)
    #[arg(long = "element", value_name = "NAME")]
    elements: Vec<String>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::load(),
    };

    // CLI overrides, re-validated before the run
    if let Some(key) = &args.percentile {
        config.anomaly.percentile = key
            .parse::<PercentileKey>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid --percentile")?;
    }
    if let Some(radius_km) = args.radius_km {
        config.clustering.radius_km = radius_km;
    }
    if let Some(min_cluster_size) = args.min_cluster_size {
        config.clustering.min_cluster_size = min_cluster_size;
    }
    if !args.elements.is_empty() {
        config.elements = Some(args.elements.clone());
    }
    config.validate().context("configuration invalid")?;

    info!(
        input = %args.input.display(),
        percentile = %config.anomaly.percentile,
        radius_km = config.clustering.radius_km,
        min_cluster_size = config.clustering.min_cluster_size,
        "Starting survey pipeline"
    );

    let table = ingest::load_csv(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let bundle = Pipeline::run(&table, &config).context("pipeline failed")?;

    writer::write_artifacts(&args.out, &bundle)
        .with_context(|| format!("writing artifacts to {}", args.out.display()))?;

    info!(
        rows_mapped = bundle.qc.rows_mapped,
        rows_total = bundle.qc.rows_total,
        elements = bundle.stats.len(),
        targets = bundle.results.values().map(|r| r.targets.len()).sum::<usize>(),
        "Run complete"
    );
    Ok(())
}
