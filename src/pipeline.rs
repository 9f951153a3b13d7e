//! Pipeline coordinator — one batch run over a static input snapshot
//!
//! Stages run strictly in sequence (normalize → statistics → anomaly →
//! cluster → assemble), but the per-element stages are embarrassingly
//! parallel: statistics, classification, and clustering fan out across
//! elements on the rayon pool with no shared mutable state, and the
//! results merge into ordered maps afterwards so output is deterministic
//! regardless of worker scheduling.
//!
//! Either the full artifact bundle is produced or the run fails — partial
//! output is never emitted.

use crate::anomaly::{AnomalyClassifier, AnomalySet};
use crate::cluster::TargetClusterer;
use crate::config::{ConfigError, PipelineConfig};
use crate::normalize::{analyte_columns, NormalizeError, RecordNormalizer};
use crate::stats::StatsEngine;
use crate::types::{ElementStats, QcSummary, RawTable, SampleRecord, Target};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Fatal pipeline failures. Row-level data issues never appear here —
/// they are folded into the QC summary instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Anomalies and targets for one element at the selected strictness.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementResult {
    pub anomalies: AnomalySet,
    pub targets: Vec<Target>,
}

/// Everything one run produces, packaged for the writer / front end.
#[derive(Debug, Clone)]
pub struct ArtifactBundle {
    /// Every input row, with validity flags — including unmappable and
    /// duplicate records, so QC stays reconstructable
    pub records: Vec<SampleRecord>,
    /// Element → stats, for every element with at least one usable reading
    pub stats: BTreeMap<String, ElementStats>,
    pub qc: QcSummary,
    /// Element → anomalies + targets at the configured strictness
    pub results: BTreeMap<String, ElementResult>,
    /// Echo of the parameters the bundle is a pure function of
    pub parameters: RunParameters,
}

/// The (strictness, geometry) tuple a bundle was computed for.
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub percentile: crate::types::PercentileKey,
    pub radius_km: f64,
    pub min_cluster_size: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// The batch pipeline. Stateless; one call = one reproducible run.
pub struct Pipeline;

impl Pipeline {
    /// Run the full pipeline over an ingested table.
    ///
    /// Configuration is validated before any row is touched; structural
    /// input problems abort the run with no output.
    pub fn run(table: &RawTable, config: &PipelineConfig) -> Result<ArtifactBundle, PipelineError> {
        config.validate()?;

        let analytes = analyte_columns(table, config);
        let records = RecordNormalizer::normalize(table, config, &analytes)?;
        let qc = QcSummary::tally(&records);
        info!(
            rows_total = qc.rows_total,
            rows_mapped = qc.rows_mapped,
            rows_invalid_coords = qc.rows_invalid_coords,
            rows_duplicate = qc.rows_duplicate,
            "Normalized survey rows"
        );

        // Per-element statistics, fanned out across the rayon pool.
        // Elements with no usable readings get no stats entry and are
        // excluded from the anomaly/cluster stages.
        let stats: BTreeMap<String, ElementStats> = analytes
            .par_iter()
            .filter_map(|element| {
                StatsEngine::compute(&records, element).map(|s| (element.clone(), s))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();
        info!(
            elements = stats.len(),
            skipped = analytes.len() - stats.len(),
            "Computed per-element statistics"
        );

        let key = config.anomaly.percentile;
        let radius_km = config.clustering.radius_km;
        let min_cluster_size = config.clustering.min_cluster_size;

        // Anomaly classification + clustering, independent per element.
        let results: BTreeMap<String, ElementResult> = stats
            .par_iter()
            .map(|(element, element_stats)| {
                let anomalies = AnomalyClassifier::classify(&records, element, element_stats, key);
                let targets = TargetClusterer::cluster(
                    element,
                    &anomalies.samples,
                    radius_km,
                    min_cluster_size,
                );
                (element.clone(), ElementResult { anomalies, targets })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect();

        let total_targets: usize = results.values().map(|r| r.targets.len()).sum();
        let total_anomalies: usize = results.values().map(|r| r.anomalies.samples.len()).sum();
        info!(
            percentile = %key,
            anomalies = total_anomalies,
            targets = total_targets,
            "Classified anomalies and clustered targets"
        );

        Ok(ArtifactBundle {
            records,
            stats,
            qc,
            results,
            parameters: RunParameters {
                percentile: key,
                radius_km,
                min_cluster_size,
                generated_at: chrono::Utc::now(),
            },
        })
    }
}
