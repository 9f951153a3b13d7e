//! Shared data structures for the geochemical survey pipeline
//!
//! This module defines the core types flowing between pipeline stages:
//! - Stage 1: RawRow / RawTable (ingested survey export)
//! - Stage 2: SampleRecord, Reading (normalized, detection-limit resolved)
//! - Stage 3: ElementStats (per-analyte descriptive statistics)
//! - Stage 4: AnomalousSample, Target (threshold exceedances and clusters)
//! - Stage 5: QcSummary (row-disposition accounting)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Stage 1: Raw Survey Rows
// ============================================================================

/// One cell of the raw survey export, as produced by the ingestion layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    Number(f64),
    Empty,
}

/// One raw row: a flat mapping from column name to cell value.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub cells: HashMap<String, RawCell>,
}

impl RawRow {
    pub fn get(&self, column: &str) -> &RawCell {
        self.cells.get(column).unwrap_or(&RawCell::Empty)
    }
}

/// The full ingested export: ordered column names plus ordered rows.
///
/// Column order is preserved from the source header so analyte discovery
/// and duplicate fingerprinting are deterministic across reruns.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

// ============================================================================
// Stage 2: Normalized Sample Records
// ============================================================================

/// A single analyte reading with the detection-limit sign convention resolved.
///
/// Laboratories report censored readings as negative numbers whose magnitude
/// is the detection limit. All downstream numeric logic uses the unsigned
/// `effective` magnitude; the `below_detection_limit` flag survives only for
/// BDL-percentage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unsigned magnitude used by statistics, thresholds, and clustering
    pub effective: f64,
    /// True iff the raw reading was negative (censored)
    pub below_detection_limit: bool,
}

impl Reading {
    /// Resolve a raw signed reading: effective = |raw|, BDL = raw < 0.
    pub fn from_raw(raw: f64) -> Self {
        Self {
            effective: raw.abs(),
            below_detection_limit: raw < 0.0,
        }
    }
}

/// One physical sample, created once during normalization and immutable after.
///
/// Invalid rows are never dropped — they stay in the record sequence with
/// `coordinates_ok = false` or `is_duplicate = true` so QC counts remain
/// reconstructable from the records alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Unique sample identifier (lab id, or synthesized from the row index)
    pub id: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// Analyte name → resolved reading; absent = not measured
    pub values: BTreeMap<String, Reading>,
    /// Both coordinates present, finite, and within [-180,180] / [-90,90]
    pub coordinates_ok: bool,
    /// A row with this sample's identity was already seen (first-seen-wins)
    pub is_duplicate: bool,
}

impl SampleRecord {
    /// Part of the mapped population: geometry is valid and the record is
    /// the canonical copy of its sample.
    pub fn is_mapped(&self) -> bool {
        self.coordinates_ok && !self.is_duplicate
    }

    /// Effective reading for one element, if measured.
    pub fn effective(&self, element: &str) -> Option<f64> {
        self.values.get(element).map(|r| r.effective)
    }
}

// ============================================================================
// Stage 3: Per-Element Statistics
// ============================================================================

/// Descriptive statistics for one analyte over the mapped population.
///
/// Percentiles use linear interpolation between order statistics
/// (index = q × (n-1)), so `p50 <= p90 <= p95 <= p99 <= max` always holds.
/// Elements with zero usable readings get no stats entry at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStats {
    /// Count of mapped records with a reading for this element
    pub n: usize,
    /// Readings flagged below detection limit
    pub bdl_count: usize,
    /// 100 × bdl_count / n
    pub bdl_pct: f64,
    pub min: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (ddof = 1); 0 when n = 1
    pub std: f64,
}

impl ElementStats {
    /// The scalar anomaly threshold for a given strictness key.
    pub fn threshold(&self, key: PercentileKey) -> f64 {
        match key {
            PercentileKey::P50 => self.p50,
            PercentileKey::P95 => self.p95,
            PercentileKey::P99 => self.p99,
        }
    }
}

/// Anomaly strictness control: the percentile used as the cutoff.
/// Higher percentile = fewer samples flagged = stricter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PercentileKey {
    P50,
    #[default]
    P95,
    P99,
}

impl PercentileKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PercentileKey::P50 => "p50",
            PercentileKey::P95 => "p95",
            PercentileKey::P99 => "p99",
        }
    }
}

impl std::fmt::Display for PercentileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PercentileKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p50" => Ok(PercentileKey::P50),
            "p95" => Ok(PercentileKey::P95),
            "p99" => Ok(PercentileKey::P99),
            other => Err(format!(
                "unsupported percentile key '{other}' (expected p50, p95, or p99)"
            )),
        }
    }
}

// ============================================================================
// Stage 4: Anomalies and Follow-Up Targets
// ============================================================================

/// One mapped sample whose effective value met the element threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalousSample {
    pub id: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Effective (unsigned) reading for the element under analysis
    pub value: f64,
}

/// A spatial cluster of anomalous samples for one element: a field
/// follow-up area. Pure function of (samples, element, threshold, radius,
/// min size) — never mutated, regenerated on any parameter change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    /// Sequential within one element's clustering run, assigned in
    /// ascending order of the component's minimum member id
    pub cluster_id: u32,
    pub element: String,
    /// Member sample ids, sorted (supports external field-ops grouping)
    pub member_ids: Vec<String>,
    pub centroid_longitude: f64,
    pub centroid_latitude: f64,
    pub n_points: usize,
    pub max_value: f64,
    pub mean_value: f64,
}

// ============================================================================
// Stage 5: QC Summary
// ============================================================================

/// Aggregate row-disposition counters.
///
/// Classification is mutually exclusive with precedence
/// duplicate > invalid-coordinates > mapped, so
/// `rows_total = rows_mapped + rows_invalid_coords + rows_duplicate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QcSummary {
    pub rows_total: usize,
    pub rows_mapped: usize,
    pub rows_invalid_coords: usize,
    pub rows_duplicate: usize,
}

impl QcSummary {
    /// Tally the record sequence. Each record lands in exactly one bucket.
    pub fn tally(records: &[SampleRecord]) -> Self {
        let mut qc = Self {
            rows_total: records.len(),
            ..Self::default()
        };
        for record in records {
            if record.is_duplicate {
                qc.rows_duplicate += 1;
            } else if !record.coordinates_ok {
                qc.rows_invalid_coords += 1;
            } else {
                qc.rows_mapped += 1;
            }
        }
        qc
    }
}
