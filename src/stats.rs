//! Statistics Engine — per-element descriptive statistics
//!
//! Operates on the mapped population only (coordinate-valid, non-duplicate
//! records): rows excluded from mapping are excluded from statistics, so
//! the stats describe exactly what the map shows.
//!
//! Percentiles use linear interpolation between order statistics: for
//! percentile q over sorted values v[0..n-1], index = q × (n-1), value
//! interpolated between the bracketing entries. Deterministic by
//! construction — identical input always reproduces identical stats.

use crate::types::{ElementStats, SampleRecord};
use statrs::statistics::Statistics;

/// Per-element statistics over the mapped record population.
pub struct StatsEngine;

impl StatsEngine {
    /// Compute stats for one element, or `None` when no mapped record
    /// carries a reading for it (n = 0 ⇒ no stats entry at all).
    pub fn compute(records: &[SampleRecord], element: &str) -> Option<ElementStats> {
        let mut effective: Vec<f64> = Vec::new();
        let mut bdl_count = 0usize;

        for record in records.iter().filter(|r| r.is_mapped()) {
            if let Some(reading) = record.values.get(element) {
                effective.push(reading.effective);
                if reading.below_detection_limit {
                    bdl_count += 1;
                }
            }
        }

        if effective.is_empty() {
            return None;
        }

        effective.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = effective.len();

        Some(ElementStats {
            n,
            bdl_count,
            bdl_pct: 100.0 * bdl_count as f64 / n as f64,
            min: effective[0],
            p50: percentile(&effective, 0.50),
            p90: percentile(&effective, 0.90),
            p95: percentile(&effective, 0.95),
            p99: percentile(&effective, 0.99),
            max: effective[n - 1],
            mean: effective.iter().mean(),
            std: if n > 1 { effective.iter().std_dev() } else { 0.0 },
        })
    }
}

/// Interpolated percentile of an ascending-sorted, non-empty slice.
///
/// index = q × (n-1); exact order statistics when the index is integral,
/// linear interpolation between the two bracketing values otherwise.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let index = q * (n - 1) as f64;
    let lo = index.floor() as usize;
    let hi = index.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = index - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}
