//! Anomaly Classifier — percentile-threshold filter over the mapped population
//!
//! Purely a filter: given one element's statistics and a strictness key,
//! derive the scalar threshold and keep every mapped sample whose effective
//! value meets it. A non-finite threshold (element with no usable
//! distribution) yields an empty set — a valid "no anomalies" result, not
//! an error.

use crate::types::{AnomalousSample, ElementStats, PercentileKey, SampleRecord};

/// Classification result for one (element, strictness) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySet {
    /// The scalar cutoff derived from the element's stats
    pub threshold: f64,
    /// Mapped samples with effective value >= threshold, in record order
    pub samples: Vec<AnomalousSample>,
}

/// Threshold-based anomaly detection for one element.
pub struct AnomalyClassifier;

impl AnomalyClassifier {
    /// Flag mapped records whose effective reading meets the threshold.
    ///
    /// Records without a reading for the element never qualify. Output
    /// order follows input record order, so reruns are id-for-id identical.
    pub fn classify(
        records: &[SampleRecord],
        element: &str,
        stats: &ElementStats,
        key: PercentileKey,
    ) -> AnomalySet {
        let threshold = stats.threshold(key);

        // No usable distribution — surface a clean empty set to the caller.
        if !threshold.is_finite() || !stats.max.is_finite() {
            return AnomalySet {
                threshold,
                samples: Vec::new(),
            };
        }

        let samples = records
            .iter()
            .filter(|r| r.is_mapped())
            .filter_map(|r| {
                let value = r.effective(element)?;
                if value < threshold {
                    return None;
                }
                // Mapped ⇒ both coordinates are present and finite
                let (longitude, latitude) = (r.longitude?, r.latitude?);
                Some(AnomalousSample {
                    id: r.id.clone(),
                    longitude,
                    latitude,
                    value,
                })
            })
            .collect();

        AnomalySet { threshold, samples }
    }
}
