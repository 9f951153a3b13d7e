//! Artifact writer — projects the assembled bundle onto disk
//!
//! Emits the map-ready artifact set:
//! - `samples.geojson` — mapped sample points with readings and BDL flags
//! - `targets.geojson` — follow-up target centroids per element
//! - `stats.json` — element → descriptive statistics
//! - `qc_summary.json` — row-disposition counters
//!
//! Writers never compute: every number here was produced by the pipeline
//! and is only being reshaped into GeoJSON/JSON.

use crate::pipeline::ArtifactBundle;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("cannot write artifact '{0}': {1}")]
    Io(String, std::io::Error),

    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// GeoJSON Shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: PointGeometry,
    properties: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct PointGeometry {
    #[serde(rename = "type")]
    kind: &'static str,
    /// [longitude, latitude]
    coordinates: [f64; 2],
}

fn point_feature(longitude: f64, latitude: f64, properties: Map<String, Value>) -> Feature {
    Feature {
        kind: "Feature",
        geometry: PointGeometry {
            kind: "Point",
            coordinates: [longitude, latitude],
        },
        properties,
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Write the full artifact set into `out_dir`, creating it if needed.
pub fn write_artifacts(out_dir: &Path, bundle: &ArtifactBundle) -> Result<(), WriterError> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| WriterError::Io(out_dir.display().to_string(), e))?;

    write_json(&out_dir.join("samples.geojson"), &samples_collection(bundle))?;
    write_json(&out_dir.join("targets.geojson"), &targets_collection(bundle))?;
    write_json(&out_dir.join("stats.json"), &bundle.stats)?;
    write_json(&out_dir.join("qc_summary.json"), &bundle.qc)?;

    info!(out = %out_dir.display(), "Wrote samples.geojson, targets.geojson, stats.json, qc_summary.json");
    Ok(())
}

/// Mapped sample points, keyed by sample id, carrying every reading as a
/// property plus its `<element>__is_bdl` companion flag.
fn samples_collection(bundle: &ArtifactBundle) -> FeatureCollection {
    let features = bundle
        .records
        .iter()
        .filter(|r| r.is_mapped())
        .filter_map(|r| {
            let (longitude, latitude) = (r.longitude?, r.latitude?);
            let mut properties = Map::new();
            properties.insert("id".to_string(), json!(r.id));
            for (element, reading) in &r.values {
                properties.insert(element.clone(), json!(reading.effective));
                properties.insert(
                    format!("{element}__is_bdl"),
                    json!(reading.below_detection_limit),
                );
            }
            Some(point_feature(longitude, latitude, properties))
        })
        .collect();

    FeatureCollection {
        kind: "FeatureCollection",
        features,
    }
}

/// Target centroids for every processed element.
fn targets_collection(bundle: &ArtifactBundle) -> FeatureCollection {
    let parameters = &bundle.parameters;
    let mut features = Vec::new();

    for (element, result) in &bundle.results {
        for target in &result.targets {
            let mut properties = Map::new();
            properties.insert("element".to_string(), json!(element));
            properties.insert(
                "cluster_id".to_string(),
                json!(format!("{element}_c{}", target.cluster_id)),
            );
            properties.insert(
                format!("threshold_{}", parameters.percentile),
                json!(result.anomalies.threshold),
            );
            properties.insert("n_points".to_string(), json!(target.n_points));
            properties.insert("max_value".to_string(), json!(target.max_value));
            properties.insert("mean_value".to_string(), json!(target.mean_value));
            properties.insert("member_ids".to_string(), json!(target.member_ids));
            properties.insert("radius_km".to_string(), json!(parameters.radius_km));
            features.push(point_feature(
                target.centroid_longitude,
                target.centroid_latitude,
                properties,
            ));
        }
    }

    FeatureCollection {
        kind: "FeatureCollection",
        features,
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), WriterError> {
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents).map_err(|e| WriterError::Io(path.display().to_string(), e))
}
