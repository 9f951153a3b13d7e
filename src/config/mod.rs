//! Pipeline configuration — all survey-processing knobs as TOML values
//!
//! Every tunable the pipeline recognizes lives here: input column mapping,
//! anomaly strictness, and clustering geometry. Each section implements
//! `Default` with the documented defaults, so a missing config file means
//! zero-surprise behavior. Validation runs before any row is processed and
//! collects every problem instead of stopping at the first.

mod validation;

pub use validation::ValidationWarning;

use crate::types::PercentileKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one pipeline run.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. `$STREAMSED_CONFIG` env var
/// 2. `./streamsed.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    /// Input column mapping
    #[serde(default)]
    pub input: InputConfig,

    /// Anomaly strictness
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Target clustering geometry
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Explicit analyte selection; `None` = every analyte column present
    #[serde(default)]
    pub elements: Option<Vec<String>>,
}

/// Which columns of the export carry identity and geometry.
/// Every other column not listed in `metadata_columns` is an analyte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub id_column: String,
    pub longitude_column: String,
    pub latitude_column: String,
    /// Non-analyte columns to ignore (lab keys, QAQC bookkeeping, ...)
    #[serde(default)]
    pub metadata_columns: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            id_column: "Sample_ID".to_string(),
            longitude_column: "Longitude".to_string(),
            latitude_column: "Latitude".to_string(),
            metadata_columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnomalyConfig {
    /// Percentile cutoff: p50 (lenient), p95, or p99 (strict)
    #[serde(default)]
    pub percentile: PercentileKey,
}

/// Clustering geometry. Defaults match the survey convention this pipeline
/// was built for: 7.5 km grouping radius and at least 4 samples per target
/// (isolated anomalies are not worth a field mobilization). Set
/// `min_cluster_size = 1` to keep singleton targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Great-circle distance (km) within which anomalous samples connect
    pub radius_km: f64,
    /// Smallest connected component emitted as a target
    pub min_cluster_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_km: 7.5,
            min_cluster_size: 4,
        }
    }
}

impl PipelineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$STREAMSED_CONFIG` environment variable
    /// 2. `./streamsed.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("STREAMSED_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from STREAMSED_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from STREAMSED_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "STREAMSED_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("streamsed.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./streamsed.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./streamsed.toml, using defaults");
                }
            }
        }

        info!("No streamsed.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        // Unknown-key pass first: typos warn, they never break a run
        for w in validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all options for internal consistency.
    ///
    /// Rules:
    /// - Clustering radius must be finite and > 0
    /// - Minimum cluster size must be > 0
    /// - Column names must be non-empty and mutually distinct
    /// - An explicit element list, when present, must be non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let c = &self.clustering;
        if !c.radius_km.is_finite() || c.radius_km <= 0.0 {
            errors.push(format!(
                "clustering.radius_km must be a positive finite number, got {}",
                c.radius_km
            ));
        }
        if c.min_cluster_size == 0 {
            errors.push("clustering.min_cluster_size must be > 0".to_string());
        }

        let i = &self.input;
        for (name, value) in [
            ("input.id_column", &i.id_column),
            ("input.longitude_column", &i.longitude_column),
            ("input.latitude_column", &i.latitude_column),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }
        if i.longitude_column == i.latitude_column {
            errors.push(format!(
                "input.longitude_column and input.latitude_column are both '{}'",
                i.longitude_column
            ));
        }

        if let Some(elements) = &self.elements {
            if elements.is_empty() {
                errors.push(
                    "elements: explicit selection must name at least one element (or be omitted)"
                        .to_string(),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error ({0}): {1}")]
    Io(PathBuf, std::io::Error),

    #[error("config parse error ({0}): {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.anomaly.percentile, PercentileKey::P95);
        assert_eq!(config.clustering.radius_km, 7.5);
        assert_eq!(config.clustering.min_cluster_size, 4);
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let mut config = PipelineConfig::default();
        config.clustering.radius_km = 0.0;
        let err = config.validate().expect_err("zero radius must fail");
        assert!(err.to_string().contains("radius_km"));

        config.clustering.radius_km = f64::NAN;
        assert!(config.validate().is_err(), "NaN radius must fail");
    }

    #[test]
    fn test_rejects_zero_min_cluster_size() {
        let mut config = PipelineConfig::default();
        config.clustering.min_cluster_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_percentile_key() {
        let toml = r#"
            [anomaly]
            percentile = "p75"
        "#;
        let parsed: Result<PipelineConfig, _> = toml::from_str(toml);
        assert!(parsed.is_err(), "p75 is not a supported strictness");
    }

    #[test]
    fn test_parses_full_config() {
        let toml = r#"
            elements = ["As", "Au"]

            [input]
            id_column = "Lab_Sample_Identifier"
            longitude_column = "Longitude_NAD83"
            latitude_column = "Latitude_NAD83"
            metadata_columns = ["QAQC_Block_ID"]

            [anomaly]
            percentile = "p99"

            [clustering]
            radius_km = 5.0
            min_cluster_size = 1
        "#;
        let config: PipelineConfig = toml::from_str(toml).expect("should parse");
        assert!(config.validate().is_ok());
        assert_eq!(config.anomaly.percentile, PercentileKey::P99);
        assert_eq!(config.clustering.min_cluster_size, 1);
        assert_eq!(config.input.id_column, "Lab_Sample_Identifier");
        assert_eq!(config.elements.as_deref(), Some(&["As".to_string(), "Au".to_string()][..]));
    }

    #[test]
    fn test_duplicate_coordinate_columns_rejected() {
        let mut config = PipelineConfig::default();
        config.input.latitude_column = config.input.longitude_column.clone();
        assert!(config.validate().is_err());
    }
}
