//! streamsed: Stream-Sediment Geochemical Targeting
//!
//! Batch pipeline that turns a raw geochemical survey export into
//! map-ready, reproducible artifacts.
//!
//! ## Architecture
//!
//! - **Record Normalizer**: coordinate validity, duplicates, detection-limit signs
//! - **Statistics Engine**: per-element percentiles and BDL accounting
//! - **Anomaly Classifier**: percentile-threshold flagging at a chosen strictness
//! - **Target Clusterer**: proximity-graph components → field follow-up targets
//! - **QC & Assembler**: row-disposition counters and the output bundle

pub mod anomaly;
pub mod cluster;
pub mod config;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod stats;
pub mod types;
pub mod writer;

// Re-export configuration
pub use config::{ConfigError, PipelineConfig};

// Re-export commonly used types
pub use types::{
    AnomalousSample, ElementStats, PercentileKey, QcSummary, RawCell, RawRow, RawTable,
    Reading, SampleRecord, Target,
};

// Re-export the pipeline entry points
pub use pipeline::{ArtifactBundle, ElementResult, Pipeline, PipelineError};
