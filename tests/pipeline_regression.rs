//! Pipeline Regression Tests
//!
//! Exercises the full pipeline from raw CSV text through normalization,
//! statistics, anomaly classification, clustering, and artifact writing.
//! Asserts on QC conservation, detection-limit semantics, threshold
//! monotonicity, and rerun determinism.

use std::io::Write;
use streamsed::config::PipelineConfig;
use streamsed::pipeline::{ArtifactBundle, Pipeline};
use streamsed::types::{PercentileKey, RawTable};
use streamsed::{ingest, writer};

/// Write CSV text to a temp file and ingest it.
fn ingest_csv(contents: &str) -> RawTable {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write csv");
    ingest::load_csv(file.path()).expect("ingest")
}

fn run(contents: &str, config: &PipelineConfig) -> ArtifactBundle {
    Pipeline::run(&ingest_csv(contents), config).expect("pipeline run")
}

fn base_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.input.id_column = "Sample_ID".to_string();
    config.input.longitude_column = "Longitude".to_string();
    config.input.latitude_column = "Latitude".to_string();
    config.clustering.min_cluster_size = 1;
    config
}

#[test]
fn duplicate_and_censored_rows_are_accounted_once() {
    // Three rows: S1 twice (valid first, unmappable second), S2 valid with
    // a censored As reading of -5.
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.00,45.00,1.0
S1,,45.00,2.0
S2,-66.10,45.10,-5
";
    let bundle = run(csv, &base_config());

    assert_eq!(bundle.qc.rows_total, 3);
    assert_eq!(bundle.qc.rows_duplicate, 1);
    assert_eq!(bundle.qc.rows_mapped, 2);
    assert_eq!(bundle.qc.rows_invalid_coords, 0);
    assert_eq!(
        bundle.qc.rows_total,
        bundle.qc.rows_mapped + bundle.qc.rows_invalid_coords + bundle.qc.rows_duplicate,
        "every row lands in exactly one bucket"
    );

    // First-seen S1 copy is canonical; second copy excluded from stats
    let stats = &bundle.stats["As"];
    assert_eq!(stats.n, 2);
    assert_eq!(stats.bdl_count, 1);
    assert_eq!(stats.bdl_pct, 50.0);
    assert_eq!(stats.max, 5.0, "censored -5 contributes |5|");

    let s2 = bundle
        .records
        .iter()
        .find(|r| r.id == "S2")
        .expect("S2 present");
    let reading = s2.values["As"];
    assert_eq!(reading.effective, 5.0);
    assert!(reading.below_detection_limit);
}

#[test]
fn canonical_copy_may_be_the_unmappable_one() {
    // The invalid-coordinate copy comes first, so it stays canonical and
    // the mappable second copy counts as the duplicate.
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,,45.00,1.0
S1,-66.00,45.00,2.0
S2,-66.10,45.10,-5
";
    let bundle = run(csv, &base_config());
    assert_eq!(bundle.qc.rows_duplicate, 1);
    assert_eq!(bundle.qc.rows_invalid_coords, 1);
    assert_eq!(bundle.qc.rows_mapped, 1);

    // Only S2's reading reaches statistics
    let stats = &bundle.stats["As"];
    assert_eq!(stats.n, 1);
    assert_eq!(stats.bdl_pct, 100.0);
}

#[test]
fn worked_percentile_example_flags_only_the_outlier() {
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.00,45.00,1
S2,-66.01,45.00,2
S3,-66.02,45.00,3
S4,-66.03,45.00,4
S5,-66.04,45.00,100
";
    let bundle = run(csv, &base_config());

    let stats = &bundle.stats["As"];
    assert_eq!(stats.p50, 3.0);
    assert_eq!(stats.max, 100.0);

    let result = &bundle.results["As"];
    assert!((result.anomalies.threshold - 80.8).abs() < 1e-9);
    assert_eq!(result.anomalies.samples.len(), 1);
    assert_eq!(result.anomalies.samples[0].id, "S5");

    // The single anomaly becomes a singleton target at min size 1
    assert_eq!(result.targets.len(), 1);
    assert_eq!(result.targets[0].n_points, 1);
}

#[test]
fn threshold_escalation_never_grows_the_anomalous_set() {
    let mut csv = String::from("Sample_ID,Longitude,Latitude,Cu\n");
    for i in 0..200 {
        csv.push_str(&format!("S{i:03},-66.{:03},45.000,{}\n", i % 400, i));
    }

    let mut previous = usize::MAX;
    for key in [PercentileKey::P50, PercentileKey::P95, PercentileKey::P99] {
        let mut config = base_config();
        config.anomaly.percentile = key;
        let bundle = run(&csv, &config);
        let count = bundle.results["Cu"].anomalies.samples.len();
        assert!(
            count <= previous,
            "{key} flagged {count}, more than the looser cutoff"
        );
        assert!(count >= 1);
        previous = count;
    }
}

#[test]
fn clustering_radius_splits_and_merges_targets() {
    // Two anomalous samples ~50 km apart (0.636° of longitude at 45°N).
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.000,45.0,100
S2,-66.636,45.0,100
S3,-66.300,45.0,1
S4,-66.310,45.0,1
S5,-66.320,45.0,1
";
    let mut config = base_config();
    config.anomaly.percentile = PercentileKey::P95;

    config.clustering.radius_km = 100.0;
    let bundle = run(csv, &config);
    let targets = &bundle.results["As"].targets;
    assert_eq!(targets.len(), 1, "within radius: one merged target");
    assert_eq!(targets[0].n_points, 2);

    config.clustering.radius_km = 10.0;
    let bundle = run(csv, &config);
    let targets = &bundle.results["As"].targets;
    assert_eq!(targets.len(), 2, "beyond radius: two singleton targets");
    assert!(targets.iter().all(|t| t.n_points == 1));
}

#[test]
fn min_cluster_size_policy_is_enforced() {
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.000,45.0,100
S2,-66.636,45.0,100
S3,-66.300,45.0,1
";
    let mut config = base_config();
    config.clustering.radius_km = 10.0;
    config.clustering.min_cluster_size = 2;
    let bundle = run(csv, &config);
    assert!(
        bundle.results["As"].targets.is_empty(),
        "isolated anomalies below the minimum are dropped silently"
    );
}

#[test]
fn reruns_are_bit_identical() {
    let mut csv = String::from("Sample_ID,Longitude,Latitude,As,Cu\n");
    for i in 0..300 {
        csv.push_str(&format!(
            "S{i:03},-66.{:03},45.{:03},{},{}\n",
            (i * 37) % 900,
            (i * 53) % 900,
            (i * 7) % 113,
            (i * 11) % 97
        ));
    }
    let config = base_config();
    let first = run(&csv, &config);
    let second = run(&csv, &config);

    assert_eq!(first.stats, second.stats);
    for (element, result) in &first.results {
        let other = &second.results[element];
        assert_eq!(result.anomalies, other.anomalies, "{element} anomalies differ");
        assert_eq!(result.targets, other.targets, "{element} targets differ");
    }
}

#[test]
fn non_numeric_analyte_text_aborts_the_run() {
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.00,45.00,pending
";
    let table = ingest_csv(csv);
    let err = Pipeline::run(&table, &base_config()).expect_err("must not coerce");
    let message = err.to_string();
    assert!(message.contains("As") && message.contains("row 0"), "{message}");
}

#[test]
fn artifacts_written_end_to_end() {
    let csv = "\
Sample_ID,Longitude,Latitude,As
S1,-66.00,45.00,1
S2,-66.01,45.00,2
S3,-66.02,45.00,3
S4,-66.03,45.00,4
S5,-66.04,45.00,100
";
    let bundle = run(csv, &base_config());
    let dir = tempfile::tempdir().expect("temp dir");
    writer::write_artifacts(dir.path(), &bundle).expect("write artifacts");

    let stats: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("stats.json")).expect("read stats"),
    )
    .expect("valid json");
    assert_eq!(stats["As"]["n"], 5);

    let qc: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("qc_summary.json")).expect("read qc"),
    )
    .expect("valid json");
    assert_eq!(qc["rows_mapped"], 5);

    let targets: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("targets.geojson")).expect("read targets"),
    )
    .expect("valid json");
    assert_eq!(targets["type"], "FeatureCollection");
    assert_eq!(targets["features"][0]["properties"]["cluster_id"], "As_c0");
}
