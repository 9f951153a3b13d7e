//! Record Normalizer — raw survey rows into validated sample records
//!
//! Resolves three things the raw export leaves implicit:
//! - Coordinate validity (finite, within [-180,180] / [-90,90])
//! - Duplicate identity (same sample id, or same coordinates + value
//!   vector when the export carries no id column); first-seen-wins
//! - The detection-limit sign convention (negative = censored, see
//!   `Reading::from_raw`)
//!
//! No row is ever dropped: invalid rows stay in the output with their
//! validity flags cleared so QC accounting can reconstruct every count.
//! Structural problems — a coordinate column absent from the whole export,
//! or non-numeric text where a number is declared — are fatal and name the
//! offending column and row index. They are never silently coerced.

use crate::config::PipelineConfig;
use crate::types::{RawCell, RawRow, RawTable, Reading, SampleRecord};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Structural input errors. Row-level data issues never land here — they
/// become validity flags on the emitted records instead.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("declared column '{0}' is missing from every row of the input")]
    MissingColumn(String),

    #[error("non-numeric value '{value}' in numeric column '{column}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
}

/// Identity key for duplicate detection.
///
/// Bit-exact coordinate/value fingerprints keep the fallback deterministic
/// without imposing a float tolerance the upstream lab never promised.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DupKey {
    Id(String),
    Fingerprint(Vec<u64>),
}

/// Record Normalizer — the only stage that inspects raw row shape.
pub struct RecordNormalizer;

impl RecordNormalizer {
    /// Normalize the raw table into the immutable record sequence.
    ///
    /// `analytes` is the ordered list of analyte columns to resolve,
    /// as derived by [`analyte_columns`].
    pub fn normalize(
        table: &RawTable,
        config: &PipelineConfig,
        analytes: &[String],
    ) -> Result<Vec<SampleRecord>, NormalizeError> {
        let input = &config.input;

        // A declared coordinate column must exist somewhere in the export.
        // (Zero rows is fine — an empty but well-formed export is valid.)
        if !table.rows.is_empty() {
            for column in [&input.longitude_column, &input.latitude_column] {
                if !table.columns.iter().any(|c| c == column) {
                    return Err(NormalizeError::MissingColumn(column.clone()));
                }
            }
        }

        let has_id_column = table.columns.iter().any(|c| c == &input.id_column);
        if !has_id_column && !table.rows.is_empty() {
            warn!(
                column = %input.id_column,
                "id column not present — duplicate detection falls back to coordinate + value fingerprints"
            );
        }

        let mut records = Vec::with_capacity(table.rows.len());
        let mut seen: HashSet<DupKey> = HashSet::with_capacity(table.rows.len());

        for (row_index, row) in table.rows.iter().enumerate() {
            let longitude = numeric_cell(row, &input.longitude_column, row_index)?;
            let latitude = numeric_cell(row, &input.latitude_column, row_index)?;
            let coordinates_ok = in_range(longitude, 180.0) && in_range(latitude, 90.0);

            let mut values: BTreeMap<String, Reading> = BTreeMap::new();
            for element in analytes {
                if let Some(raw) = numeric_cell(row, element, row_index)? {
                    values.insert(element.clone(), Reading::from_raw(raw));
                }
            }

            let (id, key) = identity(row, row_index, &input.id_column, &values, longitude, latitude);
            let is_duplicate = !seen.insert(key);
            if is_duplicate {
                debug!(row = row_index, id = %id, "duplicate sample retained for QC only");
            }

            records.push(SampleRecord {
                id,
                longitude,
                latitude,
                values,
                coordinates_ok,
                is_duplicate,
            });
        }

        Ok(records)
    }
}

/// Derive the ordered analyte column list: every column that is not the id,
/// a coordinate, or listed metadata — intersected with the explicit element
/// selection when one is configured.
pub fn analyte_columns(table: &RawTable, config: &PipelineConfig) -> Vec<String> {
    let input = &config.input;
    let reserved: HashSet<&str> = [
        input.id_column.as_str(),
        input.longitude_column.as_str(),
        input.latitude_column.as_str(),
    ]
    .into_iter()
    .chain(input.metadata_columns.iter().map(String::as_str))
    .collect();

    let selected: Option<HashSet<&str>> = config
        .elements
        .as_ref()
        .map(|e| e.iter().map(String::as_str).collect());

    table
        .columns
        .iter()
        .filter(|c| !reserved.contains(c.as_str()))
        .filter(|c| selected.as_ref().map_or(true, |s| s.contains(c.as_str())))
        .cloned()
        .collect()
}

/// Parse one declared-numeric cell. Empty → absent; numeric text is
/// accepted; anything else is a structural error.
fn numeric_cell(
    row: &RawRow,
    column: &str,
    row_index: usize,
) -> Result<Option<f64>, NormalizeError> {
    match row.get(column) {
        RawCell::Empty => Ok(None),
        RawCell::Number(x) => Ok(Some(*x)),
        RawCell::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| NormalizeError::NonNumeric {
                    column: column.to_string(),
                    row: row_index,
                    value: trimmed.to_string(),
                })
        }
    }
}

fn in_range(coord: Option<f64>, bound: f64) -> bool {
    matches!(coord, Some(c) if c.is_finite() && c.abs() <= bound)
}

/// Resolve the record id and its duplicate-detection key.
///
/// With an id cell present the id doubles as the key. Without one the id is
/// synthesized from the row index (ids must be unique after normalization)
/// and the key is a bit-exact fingerprint of coordinates + value vector.
fn identity(
    row: &RawRow,
    row_index: usize,
    id_column: &str,
    values: &BTreeMap<String, Reading>,
    longitude: Option<f64>,
    latitude: Option<f64>,
) -> (String, DupKey) {
    let id_text = match row.get(id_column) {
        RawCell::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        RawCell::Number(x) => Some(format_id_number(*x)),
        _ => None,
    };

    match id_text {
        Some(id) => (id.clone(), DupKey::Id(id)),
        None => {
            let mut bits: Vec<u64> = Vec::with_capacity(values.len() + 2);
            bits.push(longitude.map_or(u64::MAX, f64::to_bits));
            bits.push(latitude.map_or(u64::MAX, f64::to_bits));
            // BTreeMap iteration keeps the fingerprint element order stable.
            // BDL survives the sign fold: a censored reading is not the same
            // sample content as an uncensored one of equal magnitude.
            for reading in values.values() {
                let raw = if reading.below_detection_limit {
                    -reading.effective
                } else {
                    reading.effective
                };
                bits.push(raw.to_bits());
            }
            (format!("row-{row_index}"), DupKey::Fingerprint(bits))
        }
    }
}

/// Integer-looking numeric ids print without a trailing ".0".
fn format_id_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}
