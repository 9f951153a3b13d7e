//! Survey export ingestion — CSV to raw rows
//!
//! Thin edge layer: reads a CSV export of the lab bundle into the
//! `RawTable` the pipeline consumes. It types cells only superficially
//! (numeric-looking text becomes `Number`, blank becomes `Empty`,
//! everything else stays `Text`) — all semantic interpretation belongs to
//! the Record Normalizer.
//!
//! Quote-aware splitting handles commas inside quoted fields, which lab
//! exports use for preparation-method names and site descriptions.

use crate::types::{RawCell, RawRow, RawTable};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot open input '{0}': {1}")]
    Io(String, std::io::Error),

    #[error("input '{0}' is empty — no header row")]
    Empty(String),
}

/// Read a CSV survey export into a raw table.
///
/// The first line is the header; every column it names becomes a key of
/// each row's cell mapping. Rows shorter than the header are padded with
/// empty cells, extra trailing fields are ignored.
pub fn load_csv(path: &Path) -> Result<RawTable, IngestError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| IngestError::Io(display.clone(), e))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| IngestError::Io(display.clone(), e))?,
        None => return Err(IngestError::Empty(display)),
    };
    let columns: Vec<String> = csv_split(&header)
        .into_iter()
        .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for line in lines {
        let line = line.map_err(|e| IngestError::Io(display.clone(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = csv_split(&line);
        let cells = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let cell = fields.get(i).map_or(RawCell::Empty, |f| type_cell(f));
                (column.clone(), cell)
            })
            .collect();
        rows.push(RawRow { cells });
    }

    info!(path = %path.display(), columns = columns.len(), rows = rows.len(), "Loaded survey export");
    Ok(RawTable { columns, rows })
}

/// Superficial cell typing: blank → Empty, parseable → Number, else Text.
fn type_cell(field: &str) -> RawCell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        RawCell::Empty
    } else if let Ok(x) = trimmed.parse::<f64>() {
        RawCell::Number(x)
    } else {
        RawCell::Text(trimmed.to_string())
    }
}

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}
