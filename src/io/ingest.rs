//! CSV ingest.
//!
//! This module turns raw CSV bytes into a string table that the encoders can type
//! and transform. It does no modelling.
//!
//! Design goals:
//! - **Strict header** (duplicate/empty names are an error, exit code 2)
//! - **Row-level validation** (skip malformed rows, but report what happened)
//! - **Stable row identity** (every kept row remembers its CSV line number)

use std::collections::HashSet;

use csv::StringRecord;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed CSV: header names + string cells, one `Vec` per row.
#[derive(Debug, Clone)]
pub struct IngestedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 1-based CSV line number of each kept row (header is line 1).
    pub lines: Vec<usize>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    /// Rows removed by `drop_incomplete`.
    pub rows_dropped: usize,
}

impl IngestedTable {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, AppError> {
        let wanted = normalize_header_name(name);
        self.headers
            .iter()
            .position(|h| *h == wanted)
            .ok_or_else(|| {
                AppError::usage(format!(
                    "Column '{name}' not found. Available columns: {}",
                    self.headers.join(", ")
                ))
            })
    }

    /// Iterate over the cells of one column.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(move |row| row[idx].as_str())
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        &self.rows[row][col]
    }

    /// Drop every row with a missing value in any of `columns`.
    ///
    /// Returns the number of rows removed.
    pub fn drop_incomplete(&mut self, columns: &[usize]) -> usize {
        let before = self.rows.len();
        let mut kept_rows = Vec::with_capacity(before);
        let mut kept_lines = Vec::with_capacity(before);
        for (row, line) in self.rows.drain(..).zip(self.lines.drain(..)) {
            if columns.iter().all(|&c| !is_missing(&row[c])) {
                kept_rows.push(row);
                kept_lines.push(line);
            }
        }
        self.rows = kept_rows;
        self.lines = kept_lines;

        let dropped = before - self.rows.len();
        self.rows_dropped += dropped;
        if dropped > 0 {
            debug!(dropped, "dropped rows with missing values");
        }
        dropped
    }
}

/// Whether a cell counts as a missing value.
pub fn is_missing(cell: &str) -> bool {
    let t = cell.trim();
    t.is_empty()
        || ["na", "n/a", "nan", "null", "none"]
            .iter()
            .any(|m| t.eq_ignore_ascii_case(m))
}

/// Parse CSV bytes into an `IngestedTable`.
pub fn read_table(bytes: &[u8]) -> Result<IngestedTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let raw_headers = reader
        .headers()
        .map_err(|e| AppError::usage(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let headers = validate_headers(&raw_headers)?;

    let mut rows = Vec::new();
    let mut lines = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    // quoted fields may span lines, so take line numbers from the reader
    let mut next_line = 2usize;
    for result in reader.records() {
        rows_read += 1;
        let position = match &result {
            Ok(r) => r.position(),
            Err(e) => e.position(),
        };
        let line = position.map_or(next_line, |p| p.line() as usize);
        next_line = line + 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        if record.len() != headers.len() {
            row_errors.push(RowError {
                line,
                message: format!("expected {} fields, found {}", headers.len(), record.len()),
            });
            continue;
        }

        rows.push(record.iter().map(str::to_string).collect());
        lines.push(line);
    }

    if !row_errors.is_empty() {
        warn!(skipped = row_errors.len(), "skipped malformed CSV rows");
    }
    if rows.is_empty() {
        return Err(AppError::data("CSV contains no usable data rows."));
    }
    debug!(rows = rows.len(), columns = headers.len(), "parsed CSV");

    Ok(IngestedTable {
        headers,
        rows,
        lines,
        row_errors,
        rows_read,
        rows_dropped: 0,
    })
}

fn validate_headers(headers: &StringRecord) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(headers.len());
    for (idx, raw) in headers.iter().enumerate() {
        let name = normalize_header_name(raw);
        if name.is_empty() {
            // dataframe exports write an unnamed leading index column; name it instead of failing
            if idx == 0 {
                out.push("index".to_string());
                seen.insert("index".to_string());
                continue;
            }
            return Err(AppError::usage(format!("CSV header column {} is empty.", idx + 1)));
        }
        if !seen.insert(name.clone()) {
            return Err(AppError::usage(format!("Duplicate CSV header '{name}'.")));
        }
        out.push(name);
    }
    if out.is_empty() {
        return Err(AppError::usage("CSV has no header columns."));
    }
    Ok(out)
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often carry a UTF-8 BOM on the first header.
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}
