//! Reporting utilities: dataset summaries, rankings, and formatted terminal output.

pub mod format;

pub use format::*;

use serde::Serialize;

use crate::domain::DataSource;
use crate::io::ingest::{IngestedTable, RowError};
use crate::prep::{EncodedColumn, FeatureEncoder, SkippedColumn};

/// What happened to the input between download and the feature matrix.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub source: String,
    pub rows_read: usize,
    pub rows_used: usize,
    /// Rows removed for missing values in a used column.
    pub rows_dropped: usize,
    pub row_errors: Vec<RowError>,
    pub columns: Vec<EncodedColumn>,
    pub skipped: Vec<SkippedColumn>,
    pub feature_names: Vec<String>,
}

impl DatasetSummary {
    pub fn new(source: &DataSource, table: &IngestedTable, encoder: &FeatureEncoder) -> Self {
        Self {
            source: source.describe(),
            rows_read: table.rows_read,
            rows_used: table.n_rows(),
            rows_dropped: table.rows_dropped,
            row_errors: table.row_errors.clone(),
            columns: encoder.columns().to_vec(),
            skipped: encoder.skipped().to_vec(),
            feature_names: encoder.feature_names().to_vec(),
        }
    }
}

/// Feature importances paired with names, largest first.
pub fn top_importances(names: &[String], importances: &[f64], top_n: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names
        .iter()
        .cloned()
        .zip(importances.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}
