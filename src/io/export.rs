//! Exports: per-row CSVs and a JSON run summary.
//!
//! The CSVs are meant to be easy to consume in spreadsheets or downstream scripts;
//! the JSON summary captures everything the terminal report shows.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::pipeline::{ClassifyOutput, ClusterOutput};
use crate::domain::{ClassifierKind, ClassifyConfig, ClusterConfig};
use crate::error::AppError;
use crate::fit::{KCandidate, ModelEvaluation};
use crate::prep::TargetEncoding;
use crate::report::DatasetSummary;

/// Write per-row test-set predictions for every evaluated model.
///
/// Columns: `row,line,split,y_true` then `<model>_proba,<model>_pred` per model.
/// `line` is the CSV line the row was read from.
pub fn write_predictions_csv(path: &Path, run: &ClassifyOutput, threshold: f64) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    let mut header = String::from("row,line,split,y_true");
    for eval in &run.comparison.evaluations {
        let key = eval.kind.key();
        header.push_str(&format!(",{key}_proba,{key}_pred"));
    }
    writeln!(file, "{header}")
        .map_err(|e| AppError::usage(format!("Failed to write export CSV header: {e}")))?;

    for (i, (&row, &y)) in run.test_rows.iter().zip(&run.y_test).enumerate() {
        let mut line = format!("{row},{},test,{y}", run.line(row));
        for eval in &run.comparison.evaluations {
            let p = eval.test_proba[i];
            line.push_str(&format!(",{p:.6},{}", u8::from(p >= threshold)));
        }
        writeln!(file, "{line}")
            .map_err(|e| AppError::usage(format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

/// Write `row,line,id,cluster,distance,is_anomaly` for every clustered row.
pub fn write_anomaly_csv(path: &Path, run: &ClusterOutput) -> Result<(), AppError> {
    // ids are free text, so let the csv writer handle quoting
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::usage(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    let write_err = |e: csv::Error| AppError::usage(format!("Failed to write export CSV row: {e}"));

    writer
        .write_record(["row", "line", "id", "cluster", "distance", "is_anomaly"])
        .map_err(write_err)?;
    let scores = &run.scores;
    for row in 0..scores.labels.len() {
        writer
            .write_record([
                row.to_string(),
                run.line(row).to_string(),
                run.id(row).to_string(),
                scores.labels[row].to_string(),
                format!("{:.6}", scores.distances[row]),
                scores.flags[row].to_string(),
            ])
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::usage(format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// JSON summary of a `risk classify` run.
#[derive(Debug, Serialize)]
pub struct ClassifyReport<'a> {
    pub tool: &'static str,
    pub command: &'static str,
    pub generated_at: DateTime<Utc>,
    pub dataset: &'a DatasetSummary,
    pub target: &'a TargetEncoding,
    pub n_train: usize,
    pub n_test: usize,
    pub threshold: f64,
    pub balanced: bool,
    pub models: &'a [ModelEvaluation],
    pub best: ClassifierKind,
}

impl<'a> ClassifyReport<'a> {
    pub fn new(run: &'a ClassifyOutput, config: &ClassifyConfig, generated_at: DateTime<Utc>) -> Self {
        Self {
            tool: "risk",
            command: "classify",
            generated_at,
            dataset: &run.dataset,
            target: &run.target,
            n_train: run.n_train,
            n_test: run.y_test.len(),
            threshold: config.threshold,
            balanced: config.balanced,
            models: &run.comparison.evaluations,
            best: run.comparison.best().kind,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SkippedK<'a> {
    pub k: usize,
    pub reason: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AnomalyRow<'a> {
    pub row: usize,
    pub line: usize,
    pub id: &'a str,
    pub cluster: usize,
    pub distance: f64,
}

/// JSON summary of a `risk cluster` run.
#[derive(Debug, Serialize)]
pub struct ClusterReport<'a> {
    pub tool: &'static str,
    pub command: &'static str,
    pub generated_at: DateTime<Utc>,
    pub dataset: &'a DatasetSummary,
    pub candidates: &'a [KCandidate],
    pub skipped: Vec<SkippedK<'a>>,
    pub best_k: usize,
    pub cluster_sizes: Vec<usize>,
    pub percentile: f64,
    pub threshold: f64,
    pub n_anomalies: usize,
    pub top_anomalies: Vec<AnomalyRow<'a>>,
}

impl<'a> ClusterReport<'a> {
    pub fn new(run: &'a ClusterOutput, config: &ClusterConfig, generated_at: DateTime<Utc>) -> Self {
        let top_anomalies = run
            .scores
            .ranked()
            .into_iter()
            .take(config.top_n)
            .map(|a| AnomalyRow {
                row: a.row,
                line: run.line(a.row),
                id: run.id(a.row),
                cluster: a.cluster,
                distance: a.distance,
            })
            .collect();

        Self {
            tool: "risk",
            command: "cluster",
            generated_at,
            dataset: &run.dataset,
            candidates: &run.sweep.candidates,
            skipped: run
                .sweep
                .skipped
                .iter()
                .map(|(k, reason)| SkippedK { k: *k, reason })
                .collect(),
            best_k: run.sweep.best_k,
            cluster_sizes: run.sweep.model.cluster_sizes(),
            percentile: run.scores.percentile,
            threshold: run.scores.threshold,
            n_anomalies: run.scores.n_anomalies(),
            top_anomalies,
        }
    }
}

/// Write any report as pretty JSON.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::usage(format!("Failed to create report JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, report)
        .map_err(|e| AppError::usage(format!("Failed to write report JSON: {e}")))?;
    Ok(())
}
