//! Shared domain types.
//!
//! Run configurations are derived from CLI flags (plus defaults) and are the only
//! thing the pipelines look at; nothing below `app` touches clap argument structs.

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{ForestParams, KMeansParams, MlpParams, TreeParams};

/// Where the CSV bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    File(PathBuf),
    Url(String),
}

impl DataSource {
    pub fn describe(&self) -> String {
        match self {
            DataSource::File(path) => path.display().to_string(),
            DataSource::Url(url) => url.clone(),
        }
    }
}

/// Which classifier(s) to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSpec {
    All,
    Tree,
    Forest,
    Mlp,
}

impl ModelSpec {
    pub fn kinds(self) -> Vec<ClassifierKind> {
        match self {
            ModelSpec::All => vec![ClassifierKind::Tree, ClassifierKind::Forest, ClassifierKind::Mlp],
            ModelSpec::Tree => vec![ClassifierKind::Tree],
            ModelSpec::Forest => vec![ClassifierKind::Forest],
            ModelSpec::Mlp => vec![ClassifierKind::Mlp],
        }
    }
}

/// Concrete classifier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    Tree,
    Forest,
    Mlp,
}

impl ClassifierKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ClassifierKind::Tree => "Decision tree",
            ClassifierKind::Forest => "Random forest",
            ClassifierKind::Mlp => "Neural network",
        }
    }

    /// Short key used in export column names.
    pub fn key(self) -> &'static str {
        match self {
            ClassifierKind::Tree => "tree",
            ClassifierKind::Forest => "forest",
            ClassifierKind::Mlp => "mlp",
        }
    }
}

/// Column handling shared by both pipelines.
#[derive(Debug, Clone)]
pub struct PrepConfig {
    /// Columns excluded from the feature matrix (ids, free text, leakage).
    pub drop_columns: Vec<String>,
    /// Columns parsed as timestamps and expanded to hour/weekday features.
    pub datetime_columns: Vec<String>,
    /// Categorical columns with more distinct levels than this are skipped.
    pub max_levels: usize,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            drop_columns: Vec::new(),
            datetime_columns: Vec::new(),
            max_levels: 20,
        }
    }
}

/// Configuration of a `risk classify` run.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    pub source: DataSource,
    pub prep: PrepConfig,
    pub target: String,
    /// Label treated as the positive (default) class; inferred when absent.
    pub positive: Option<String>,
    pub model_spec: ModelSpec,
    pub test_size: f64,
    pub stratify: bool,
    pub seed: u64,
    /// Reweight samples inversely to class frequency.
    pub balanced: bool,
    pub tree: TreeParams,
    pub forest: ForestParams,
    pub mlp: MlpParams,
    /// Probability cut-off for the positive class.
    pub threshold: f64,
    pub top_n: usize,
    pub export_predictions: Option<PathBuf>,
    pub export_report: Option<PathBuf>,
}

impl ClassifyConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.target.trim().is_empty() {
            return Err(AppError::usage("Target column name must not be empty."));
        }
        if !(self.test_size.is_finite() && self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(AppError::usage("--test-size must be in (0, 1)."));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(AppError::usage("--threshold must be in (0, 1)."));
        }
        if self.forest.n_trees == 0 {
            return Err(AppError::usage("--trees must be > 0."));
        }
        if self.tree.min_samples_leaf == 0 {
            return Err(AppError::usage("--min-samples-leaf must be > 0."));
        }
        if self.mlp.hidden.is_empty() || self.mlp.hidden.iter().any(|&h| h == 0) {
            return Err(AppError::usage("--hidden must list one or more positive layer sizes."));
        }
        if self.mlp.epochs == 0 || self.mlp.batch_size == 0 {
            return Err(AppError::usage("--epochs and --batch-size must be > 0."));
        }
        if !(self.mlp.learning_rate.is_finite() && self.mlp.learning_rate > 0.0) {
            return Err(AppError::usage("--learning-rate must be > 0."));
        }
        Ok(())
    }
}

/// Configuration of a `risk cluster` run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub source: DataSource,
    pub prep: PrepConfig,
    /// Optional column echoed in reports/exports to identify rows.
    pub id_column: Option<String>,
    pub k_min: usize,
    pub k_max: usize,
    pub kmeans: KMeansParams,
    /// Distance percentile above which a row is flagged.
    pub percentile: f64,
    /// Max points used for silhouette scoring (0 = all).
    pub silhouette_sample: usize,
    pub top_n: usize,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export_rows: Option<PathBuf>,
    pub export_report: Option<PathBuf>,
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.k_min < 2 {
            return Err(AppError::usage("--k-min must be >= 2 for silhouette scoring."));
        }
        if self.k_max < self.k_min {
            return Err(AppError::usage("--k-max must be >= --k-min."));
        }
        if self.kmeans.n_init == 0 || self.kmeans.max_iter == 0 {
            return Err(AppError::usage("--n-init and --max-iter must be > 0."));
        }
        if !(self.percentile.is_finite() && self.percentile > 0.0 && self.percentile < 100.0) {
            return Err(AppError::usage("--percentile must be in (0, 100)."));
        }
        Ok(())
    }
}
