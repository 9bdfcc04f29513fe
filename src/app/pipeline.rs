//! Shared pipeline logic for the two subcommands.
//!
//! - classify: ingest -> clean -> encode -> split -> scale -> fit/evaluate
//! - cluster: ingest -> clean -> encode -> scale -> k sweep -> anomaly flags
//!
//! The `*_with_bytes` entry points take CSV bytes directly so the whole flow is
//! testable without a network or files.

use tracing::{debug, info, warn};

use crate::data::fetch_bytes;
use crate::domain::{ClassifyConfig, ClusterConfig};
use crate::error::AppError;
use crate::fit::{AnomalyScores, ClassifierComparison, KSweep, compare_classifiers, score_anomalies, sweep_k};
use crate::io::ingest::read_table;
use crate::math::{Projection, project_2d};
use crate::models::balanced_weights;
use crate::prep::{FeatureEncoder, StandardScaler, TargetEncoding, encode_target, select_feature_columns, train_test_split};
use crate::report::DatasetSummary;

/// Fewest cleaned rows a classification run accepts.
const MIN_CLASSIFY_ROWS: usize = 10;

/// All computed outputs of a `risk classify` run.
#[derive(Debug, Clone)]
pub struct ClassifyOutput {
    pub dataset: DatasetSummary,
    pub target: TargetEncoding,
    pub n_train: usize,
    pub train_positive: usize,
    /// Rows (cleaned-table indices) in the test partition, in evaluation order.
    pub test_rows: Vec<usize>,
    /// CSV line of every cleaned row.
    pub lines: Vec<usize>,
    pub y_test: Vec<u8>,
    pub comparison: ClassifierComparison,
}

impl ClassifyOutput {
    pub fn test_positive(&self) -> usize {
        self.y_test.iter().filter(|&&y| y == 1).count()
    }

    /// CSV line a cleaned row came from.
    pub fn line(&self, row: usize) -> usize {
        self.lines.get(row).copied().unwrap_or(0)
    }
}

/// All computed outputs of a `risk cluster` run.
#[derive(Debug, Clone)]
pub struct ClusterOutput {
    pub dataset: DatasetSummary,
    /// Values of `--id-column` per cleaned row.
    pub ids: Option<Vec<String>>,
    /// CSV line of every cleaned row.
    pub lines: Vec<usize>,
    pub sweep: KSweep,
    pub scores: AnomalyScores,
    /// Only computed when plotting is enabled.
    pub projection: Option<Projection>,
}

impl ClusterOutput {
    pub fn id(&self, row: usize) -> &str {
        self.ids
            .as_ref()
            .and_then(|ids| ids.get(row))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn line(&self, row: usize) -> usize {
        self.lines.get(row).copied().unwrap_or(0)
    }
}

pub fn run_classify(config: &ClassifyConfig) -> Result<ClassifyOutput, AppError> {
    config.validate()?;
    let bytes = fetch_bytes(&config.source)?;
    run_classify_with_bytes(config, &bytes)
}

/// Execute the classification pipeline on already-loaded CSV bytes.
pub fn run_classify_with_bytes(config: &ClassifyConfig, bytes: &[u8]) -> Result<ClassifyOutput, AppError> {
    config.validate()?;

    // 1) Parse and clean.
    let mut table = read_table(bytes)?;
    let target_idx = table.column_index(&config.target)?;
    let features = select_feature_columns(&table, &[target_idx], &config.prep)?;
    let mut used = features.clone();
    used.push(target_idx);
    table.drop_incomplete(&used);
    if table.n_rows() < MIN_CLASSIFY_ROWS {
        return Err(AppError::data(format!(
            "Only {} complete rows remain; need at least {MIN_CLASSIFY_ROWS}.",
            table.n_rows()
        )));
    }

    // 2) Encode target + features.
    let (y, target) = encode_target(&table, target_idx, config.positive.as_deref())?;
    let encoder = FeatureEncoder::fit(&table, &features, &config.prep)?;
    let x = encoder.transform(&table)?;
    info!(
        rows = x.nrows(),
        features = x.ncols(),
        positive = %target.positive,
        "encoded classification data"
    );

    // 3) Split, then scale with training statistics only.
    let split = train_test_split(&y, config.test_size, config.stratify, config.seed)?;
    let y_train: Vec<u8> = split.train.iter().map(|&i| y[i]).collect();
    let y_test: Vec<u8> = split.test.iter().map(|&i| y[i]).collect();
    let train_positive = y_train.iter().filter(|&&v| v == 1).count();
    if train_positive == 0 || train_positive == y_train.len() {
        return Err(AppError::data("Training partition contains a single class."));
    }
    if y_test.iter().all(|&v| v == y_test[0]) {
        warn!("test partition contains a single class; ROC AUC is undefined");
    }

    let (scaler, x_train) = StandardScaler::fit_transform(&x.select_rows(&split.train))?;
    let x_test = scaler.transform(&x.select_rows(&split.test))?;
    debug!(train = x_train.nrows(), test = x_test.nrows(), "split and scaled");

    // 4) Fit and compare.
    let weights = config.balanced.then(|| balanced_weights(&y_train));
    let comparison = compare_classifiers(
        &config.model_spec.kinds(),
        config,
        &x_train,
        &y_train,
        weights.as_deref(),
        &x_test,
        &y_test,
    )?;
    info!(best = comparison.best().kind.key(), "classifier comparison done");

    Ok(ClassifyOutput {
        dataset: DatasetSummary::new(&config.source, &table, &encoder),
        target,
        n_train: split.train.len(),
        train_positive,
        test_rows: split.test,
        lines: table.lines.clone(),
        y_test,
        comparison,
    })
}

pub fn run_cluster(config: &ClusterConfig) -> Result<ClusterOutput, AppError> {
    config.validate()?;
    let bytes = fetch_bytes(&config.source)?;
    run_cluster_with_bytes(config, &bytes)
}

/// Execute the clustering pipeline on already-loaded CSV bytes.
pub fn run_cluster_with_bytes(config: &ClusterConfig, bytes: &[u8]) -> Result<ClusterOutput, AppError> {
    config.validate()?;

    // 1) Parse and clean.
    let mut table = read_table(bytes)?;
    let id_idx = config
        .id_column
        .as_deref()
        .map(|name| table.column_index(name))
        .transpose()?;
    let exclude: Vec<usize> = id_idx.into_iter().collect();
    let features = select_feature_columns(&table, &exclude, &config.prep)?;
    table.drop_incomplete(&features);
    if table.n_rows() < config.k_min + 1 {
        return Err(AppError::data(format!(
            "Only {} complete rows remain; k={} needs at least {}.",
            table.n_rows(),
            config.k_min,
            config.k_min + 1
        )));
    }

    // 2) Encode + standardise every row.
    let encoder = FeatureEncoder::fit(&table, &features, &config.prep)?;
    let (_, x) = StandardScaler::fit_transform(&encoder.transform(&table)?)?;
    info!(rows = x.nrows(), features = x.ncols(), "encoded clustering data");

    // 3) Choose k, then flag far-from-centroid rows.
    let sweep = sweep_k(
        &x,
        config.k_min,
        config.k_max,
        &config.kmeans,
        config.silhouette_sample,
    )?;
    let scores = score_anomalies(&x, &sweep.model, config.percentile)?;
    info!(
        k = sweep.best_k,
        threshold = scores.threshold,
        anomalies = scores.n_anomalies(),
        "anomaly scoring done"
    );

    let projection = if config.plot { Some(project_2d(&x)?) } else { None };
    let ids = id_idx.map(|c| table.column(c).map(str::to_string).collect());

    Ok(ClusterOutput {
        dataset: DatasetSummary::new(&config.source, &table, &encoder),
        ids,
        lines: table.lines.clone(),
        sweep,
        scores,
        projection,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::{DataSource, ModelSpec, PrepConfig};
    use crate::models::{ForestParams, KMeansParams, MlpParams, TreeParams};

    /// Two separable applicant groups with a categorical column and an id.
    pub(crate) fn loan_csv() -> String {
        let mut csv = String::from("loan_id,income,debt_ratio,purpose,defaulted\n");
        for i in 0..60 {
            let bad = i % 3 == 0;
            let income = if bad { 20.0 + (i % 7) as f64 } else { 60.0 + (i % 11) as f64 };
            let ratio = if bad { 0.8 - (i % 5) as f64 * 0.02 } else { 0.2 + (i % 5) as f64 * 0.02 };
            let purpose = ["car", "home", "education"][i % 3];
            let label = if bad { "yes" } else { "no" };
            csv.push_str(&format!("L{i},{income},{ratio},{purpose},{label}\n"));
        }
        // one incomplete row that must be dropped
        csv.push_str("L999,,0.5,car,no\n");
        csv
    }

    pub(crate) fn classify_config() -> ClassifyConfig {
        ClassifyConfig {
            source: DataSource::File(PathBuf::from("loans.csv")),
            prep: PrepConfig {
                drop_columns: vec!["loan_id".to_string()],
                ..PrepConfig::default()
            },
            target: "defaulted".to_string(),
            positive: None,
            model_spec: ModelSpec::All,
            test_size: 0.25,
            stratify: true,
            seed: 7,
            balanced: false,
            tree: TreeParams::default(),
            forest: ForestParams {
                n_trees: 15,
                ..ForestParams::default()
            },
            mlp: MlpParams {
                epochs: 150,
                learning_rate: 0.01,
                batch_size: 16,
                ..MlpParams::default()
            },
            threshold: 0.5,
            top_n: 5,
            export_predictions: None,
            export_report: None,
        }
    }

    /// Three tight transaction groups plus two far-away rows.
    pub(crate) fn transactions_csv() -> String {
        let mut csv = String::from("tx_id,amount,hour_score\n");
        let centers = [(10.0, 1.0), (50.0, 5.0), (90.0, 9.0)];
        let mut id = 0;
        for (cx, cy) in centers {
            for j in 0..12 {
                let dx = (j % 4) as f64 * 0.5;
                let dy = (j / 4) as f64 * 0.1;
                csv.push_str(&format!("T{id},{},{}\n", cx + dx, cy + dy));
                id += 1;
            }
        }
        csv.push_str("T900,30.0,9.5\n");
        csv.push_str("T901,70.0,0.5\n");
        csv
    }

    pub(crate) fn cluster_config() -> ClusterConfig {
        ClusterConfig {
            source: DataSource::File(PathBuf::from("tx.csv")),
            prep: PrepConfig::default(),
            id_column: Some("tx_id".to_string()),
            k_min: 2,
            // larger k isolates the two far rows as singleton clusters
            k_max: 3,
            kmeans: KMeansParams::default(),
            percentile: 95.0,
            silhouette_sample: 0,
            top_n: 5,
            plot: true,
            plot_width: 60,
            plot_height: 20,
            export_rows: None,
            export_report: None,
        }
    }

    #[test]
    fn classify_end_to_end_on_separable_data() {
        let config = classify_config();
        let out = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();

        assert_eq!(out.dataset.rows_read, 61);
        assert_eq!(out.dataset.rows_used, 60);
        assert_eq!(out.dataset.rows_dropped, 1);
        assert_eq!(out.target.positive, "yes");
        assert_eq!(out.n_train + out.test_rows.len(), 60);
        assert_eq!(out.test_rows.len(), out.y_test.len());
        // income, debt_ratio, purpose one-hot (3 levels)
        assert_eq!(out.dataset.feature_names.len(), 5);

        assert_eq!(out.comparison.evaluations.len(), 3);
        let best = out.comparison.best();
        assert!(best.metrics.roc_auc.unwrap() > 0.9);
        assert!(best.metrics.f1 > 0.8);
    }

    #[test]
    fn classify_single_model_and_unknown_target() {
        let mut config = classify_config();
        config.model_spec = ModelSpec::Tree;
        let out = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();
        assert_eq!(out.comparison.evaluations.len(), 1);
        assert!(out.comparison.best().importances.is_some());

        config.target = "nope".to_string();
        let err = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn classify_with_too_few_rows_is_a_data_error() {
        let csv = "a,y\n1,0\n2,1\n3,0\n";
        let err = run_classify_with_bytes(&ClassifyConfig {
            target: "y".to_string(),
            prep: PrepConfig::default(),
            ..classify_config()
        }, csv.as_bytes())
        .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn cluster_end_to_end_flags_outliers() {
        let config = cluster_config();
        let out = run_cluster_with_bytes(&config, transactions_csv().as_bytes()).unwrap();

        assert_eq!(out.dataset.rows_used, 38);
        assert_eq!(out.sweep.best_k, 3);
        assert_eq!(out.scores.distances.len(), 38);
        assert!(out.scores.n_anomalies() >= 1);

        let top = &out.scores.ranked()[0];
        assert!(out.id(top.row) == "T900" || out.id(top.row) == "T901");
        assert_eq!(out.projection.as_ref().map(|p| p.coords.nrows()), Some(38));
    }

    #[test]
    fn classify_balanced_and_unstratified_paths() {
        let mut config = classify_config();
        config.balanced = true;
        config.stratify = false;
        let out = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();

        // unstratified split rounds the test share up: ceil(60 * 0.25)
        assert_eq!(out.test_rows.len(), 15);
        assert_eq!(out.n_train, 45);
        assert!(out.train_positive > 0 && out.train_positive < out.n_train);
        assert_eq!(out.comparison.evaluations.len(), 3);
        assert!(out.comparison.best().metrics.roc_auc.unwrap() > 0.9);

        // same seed, same split
        let again = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();
        assert_eq!(again.test_rows, out.test_rows);
    }

    #[test]
    fn classify_rows_map_back_to_csv_lines() {
        let config = classify_config();
        let out = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();
        // the dropped row is the last line, so cleaned row i sits on line i + 2
        for &row in &out.test_rows {
            assert_eq!(out.line(row), row + 2);
        }
    }

    #[test]
    fn cluster_reports_csv_lines_after_dropped_rows() {
        let mut config = cluster_config();
        config.id_column = None;
        config.prep.drop_columns = vec!["tx_id".to_string()];
        let base = transactions_csv();
        let (header, body) = base.split_once('\n').unwrap();
        let csv = format!("{header}\nT_BAD,,1.0\n{body}");

        let out = run_cluster_with_bytes(&config, csv.as_bytes()).unwrap();
        assert_eq!(out.dataset.rows_dropped, 1);
        assert_eq!(out.lines.len(), 38);
        assert_eq!(out.line(0), 3);

        // T900 and T901 sit on lines 39 and 40
        let top = &out.scores.ranked()[0];
        assert!(out.line(top.row) == 39 || out.line(top.row) == 40);
        assert_eq!(out.line(top.row), top.row + 3);
    }

    #[test]
    fn cluster_without_plot_skips_projection() {
        let mut config = cluster_config();
        config.plot = false;
        config.id_column = None;
        config.prep.drop_columns = vec!["tx_id".to_string()];
        let out = run_cluster_with_bytes(&config, transactions_csv().as_bytes()).unwrap();
        assert!(out.projection.is_none());
        assert_eq!(out.id(0), "");
    }
}
