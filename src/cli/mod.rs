//! Command-line parsing for the credit-risk screens.
//!
//! Argument parsing and command dispatch stay separate from the modelling code:
//! the structs here are turned into domain configs in `app`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::ModelSpec;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "risk",
    version,
    about = "Loan-default classifiers and transaction anomaly screening"
)]
pub struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train a decision tree, a random forest and a neural network to predict
    /// loan default, then compare them on a held-out split.
    #[command(after_help = "Dataset: --csv or --url, otherwise the URL in RISK_LOAN_URL \
(environment or .env). There is no built-in default dataset.")]
    Classify(ClassifyArgs),
    /// Cluster transactions with K-Means (k chosen by silhouette) and flag rows
    /// far from their centroid.
    #[command(after_help = "Dataset: --csv or --url, otherwise the URL in RISK_TRANSACTIONS_URL \
(environment or .env). There is no built-in default dataset.")]
    Cluster(ClusterArgs),
}

/// Where to read the CSV from.
///
/// One of `--csv` / `--url` is required unless the subcommand's URL variable is
/// set; there is no built-in dataset URL.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Local CSV file.
    #[arg(long, value_name = "PATH", conflicts_with = "url")]
    pub csv: Option<PathBuf>,

    /// CSV URL fetched with a plain HTTP GET (default: the URL environment variable).
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
}

/// Column handling shared by both subcommands.
#[derive(Debug, Args, Clone)]
pub struct PrepArgs {
    /// Column to leave out of the features (repeatable).
    #[arg(long = "drop", value_name = "COL")]
    pub drop: Vec<String>,

    /// Column holding timestamps, expanded to hour and weekday (repeatable).
    #[arg(long = "datetime", value_name = "COL")]
    pub datetime: Vec<String>,

    /// Skip categorical columns with more distinct values than this.
    #[arg(long, default_value_t = 20)]
    pub max_levels: usize,
}

#[derive(Debug, Args, Clone)]
pub struct ClassifyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub prep: PrepArgs,

    /// Binary target column (e.g. the default flag).
    #[arg(long, value_name = "COL")]
    pub target: String,

    /// Target value treated as the positive class (default: inferred).
    #[arg(long, value_name = "LABEL")]
    pub positive: Option<String>,

    /// Which classifier(s) to train.
    #[arg(long, value_enum, default_value_t = ModelSpec::All)]
    pub model: ModelSpec,

    /// Fraction of rows held out for evaluation.
    #[arg(long, default_value_t = 0.2)]
    pub test_size: f64,

    /// Split without preserving the class ratio.
    #[arg(long)]
    pub no_stratify: bool,

    /// Seed for the split and every model.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Weight samples inversely to class frequency.
    #[arg(long)]
    pub balanced: bool,

    /// Maximum tree depth (decision tree and forest).
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Minimum rows per tree leaf.
    #[arg(long, default_value_t = 1)]
    pub min_samples_leaf: usize,

    /// Number of trees in the random forest.
    #[arg(long, default_value_t = 100)]
    pub trees: usize,

    /// Hidden layer sizes of the neural network.
    #[arg(long, value_delimiter = ',', default_values_t = [16usize, 8])]
    pub hidden: Vec<usize>,

    /// Maximum training epochs for the neural network.
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Adam learning rate.
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Mini-batch size.
    #[arg(long, default_value_t = 200)]
    pub batch_size: usize,

    /// Probability cut-off for predicting the positive class.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f64,

    /// Show the top-N feature importances per tree model.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Export per-row test predictions to CSV.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Export a JSON run summary.
    #[arg(long = "export-report", value_name = "PATH")]
    pub export_report: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ClusterArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub prep: PrepArgs,

    /// Column identifying each row in reports and exports (never a feature).
    #[arg(long, value_name = "COL")]
    pub id_column: Option<String>,

    /// Smallest k tried.
    #[arg(long, default_value_t = 2)]
    pub k_min: usize,

    /// Largest k tried.
    #[arg(long, default_value_t = 10)]
    pub k_max: usize,

    /// K-Means restarts per k.
    #[arg(long, default_value_t = 10)]
    pub n_init: usize,

    /// Lloyd iterations per restart.
    #[arg(long, default_value_t = 300)]
    pub max_iter: usize,

    /// Distance percentile above which a row is an anomaly.
    #[arg(long, default_value_t = 95.0)]
    pub percentile: f64,

    /// Rows sampled for silhouette scoring (0 = all rows).
    #[arg(long, default_value_t = 5000)]
    pub silhouette_sample: usize,

    /// Seed for K-Means seeding and silhouette sampling.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Show the top-N anomalies.
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Disable the terminal plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Export `row,id,cluster,distance,is_anomaly` for every row to CSV.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Export a JSON run summary.
    #[arg(long = "export-report", value_name = "PATH")]
    pub export_report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn classify_defaults() {
        let cli = Cli::parse_from(["risk", "classify", "--csv", "loans.csv", "--target", "default"]);
        let Command::Classify(args) = cli.command else {
            panic!("expected classify");
        };
        assert_eq!(args.hidden, vec![16, 8]);
        assert_eq!(args.model, ModelSpec::All);
        assert_eq!(args.test_size, 0.2);
        assert!(!args.no_stratify);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn cluster_flags_and_repeatable_columns() {
        let cli = Cli::parse_from([
            "risk", "-vv", "cluster", "--url", "http://x/t.csv", "--drop", "a", "--drop", "b",
            "--datetime", "ts", "--k-max", "6", "--no-plot",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Cluster(args) = cli.command else {
            panic!("expected cluster");
        };
        assert_eq!(args.prep.drop, vec!["a", "b"]);
        assert_eq!(args.prep.datetime, vec!["ts"]);
        assert_eq!(args.k_max, 6);
        assert!(args.no_plot);
        assert_eq!(args.source.url.as_deref(), Some("http://x/t.csv"));
    }

    #[test]
    fn help_names_the_dataset_url_variables() {
        let mut cmd = Cli::command();
        let classify = cmd.find_subcommand_mut("classify").unwrap().render_long_help().to_string();
        assert!(classify.contains("RISK_LOAN_URL"));
        let cluster = cmd.find_subcommand_mut("cluster").unwrap().render_long_help().to_string();
        assert!(cluster.contains("RISK_TRANSACTIONS_URL"));
    }

    #[test]
    fn csv_and_url_conflict() {
        let res = Cli::try_parse_from([
            "risk", "cluster", "--csv", "a.csv", "--url", "http://x",
        ]);
        assert!(res.is_err());
    }
}
