//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main that:
//! - parses CLI arguments and sets up logging
//! - resolves the dataset source
//! - runs the classify or cluster pipeline
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{ClassifyArgs, ClusterArgs, Command, PrepArgs};
use crate::data::{LOAN_URL_ENV, TRANSACTIONS_URL_ENV, resolve_source};
use crate::domain::{ClassifyConfig, ClusterConfig, PrepConfig};
use crate::error::AppError;
use crate::io::export::{ClassifyReport, ClusterReport, write_anomaly_csv, write_json_report, write_predictions_csv};
use crate::models::{ForestParams, KMeansParams, MlpParams, TreeParams};

pub mod pipeline;

/// Entry point for the `risk` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Classify(args) => handle_classify(&args),
        Command::Cluster(args) => handle_cluster(&args),
    }
}

/// stderr logging; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a subscriber may already be installed (tests, embedding); keep it
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_classify(args: &ClassifyArgs) -> Result<(), AppError> {
    let config = classify_config_from_args(args)?;
    let run = pipeline::run_classify(&config)?;

    println!("{}", crate::report::format_classify_report(&run, &config));

    if let Some(path) = &config.export_predictions {
        write_predictions_csv(path, &run, config.threshold)?;
        info!(path = %path.display(), "wrote predictions");
    }
    if let Some(path) = &config.export_report {
        write_json_report(path, &ClassifyReport::new(&run, &config, chrono::Utc::now()))?;
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}

fn handle_cluster(args: &ClusterArgs) -> Result<(), AppError> {
    let config = cluster_config_from_args(args)?;
    let run = pipeline::run_cluster(&config)?;

    println!("{}", crate::report::format_cluster_report(&run, &config));

    if config.plot {
        println!("Silhouette by k:");
        println!(
            "{}",
            crate::plot::render_silhouette_plot(
                &run.sweep.candidates,
                run.sweep.best_k,
                config.plot_width,
                (config.plot_height / 2).max(5),
            )
        );
        if let Some(projection) = &run.projection {
            println!("Clusters (PCA projection):");
            println!(
                "{}",
                crate::plot::render_cluster_scatter(
                    projection,
                    &run.scores.labels,
                    &run.scores.flags,
                    config.plot_width,
                    config.plot_height,
                )
            );
        }
    }

    if let Some(path) = &config.export_rows {
        write_anomaly_csv(path, &run)?;
        info!(path = %path.display(), "wrote anomaly rows");
    }
    if let Some(path) = &config.export_report {
        write_json_report(path, &ClusterReport::new(&run, &config, chrono::Utc::now()))?;
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}

fn prep_config_from_args(args: &PrepArgs) -> PrepConfig {
    PrepConfig {
        drop_columns: args.drop.clone(),
        datetime_columns: args.datetime.clone(),
        max_levels: args.max_levels,
    }
}

pub fn classify_config_from_args(args: &ClassifyArgs) -> Result<ClassifyConfig, AppError> {
    let source = resolve_source(args.source.csv.as_deref(), args.source.url.as_deref(), LOAN_URL_ENV)?;
    let config = ClassifyConfig {
        source,
        prep: prep_config_from_args(&args.prep),
        target: args.target.clone(),
        positive: args.positive.clone(),
        model_spec: args.model,
        test_size: args.test_size,
        stratify: !args.no_stratify,
        seed: args.seed,
        balanced: args.balanced,
        tree: TreeParams {
            max_depth: args.max_depth,
            min_samples_leaf: args.min_samples_leaf,
            seed: args.seed,
            ..TreeParams::default()
        },
        forest: ForestParams {
            n_trees: args.trees,
            max_depth: args.max_depth,
            min_samples_leaf: args.min_samples_leaf,
            seed: args.seed,
            ..ForestParams::default()
        },
        mlp: MlpParams {
            hidden: args.hidden.clone(),
            epochs: args.epochs,
            learning_rate: args.learning_rate,
            batch_size: args.batch_size,
            seed: args.seed,
            ..MlpParams::default()
        },
        threshold: args.threshold,
        top_n: args.top,
        export_predictions: args.export.clone(),
        export_report: args.export_report.clone(),
    };
    config.validate()?;
    Ok(config)
}

pub fn cluster_config_from_args(args: &ClusterArgs) -> Result<ClusterConfig, AppError> {
    let source = resolve_source(
        args.source.csv.as_deref(),
        args.source.url.as_deref(),
        TRANSACTIONS_URL_ENV,
    )?;
    let config = ClusterConfig {
        source,
        prep: prep_config_from_args(&args.prep),
        id_column: args.id_column.clone(),
        k_min: args.k_min,
        k_max: args.k_max,
        kmeans: KMeansParams {
            n_init: args.n_init,
            max_iter: args.max_iter,
            seed: args.seed,
            ..KMeansParams::default()
        },
        percentile: args.percentile,
        silhouette_sample: args.silhouette_sample,
        top_n: args.top,
        plot: !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
        export_rows: args.export.clone(),
        export_report: args.export_report.clone(),
    };
    config.validate()?;
    Ok(config)
}
