//! Formatted terminal output for both pipelines.
//!
//! Formatting lives here so the modelling code stays free of presentation and
//! output changes stay localized.

use crate::app::pipeline::{ClassifyOutput, ClusterOutput};
use crate::domain::{ClassifyConfig, ClusterConfig};
use crate::metrics::ConfusionMatrix;
use crate::report::{DatasetSummary, top_importances};

/// Row errors listed individually before summarising the rest.
const MAX_ROW_ERRORS_SHOWN: usize = 5;

/// Dataset block shared by both reports.
pub fn format_dataset_summary(dataset: &DatasetSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Source: {}\n", dataset.source));
    out.push_str(&format!(
        "Rows: read={} | used={} | dropped (missing)={} | malformed={}\n",
        dataset.rows_read,
        dataset.rows_used,
        dataset.rows_dropped,
        dataset.row_errors.len()
    ));
    for err in dataset.row_errors.iter().take(MAX_ROW_ERRORS_SHOWN) {
        out.push_str(&format!("  line {}: {}\n", err.line, err.message));
    }
    if dataset.row_errors.len() > MAX_ROW_ERRORS_SHOWN {
        out.push_str(&format!(
            "  ... {} more\n",
            dataset.row_errors.len() - MAX_ROW_ERRORS_SHOWN
        ));
    }
    out.push_str(&format!(
        "Features: {} from {} columns\n",
        dataset.feature_names.len(),
        dataset.columns.len()
    ));
    for skipped in &dataset.skipped {
        out.push_str(&format!("  (skipped {}) {}\n", skipped.name, skipped.reason));
    }
    out
}

/// Full `risk classify` report: data, split, per-model metrics, confusion, importances.
pub fn format_classify_report(run: &ClassifyOutput, config: &ClassifyConfig) -> String {
    let mut out = String::new();

    out.push_str("=== risk classify - default prediction ===\n");
    out.push_str(&format_dataset_summary(&run.dataset));
    out.push_str(&format!(
        "Target: {} (positive='{}', negative='{}')\n",
        run.target.column, run.target.positive, run.target.negative
    ));
    out.push_str(&format!(
        "Split: train={} ({:.1}% positive) | test={} ({:.1}% positive) | {}{}\n",
        run.n_train,
        pct(run.train_positive, run.n_train),
        run.y_test.len(),
        pct(run.test_positive(), run.y_test.len()),
        if config.stratify { "stratified" } else { "shuffled" },
        if config.balanced { " | balanced weights" } else { "" },
    ));

    out.push_str(&format!("\nTest metrics (threshold {:.2}):\n", config.threshold));
    let header = format!(
        "  {:<16} {:>8} {:>9} {:>8} {:>8} {:>8}",
        "model", "accuracy", "precision", "recall", "f1", "roc_auc"
    );
    out.push_str(header.trim_end());
    out.push('\n');
    out.push_str(&format!(
        "  {:-<16} {:-<8} {:-<9} {:-<8} {:-<8} {:-<8}\n",
        "", "", "", "", "", ""
    ));
    for (i, eval) in run.comparison.evaluations.iter().enumerate() {
        let chosen = if i == run.comparison.best { "*" } else { " " };
        let m = &eval.metrics;
        let auc = m.roc_auc.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string());
        out.push_str(&format!(
            "{chosen} {:<16} {:>8.4} {:>9.4} {:>8.4} {:>8.4} {:>8}\n",
            eval.kind.display_name(),
            m.accuracy,
            m.precision,
            m.recall,
            m.f1,
            auc
        ));
    }

    out.push_str("\nConfusion matrices (rows = actual, cols = predicted):\n");
    for eval in &run.comparison.evaluations {
        out.push_str(&format!("- {} [{}]\n", eval.kind.display_name(), eval.description));
        out.push_str(&format_confusion(&eval.metrics.confusion));
    }

    let best = run.comparison.best();
    out.push_str(&format!(
        "\nBest model: {} (ROC AUC, then F1)\n",
        best.kind.display_name()
    ));

    for eval in &run.comparison.evaluations {
        let Some(importances) = &eval.importances else {
            continue;
        };
        let top = top_importances(&run.dataset.feature_names, importances, config.top_n);
        if top.is_empty() {
            continue;
        }
        out.push_str(&format!("\nTop features ({}):\n", eval.kind.display_name()));
        for (name, value) in top {
            out.push_str(&format!("  {:<32} {value:>8.4}\n", truncate(&name, 32)));
        }
    }

    out
}

fn format_confusion(cm: &ConfusionMatrix) -> String {
    let mut out = String::new();
    out.push_str(&format!("  {:<10} {:>8} {:>8}\n", "", "pred 0", "pred 1"));
    out.push_str(&format!("  {:<10} {:>8} {:>8}\n", "actual 0", cm.tn, cm.fp));
    out.push_str(&format!("  {:<10} {:>8} {:>8}\n", "actual 1", cm.fn_, cm.tp));
    out
}

/// Full `risk cluster` report: data, k sweep, cluster sizes, anomaly summary.
pub fn format_cluster_report(run: &ClusterOutput, config: &ClusterConfig) -> String {
    let mut out = String::new();

    out.push_str("=== risk cluster - transaction anomalies ===\n");
    out.push_str(&format_dataset_summary(&run.dataset));

    out.push_str("\nK sweep (silhouette):\n");
    out.push_str(&format!("  {:>4} {:>10} {:>14}\n", "k", "silhouette", "inertia"));
    out.push_str(&format!("  {:->4} {:->10} {:->14}\n", "", "", ""));
    for c in &run.sweep.candidates {
        let chosen = if c.k == run.sweep.best_k { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} {:>4} {:>10.4} {:>14.3}\n",
            c.k, c.silhouette, c.inertia
        ));
    }
    for (k, reason) in &run.sweep.skipped {
        out.push_str(&format!("  (skipped k={k}) {reason}\n"));
    }

    out.push_str(&format!("\nChosen k: {}\n", run.sweep.best_k));
    out.push_str("Cluster sizes:\n");
    let n = run.scores.labels.len();
    for (c, size) in run.sweep.model.cluster_sizes().into_iter().enumerate() {
        out.push_str(&format!("  cluster {c:<3} {size:>8} ({:.1}%)\n", pct(size, n)));
    }

    let n_anomalies = run.scores.n_anomalies();
    out.push_str(&format!(
        "\nThreshold: p{} of distance-to-centroid = {:.4}\n",
        fmt_percentile(run.scores.percentile),
        run.scores.threshold
    ));
    out.push_str(&format!(
        "Anomalies: {n_anomalies} of {n} rows ({:.1}%)\n",
        pct(n_anomalies, n)
    ));

    let ranked = run.scores.ranked();
    if !ranked.is_empty() {
        out.push_str(&format!("\nTop anomalies (max {}):\n", config.top_n));
        let header = format!(
            "  {:>6} {:>6} {:<24} {:>7} {:>10}",
            "row", "line", "id", "cluster", "distance"
        );
        out.push_str(header.trim_end());
        out.push('\n');
        out.push_str(&format!("  {:-<6} {:-<6} {:-<24} {:-<7} {:-<10}\n", "", "", "", "", ""));
        for a in ranked.iter().take(config.top_n) {
            let line = format!(
                "  {:>6} {:>6} {:<24} {:>7} {:>10.4}",
                a.row,
                run.line(a.row),
                truncate(run.id(a.row), 24),
                a.cluster,
                a.distance
            );
            out.push_str(line.trim_end());
            out.push('\n');
        }
    }

    out
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { 100.0 * part as f64 / whole as f64 }
}

fn fmt_percentile(p: f64) -> String {
    if p.fract() == 0.0 { format!("{p:.0}") } else { format!("{p}") }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::tests::{classify_config, cluster_config, loan_csv, transactions_csv};
    use crate::app::pipeline::{run_classify_with_bytes, run_cluster_with_bytes};

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd.");
    }

    #[test]
    fn confusion_layout() {
        let cm = ConfusionMatrix { tp: 4, tn: 10, fp: 1, fn_: 2 };
        let txt = format_confusion(&cm);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("10        1"));
        assert!(lines[2].ends_with("2        4"));
    }

    #[test]
    fn classify_report_marks_exactly_one_best_model() {
        let config = classify_config();
        let run = run_classify_with_bytes(&config, loan_csv().as_bytes()).unwrap();
        let txt = format_classify_report(&run, &config);

        assert!(txt.contains("positive='yes'"));
        assert!(txt.contains("Decision tree"));
        assert!(txt.contains("Random forest"));
        assert!(txt.contains("Neural network"));
        let starred = txt.lines().filter(|l| l.starts_with('*')).count();
        assert_eq!(starred, 1);
        assert!(txt.contains("Top features (Random forest):"));
    }

    #[test]
    fn cluster_report_lists_sweep_and_anomalies() {
        let config = cluster_config();
        let run = run_cluster_with_bytes(&config, transactions_csv().as_bytes()).unwrap();
        let txt = format_cluster_report(&run, &config);

        assert!(txt.contains("Chosen k: 3"));
        assert!(txt.contains("Threshold: p95"));
        assert!(txt.contains("Top anomalies"));
        let starred: Vec<&str> = txt.lines().filter(|l| l.starts_with('*')).collect();
        assert_eq!(starred.len(), 1);
        assert!(starred[0].contains(" 3 "));
    }
}
