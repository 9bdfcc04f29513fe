//! Model selection.
//!
//! - Classifiers: train each requested kind, evaluate on the held-out rows and
//!   pick the highest ROC AUC (F1 breaks ties, and ranks models whose AUC is
//!   undefined).
//! - K-Means: sweep `k_min..=k_max`, score each clustering by silhouette and
//!   pick the maximum (smaller k on ties).

use std::cmp::Ordering;

use nalgebra::DMatrix;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ClassifierKind, ClassifyConfig};
use crate::error::AppError;
use crate::metrics::{ClassificationMetrics, silhouette_score};
use crate::models::{FittedClassifier, KMeans, KMeansParams, fit_kmeans};

/// One trained classifier scored on the test rows.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEvaluation {
    pub kind: ClassifierKind,
    pub metrics: ClassificationMetrics,
    /// Short model summary (depth, trees, final loss).
    pub description: String,
    #[serde(skip)]
    pub test_proba: Vec<f64>,
    #[serde(skip)]
    pub importances: Option<Vec<f64>>,
}

/// Held-out evaluation of every requested classifier.
#[derive(Debug, Clone)]
pub struct ClassifierComparison {
    pub evaluations: Vec<ModelEvaluation>,
    /// Index into `evaluations`.
    pub best: usize,
}

impl ClassifierComparison {
    pub fn best(&self) -> &ModelEvaluation {
        &self.evaluations[self.best]
    }
}

/// Train each kind on the training rows and score it on the test rows.
#[allow(clippy::too_many_arguments)]
pub fn compare_classifiers(
    kinds: &[ClassifierKind],
    config: &ClassifyConfig,
    x_train: &DMatrix<f64>,
    y_train: &[u8],
    weights: Option<&[f64]>,
    x_test: &DMatrix<f64>,
    y_test: &[u8],
) -> Result<ClassifierComparison, AppError> {
    let mut evaluations = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        info!(model = kind.key(), rows = x_train.nrows(), "training classifier");
        let model = FittedClassifier::train(kind, config, x_train, y_train, weights)?;
        let proba = model.predict_proba(x_test)?;
        let metrics = ClassificationMetrics::evaluate(y_test, &proba, config.threshold);
        debug!(
            model = kind.key(),
            f1 = metrics.f1,
            auc = ?metrics.roc_auc,
            "classifier evaluated"
        );
        evaluations.push(ModelEvaluation {
            kind,
            metrics,
            description: model.describe(),
            test_proba: proba,
            importances: model.feature_importances().map(<[f64]>::to_vec),
        });
    }

    let best = best_index(&evaluations)
        .ok_or_else(|| AppError::usage("No classifier was requested."))?;
    Ok(ClassifierComparison { evaluations, best })
}

/// Highest ROC AUC, then highest F1; the earlier model wins a full tie.
pub fn best_index(evaluations: &[ModelEvaluation]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, eval) in evaluations.iter().enumerate() {
        match best {
            None => best = Some(i),
            Some(b) if rank(&eval.metrics, &evaluations[b].metrics) == Ordering::Greater => {
                best = Some(i)
            }
            Some(_) => {}
        }
    }
    best
}

fn rank(a: &ClassificationMetrics, b: &ClassificationMetrics) -> Ordering {
    let auc_a = a.roc_auc.unwrap_or(f64::NEG_INFINITY);
    let auc_b = b.roc_auc.unwrap_or(f64::NEG_INFINITY);
    auc_a.total_cmp(&auc_b).then(a.f1.total_cmp(&b.f1))
}

/// A scored K-Means candidate.
#[derive(Debug, Clone, Serialize)]
pub struct KCandidate {
    pub k: usize,
    pub silhouette: f64,
    pub inertia: f64,
}

/// Output of the k sweep.
#[derive(Debug, Clone)]
pub struct KSweep {
    pub candidates: Vec<KCandidate>,
    /// k values that could not be scored and why.
    pub skipped: Vec<(usize, String)>,
    pub best_k: usize,
    /// Clustering fitted at `best_k`.
    pub model: KMeans,
}

impl KSweep {
    pub fn best_candidate(&self) -> Option<&KCandidate> {
        self.candidates.iter().find(|c| c.k == self.best_k)
    }
}

/// Fit K-Means for every k in `k_min..=k_max` and keep the best silhouette.
///
/// k is capped at `n - 1` since silhouette needs at least one cluster with two
/// members. Exits with code 3 when no candidate can be scored.
pub fn sweep_k(
    x: &DMatrix<f64>,
    k_min: usize,
    k_max: usize,
    params: &KMeansParams,
    silhouette_sample: usize,
) -> Result<KSweep, AppError> {
    let n = x.nrows();
    let mut candidates = Vec::new();
    let mut skipped = Vec::new();
    let mut best: Option<(KCandidate, KMeans)> = None;

    for k in k_min..=k_max {
        if k + 1 > n {
            skipped.push((k, format!("k={k} needs at least {} rows (n={n})", k + 1)));
            continue;
        }

        let model = match fit_kmeans(x, k, params) {
            Ok(model) => model,
            Err(e) => {
                warn!(k, error = %e, "k-means failed, skipping k");
                skipped.push((k, e.to_string()));
                continue;
            }
        };
        let Some(silhouette) = silhouette_score(x, &model.labels, silhouette_sample, params.seed)
        else {
            let occupied = model.cluster_sizes().iter().filter(|&&s| s > 0).count();
            warn!(k, occupied, "silhouette undefined, skipping k");
            skipped.push((k, format!("silhouette undefined ({occupied} non-empty clusters)")));
            continue;
        };

        info!(k, silhouette, inertia = model.inertia, "k candidate scored");
        let candidate = KCandidate {
            k,
            silhouette,
            inertia: model.inertia,
        };

        // strict comparison keeps the smaller k on ties
        let better = best
            .as_ref()
            .is_none_or(|(b, _)| candidate.silhouette > b.silhouette);
        if better {
            best = Some((candidate.clone(), model));
        }
        candidates.push(candidate);
    }

    let Some((chosen, model)) = best else {
        return Err(AppError::data(format!(
            "No k in {k_min}..={k_max} could be scored on {n} rows."
        )));
    };

    Ok(KSweep {
        candidates,
        skipped,
        best_k: chosen.k,
        model,
    })
}
