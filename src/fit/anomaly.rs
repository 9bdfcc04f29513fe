//! Distance-to-centroid anomaly flagging.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AppError;
use crate::metrics::percentile;
use crate::models::KMeans;

/// Per-row anomaly scores for a fitted clustering.
#[derive(Debug, Clone)]
pub struct AnomalyScores {
    pub labels: Vec<usize>,
    pub distances: Vec<f64>,
    /// Percentile of `distances` used as the cut-off.
    pub percentile: f64,
    pub threshold: f64,
    pub flags: Vec<bool>,
}

/// One flagged row, for ranking and reporting.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    /// Zero-based row in the cleaned table.
    pub row: usize,
    pub cluster: usize,
    pub distance: f64,
}

impl AnomalyScores {
    pub fn n_anomalies(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    /// Flagged rows ordered by distance, farthest first.
    pub fn ranked(&self) -> Vec<Anomaly> {
        let mut out: Vec<Anomaly> = self
            .flags
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(row, _)| Anomaly {
                row,
                cluster: self.labels[row],
                distance: self.distances[row],
            })
            .collect();
        out.sort_by(|a, b| b.distance.total_cmp(&a.distance).then(a.row.cmp(&b.row)));
        out
    }
}

/// Flag rows whose distance to their centroid exceeds the given percentile.
pub fn score_anomalies(
    x: &DMatrix<f64>,
    model: &KMeans,
    pct: f64,
) -> Result<AnomalyScores, AppError> {
    if x.nrows() != model.labels.len() {
        return Err(AppError::runtime(format!(
            "Clustering has {} labels for {} rows.",
            model.labels.len(),
            x.nrows()
        )));
    }
    let distances = model.distances(x);
    let threshold = percentile(&distances, pct)
        .ok_or_else(|| AppError::data("No distances to threshold."))?;
    let flags = distances.iter().map(|&d| d > threshold).collect();

    Ok(AnomalyScores {
        labels: model.labels.clone(),
        distances,
        percentile: pct,
        threshold,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_cluster(values: &[f64]) -> (DMatrix<f64>, KMeans) {
        let x = DMatrix::from_row_slice(values.len(), 1, values);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let model = KMeans {
            k: 1,
            centroids: DMatrix::from_row_slice(1, 1, &[mean]),
            labels: vec![0; values.len()],
            inertia: 0.0,
        };
        (x, model)
    }

    #[test]
    fn flags_only_rows_strictly_beyond_threshold() {
        // centroid at 2.0
        let (x, model) = one_cluster(&[1.0, 2.0, 2.0, 2.0, 3.0]);
        let scores = score_anomalies(&x, &model, 50.0).unwrap();
        assert_eq!(scores.distances, vec![1.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(scores.threshold, 0.0);
        assert_eq!(scores.flags, vec![true, false, false, false, true]);
        assert_eq!(scores.n_anomalies(), 2);
    }

    #[test]
    fn ranked_is_farthest_first() {
        let (x, model) = one_cluster(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0, -5.0]);
        // centroid at -0.2, threshold lands between 0.2 and 3.2
        let scores = score_anomalies(&x, &model, 80.0).unwrap();
        let ranked = scores.ranked();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].row, 9);
        assert_eq!(ranked[1].row, 8);
        assert!(ranked[0].distance > ranked[1].distance);
    }

    #[test]
    fn label_length_mismatch_is_rejected() {
        let (_, model) = one_cluster(&[1.0, 2.0]);
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        assert!(score_anomalies(&x, &model, 95.0).is_err());
    }
}
