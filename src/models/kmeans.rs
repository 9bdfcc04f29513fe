//! K-Means clustering backed by `linfa-clustering`.
//!
//! linfa runs k-means++ seeding and Lloyd iterations over `n_init` restarts and
//! keeps the lowest-inertia run. The fitted centroids are copied back into
//! nalgebra so the rest of the crate keeps one matrix type.

use linfa::prelude::*;
use linfa_clustering::KMeans as LinfaKMeans;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansParams {
    pub n_init: usize,
    pub max_iter: usize,
    /// Convergence tolerance, relative to the mean per-feature variance.
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// A fitted clustering.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    /// `k x n_features`
    pub centroids: DMatrix<f64>,
    pub labels: Vec<usize>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
}

impl KMeans {
    /// Euclidean distance from each row of `x` to its assigned centroid.
    pub fn distances(&self, x: &DMatrix<f64>) -> Vec<f64> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, &c)| sq_dist(x, i, &self.centroids, c).sqrt())
            .collect()
    }

    /// Number of rows assigned to each cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &c in &self.labels {
            sizes[c] += 1;
        }
        sizes
    }
}

pub fn fit_kmeans(x: &DMatrix<f64>, k: usize, params: &KMeansParams) -> Result<KMeans, AppError> {
    let n = x.nrows();
    if k == 0 || k > n {
        return Err(AppError::data(format!("K-Means needs 1 <= k <= n (k={k}, n={n}).")));
    }
    // k-means++ cannot place k centres on fewer than k distinct points
    let distinct = distinct_rows(x);
    if distinct < k {
        return Err(AppError::data(format!(
            "K-Means (k={k}) needs at least {k} distinct rows, found {distinct}."
        )));
    }

    let records = to_array2(x);
    let dataset = Dataset::new(records, Array1::from_elem(n, ()));
    let tol = (params.tol * mean_variance(x)).max(f64::EPSILON);

    let fitted = LinfaKMeans::params_with_rng(k, StdRng::seed_from_u64(params.seed))
        .n_runs(params.n_init.max(1))
        .max_n_iterations(params.max_iter.max(1) as u64)
        .tolerance(tol)
        .fit(&dataset)
        .map_err(|e| AppError::runtime(format!("K-Means (k={k}) failed: {e}")))?;

    let labels: Vec<usize> = fitted.predict(dataset.records()).into_iter().collect();
    let c = fitted.centroids();
    let centroids = DMatrix::from_fn(c.nrows(), c.ncols(), |i, j| c[[i, j]]);

    let mut model = KMeans {
        k,
        centroids,
        labels,
        inertia: 0.0,
    };
    model.inertia = model.distances(x).iter().map(|d| d * d).sum();
    if !model.inertia.is_finite() {
        return Err(AppError::runtime(format!("K-Means (k={k}) produced a non-finite inertia.")));
    }
    trace!(k, seed = params.seed, inertia = model.inertia, "k-means fitted");
    Ok(model)
}

/// Copy a nalgebra matrix into the ndarray layout linfa expects.
pub fn to_array2(x: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((x.nrows(), x.ncols()), |(i, j)| x[(i, j)])
}

fn distinct_rows(x: &DMatrix<f64>) -> usize {
    let mut rows: Vec<Vec<f64>> = x.row_iter().map(|r| r.iter().copied().collect()).collect();
    let cmp = |a: &Vec<f64>, b: &Vec<f64>| {
        a.iter()
            .zip(b)
            .map(|(u, v)| u.total_cmp(v))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    rows.sort_by(cmp);
    rows.dedup_by(|a, b| cmp(a, b).is_eq());
    rows.len()
}

/// Squared Euclidean distance between row `i` of `x` and row `c` of `centroids`.
fn sq_dist(x: &DMatrix<f64>, i: usize, centroids: &DMatrix<f64>, c: usize) -> f64 {
    let mut acc = 0.0;
    for j in 0..x.ncols() {
        let d = x[(i, j)] - centroids[(c, j)];
        acc += d * d;
    }
    acc
}

fn mean_variance(x: &DMatrix<f64>) -> f64 {
    let n = x.nrows() as f64;
    if x.ncols() == 0 || n == 0.0 {
        return 0.0;
    }
    let total: f64 = x
        .column_iter()
        .map(|col| {
            let m = col.sum() / n;
            col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / x.ncols() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three tight groups around (0,0), (10,0) and (0,10).
    fn three_groups() -> DMatrix<f64> {
        let centres = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let offsets = [(0.1, 0.0), (-0.1, 0.1), (0.0, -0.1), (0.05, 0.05)];
        let mut data = Vec::new();
        for (cx, cy) in centres {
            for (dx, dy) in offsets {
                data.push(cx + dx);
                data.push(cy + dy);
            }
        }
        DMatrix::from_row_slice(12, 2, &data)
    }

    #[test]
    fn recovers_well_separated_groups() {
        let x = three_groups();
        let km = fit_kmeans(&x, 3, &KMeansParams::default()).unwrap();
        assert_eq!(km.cluster_sizes(), vec![4, 4, 4]);
        for g in 0..3 {
            let first = km.labels[g * 4];
            assert!(km.labels[g * 4..g * 4 + 4].iter().all(|&l| l == first));
        }
        assert!(km.inertia < 1.0);
    }

    #[test]
    fn distances_match_inertia() {
        let x = three_groups();
        let km = fit_kmeans(&x, 3, &KMeansParams::default()).unwrap();
        let total: f64 = km.distances(&x).iter().map(|d| d * d).sum();
        assert!((total - km.inertia).abs() < 1e-9);
    }

    #[test]
    fn k_equal_to_n_has_zero_inertia() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 5.0]);
        let km = fit_kmeans(&x, 3, &KMeansParams::default()).unwrap();
        assert!(km.inertia.abs() < 1e-12);
    }

    #[test]
    fn too_few_distinct_rows_is_a_data_error() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 1.0, 1.0, 2.0]);
        let err = fit_kmeans(&x, 3, &KMeansParams::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(fit_kmeans(&x, 2, &KMeansParams::default()).is_ok());
    }

    #[test]
    fn same_seed_gives_same_labels() {
        let x = three_groups();
        let params = KMeansParams { seed: 7, ..KMeansParams::default() };
        let a = fit_kmeans(&x, 3, &params).unwrap();
        let b = fit_kmeans(&x, 3, &params).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn invalid_k_is_rejected() {
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        assert!(fit_kmeans(&x, 0, &KMeansParams::default()).is_err());
        assert!(fit_kmeans(&x, 3, &KMeansParams::default()).is_err());
    }
}
