//! Clustering quality and distance statistics.

use linfa::DatasetBase;
use linfa::metrics::SilhouetteScore;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;

/// Mean silhouette coefficient (Euclidean), computed by linfa.
///
/// When `sample_size > 0` and fewer than `n` rows, a seeded random subset of
/// rows is scored instead of all of them.
///
/// Returns `None` unless `2 <= n_clusters <= n - 1` on the scored rows.
pub fn silhouette_score(
    x: &DMatrix<f64>,
    labels: &[usize],
    sample_size: usize,
    seed: u64,
) -> Option<f64> {
    let n = x.nrows();
    let rows: Vec<usize> = if sample_size > 0 && sample_size < n {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut idx = sample(&mut rng, n, sample_size).into_vec();
        idx.sort_unstable();
        idx
    } else {
        (0..n).collect()
    };

    let mut occupied: Vec<usize> = rows.iter().map(|&r| labels[r]).collect();
    occupied.sort_unstable();
    occupied.dedup();
    if occupied.len() < 2 || occupied.len() > rows.len() - 1 {
        return None;
    }

    let records = Array2::from_shape_fn((rows.len(), x.ncols()), |(i, j)| x[(rows[i], j)]);
    let targets: Array1<usize> = rows.iter().map(|&r| labels[r]).collect();
    let score = DatasetBase::new(records, targets).silhouette_score().ok()?;
    score.is_finite().then_some(score)
}

/// `q`-th percentile (0..=100) with linear interpolation between order statistics.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !q.is_finite() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
