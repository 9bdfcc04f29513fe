//! Seeded train/test partitioning.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::AppError;

/// Row indices of the two partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition `0..labels.len()` into train/test sets.
///
/// - unstratified: `ceil(n * test_size)` shuffled rows go to test
/// - stratified: each class contributes `round(n_c * test_size)` rows, clamped so a
///   class with at least two rows lands on both sides
pub fn train_test_split(labels: &[u8], test_size: f64, stratify: bool, seed: u64) -> Result<Split, AppError> {
    let n = labels.len();
    if n < 2 {
        return Err(AppError::data(format!("Need at least 2 rows to split, found {n}.")));
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let (mut train, mut test) = if stratify {
        let mut train = Vec::new();
        let mut test = Vec::new();
        for class in [0u8, 1u8] {
            let mut idx: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
            idx.shuffle(&mut rng);
            let n_c = idx.len();
            let mut n_test = (n_c as f64 * test_size).round() as usize;
            if n_c >= 2 {
                n_test = n_test.clamp(1, n_c - 1);
            } else {
                n_test = 0;
            }
            test.extend_from_slice(&idx[..n_test]);
            train.extend_from_slice(&idx[n_test..]);
        }
        (train, test)
    } else {
        let mut idx: Vec<usize> = (0..n).collect();
        idx.shuffle(&mut rng);
        let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
        let train = idx.split_off(n_test);
        (train, idx)
    };

    if train.is_empty() || test.is_empty() {
        return Err(AppError::data("Train/test split left an empty partition."));
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok(Split { train, test })
}
