//! Random forest: bagged decision trees with per-split feature subsampling.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{DecisionTree, TreeParams};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub bootstrap: bool,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Features sampled per split; `None` means `ceil(sqrt(n_features))`.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            bootstrap: true,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
    oob_accuracy: Option<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            importances: Vec::new(),
            oob_accuracy: None,
        }
    }

    /// Train all trees in parallel. Tree `i` uses seed `seed + i` for both its
    /// bootstrap sample and its feature subsampling.
    pub fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: Option<&[f64]>) -> Result<(), AppError> {
        let n = x.nrows();
        if n == 0 {
            return Err(AppError::data("Cannot fit a random forest on zero rows."));
        }
        if y.len() != n {
            return Err(AppError::runtime("Random forest: label count does not match rows."));
        }
        let weights: Vec<f64> = weights.map(<[f64]>::to_vec).unwrap_or_else(|| vec![1.0; n]);
        let max_features = self
            .params
            .max_features
            .unwrap_or_else(|| (x.ncols() as f64).sqrt().ceil() as usize)
            .max(1);

        let fitted: Vec<(DecisionTree, Vec<bool>)> = (0..self.params.n_trees)
            .into_par_iter()
            .map(|i| -> Result<(DecisionTree, Vec<bool>), AppError> {
                let seed = self.params.seed.wrapping_add(i as u64);
                let rows: Vec<usize> = if self.params.bootstrap {
                    let mut rng = StdRng::seed_from_u64(seed);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut in_bag = vec![false; n];
                for &r in &rows {
                    in_bag[r] = true;
                }

                let mut tree = DecisionTree::new(TreeParams {
                    max_depth: self.params.max_depth,
                    min_samples_split: 2,
                    min_samples_leaf: self.params.min_samples_leaf,
                    max_features: Some(max_features),
                    seed,
                });
                tree.fit_rows(x, y, &weights, &rows)?;
                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        self.oob_accuracy = if self.params.bootstrap {
            oob_accuracy(&fitted, x, y)?
        } else {
            None
        };

        let mut importances = vec![0.0; x.ncols()];
        for (tree, _) in &fitted {
            for (acc, v) in importances.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.trees = fitted.into_iter().map(|(t, _)| t).collect();
        self.importances = importances;
        debug!(trees = self.trees.len(), oob = ?self.oob_accuracy, "random forest fitted");
        Ok(())
    }

    /// Mean of the per-tree positive-class probabilities.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        if self.trees.is_empty() {
            return Err(AppError::runtime("Random forest used before fit."));
        }
        let per_tree: Vec<Vec<f64>> = self
            .trees
            .par_iter()
            .map(|t| t.predict_proba(x))
            .collect::<Result<Vec<_>, AppError>>()?;

        let k = per_tree.len() as f64;
        let mut out = vec![0.0; x.nrows()];
        for probs in &per_tree {
            for (o, p) in out.iter_mut().zip(probs) {
                *o += p;
            }
        }
        out.iter_mut().for_each(|v| *v /= k);
        Ok(out)
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Out-of-bag accuracy (bootstrap only; `None` if no row was ever out of bag).
    pub fn oob_accuracy(&self) -> Option<f64> {
        self.oob_accuracy
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn oob_accuracy(fitted: &[(DecisionTree, Vec<bool>)], x: &DMatrix<f64>, y: &[u8]) -> Result<Option<f64>, AppError> {
    let n = x.nrows();
    let mut sums = vec![0.0; n];
    let mut votes = vec![0usize; n];
    for (tree, in_bag) in fitted {
        let probs = tree.predict_proba(x)?;
        for i in 0..n {
            if !in_bag[i] {
                sums[i] += probs[i];
                votes[i] += 1;
            }
        }
    }

    let mut correct = 0usize;
    let mut total = 0usize;
    for i in 0..n {
        if votes[i] == 0 {
            continue;
        }
        let pred = u8::from(sums[i] / votes[i] as f64 >= 0.5);
        if pred == y[i] {
            correct += 1;
        }
        total += 1;
    }
    Ok((total > 0).then(|| correct as f64 / total as f64))
}
