//! CART decision tree for binary classification.
//!
//! Splits minimise weighted Gini impurity. Candidate thresholds are midpoints
//! between consecutive distinct values of a feature, found with one sorted sweep
//! per feature. Leaves store the (weighted) fraction of positive samples, which
//! doubles as the predicted probability.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Smallest impurity decrease accepted as a split.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (root = depth 0); `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split; `None` considers all of them.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        proba: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    root: Option<Node>,
    n_features: usize,
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(params: TreeParams) -> Self {
        Self {
            params,
            root: None,
            n_features: 0,
            importances: Vec::new(),
        }
    }

    /// Fit on all rows of `x`.
    pub fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: Option<&[f64]>) -> Result<(), AppError> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let ones;
        let weights = match weights {
            Some(w) => w,
            None => {
                ones = vec![1.0; x.nrows()];
                &ones
            }
        };
        self.fit_rows(x, y, weights, &rows)
    }

    /// Fit on a subset of rows (repeats allowed, as in a bootstrap sample).
    pub fn fit_rows(&mut self, x: &DMatrix<f64>, y: &[u8], weights: &[f64], rows: &[usize]) -> Result<(), AppError> {
        if y.len() != x.nrows() || weights.len() != x.nrows() {
            return Err(AppError::runtime(format!(
                "Tree input size mismatch: x has {} rows, y {}, weights {}.",
                x.nrows(),
                y.len(),
                weights.len()
            )));
        }
        if rows.is_empty() {
            return Err(AppError::data("Cannot fit a decision tree on zero rows."));
        }

        let mut builder = Builder {
            x,
            y,
            w: weights,
            params: &self.params,
            rng: StdRng::seed_from_u64(self.params.seed),
            importances: vec![0.0; x.ncols()],
        };
        let root = builder.build(rows.to_vec(), 0);

        let mut importances = builder.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.root = Some(root);
        self.n_features = x.ncols();
        self.importances = importances;
        Ok(())
    }

    /// Probability of the positive class for each row of `x`.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| AppError::runtime("Decision tree used before fit."))?;
        if x.ncols() != self.n_features {
            return Err(AppError::runtime(format!(
                "Decision tree fitted on {} features, got {}.",
                self.n_features,
                x.ncols()
            )));
        }
        Ok((0..x.nrows()).map(|i| predict_row(root, x, i)).collect())
    }

    /// Normalised impurity-decrease importances (sum to 1 unless the tree is a stump).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map(Node::depth).unwrap_or(0)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map(Node::n_leaves).unwrap_or(0)
    }
}

fn predict_row(mut node: &Node, x: &DMatrix<f64>, i: usize) -> f64 {
    loop {
        match node {
            Node::Leaf { proba, .. } => return *proba,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                node = if x[(i, *feature)] <= *threshold { left } else { right };
            }
        }
    }
}

struct Builder<'a> {
    x: &'a DMatrix<f64>,
    y: &'a [u8],
    w: &'a [f64],
    params: &'a TreeParams,
    rng: StdRng,
    importances: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Builder<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let (w_total, w_pos) = self.weight_sums(&rows);
        let proba = if w_total > 0.0 { w_pos / w_total } else { 0.0 };
        let leaf = Node::Leaf {
            proba,
            n_samples: rows.len(),
        };

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || rows.len() < self.params.min_samples_split
            || rows.len() < 2 * self.params.min_samples_leaf
            || gini(w_pos, w_total) <= MIN_GAIN
        {
            return leaf;
        }

        let Some(best) = self.find_split(&rows, w_total, w_pos) else {
            return leaf;
        };
        self.importances[best.feature] += best.gain;

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[(r, best.feature)] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    fn weight_sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(t, p), &r| {
            let w = self.w[r];
            (t + w, if self.y[r] == 1 { p + w } else { p })
        })
    }

    fn find_split(&mut self, rows: &[usize], w_total: f64, w_pos: f64) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(m) = self.params.max_features {
            if m < n_features {
                features.shuffle(&mut self.rng);
                features.truncate(m.max(1));
            }
        }

        let parent = w_total * gini(w_pos, w_total);
        let min_leaf = self.params.min_samples_leaf;
        let n = rows.len();
        let mut best: Option<BestSplit> = None;
        let mut sorted: Vec<(f64, usize)> = Vec::with_capacity(n);

        for &f in &features {
            sorted.clear();
            sorted.extend(rows.iter().map(|&r| (self.x[(r, f)], r)));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut wl = 0.0;
            let mut wl_pos = 0.0;
            for i in 0..n.saturating_sub(1) {
                let (v, r) = sorted[i];
                wl += self.w[r];
                if self.y[r] == 1 {
                    wl_pos += self.w[r];
                }

                let next = sorted[i + 1].0;
                if next <= v {
                    continue;
                }
                let n_left = i + 1;
                if n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }

                let wr = w_total - wl;
                let wr_pos = w_pos - wl_pos;
                let child = wl * gini(wl_pos, wl) + wr * gini(wr_pos, wr);
                let gain = parent - child;
                if gain > MIN_GAIN && best.as_ref().is_none_or(|b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature: f,
                        threshold: 0.5 * (v + next),
                        gain,
                    });
                }
            }
        }

        best
    }
}

/// Gini impurity of a weighted binary node.
fn gini(w_pos: f64, w_total: f64) -> f64 {
    if w_total <= 0.0 {
        return 0.0;
    }
    let p = w_pos / w_total;
    2.0 * p * (1.0 - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrant() -> (DMatrix<f64>, Vec<u8>) {
        // label = (a > 0.5) and (b > 0.5)
        let pts = [
            (0.1, 0.1, 0),
            (0.2, 0.9, 0),
            (0.9, 0.2, 0),
            (0.8, 0.8, 1),
            (0.3, 0.2, 0),
            (0.1, 0.7, 0),
            (0.7, 0.6, 1),
            (0.9, 0.9, 1),
        ];
        let mut data = Vec::new();
        let mut y = Vec::new();
        for (a, b, l) in pts {
            data.push(a);
            data.push(b);
            y.push(l);
        }
        (DMatrix::from_row_slice(pts.len(), 2, &data), y)
    }

    #[test]
    fn fits_training_data_perfectly_when_unconstrained() {
        let (x, y) = quadrant();
        let mut tree = DecisionTree::new(TreeParams::default());
        tree.fit(&x, &y, None).unwrap();
        let p = tree.predict_proba(&x).unwrap();
        for (pi, &yi) in p.iter().zip(&y) {
            assert_eq!(*pi, f64::from(yi));
        }
        assert!(tree.depth() >= 1);
        assert!(tree.n_leaves() >= 2);
    }

    #[test]
    fn max_depth_limits_growth() {
        let (x, y) = quadrant();
        let mut tree = DecisionTree::new(TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        });
        tree.fit(&x, &y, None).unwrap();
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn threshold_is_midpoint_and_importance_is_normalised() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0, 5.0]);
        let y = [0, 0, 1, 1];
        let mut tree = DecisionTree::new(TreeParams::default());
        tree.fit(&x, &y, None).unwrap();

        let probe = DMatrix::from_row_slice(2, 2, &[2.49, 0.0, 2.51, 0.0]);
        assert_eq!(tree.predict_proba(&probe).unwrap(), vec![0.0, 1.0]);
        assert_eq!(tree.feature_importances(), &[1.0, 0.0]);
    }

    #[test]
    fn min_samples_leaf_yields_probabilities() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let y = [0, 1, 1, 1];
        let mut tree = DecisionTree::new(TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::default()
        });
        tree.fit(&x, &y, None).unwrap();
        let p = tree.predict_proba(&x).unwrap();
        assert_eq!(p, vec![0.5, 0.5, 1.0, 1.0]);
    }

    #[test]
    fn sample_weights_shift_leaf_probability() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 1.0, 1.0]);
        let y = [0, 0, 1];
        let mut tree = DecisionTree::new(TreeParams::default());
        tree.fit(&x, &y, Some(&[1.0, 1.0, 2.0])).unwrap();
        let p = tree.predict_proba(&x).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn predict_before_fit_is_an_error() {
        let tree = DecisionTree::new(TreeParams::default());
        assert!(tree.predict_proba(&DMatrix::zeros(1, 1)).is_err());
    }
}
