//! Small feed-forward network for binary classification.
//!
//! Architecture: `input -> [dense + ReLU]* -> dense + sigmoid`.
//! Objective: (sample-weighted) binary cross-entropy plus an L2 penalty
//! `alpha / (2 * batch) * sum(W^2)`, minimised with Adam over shuffled mini-batches.

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const PROBA_CLIP: f64 = 1e-15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpParams {
    /// Hidden layer widths, input side first.
    pub hidden: Vec<usize>,
    pub epochs: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// L2 penalty strength.
    pub alpha: f64,
    /// Minimum epoch-loss improvement that resets the patience counter.
    pub tol: f64,
    /// Epochs without improvement before stopping early.
    pub n_iter_no_change: usize,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            hidden: vec![16, 8],
            epochs: 200,
            learning_rate: 1e-3,
            batch_size: 200,
            alpha: 1e-4,
            tol: 1e-4,
            n_iter_no_change: 10,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
struct Dense {
    /// `fan_in x fan_out`
    w: DMatrix<f64>,
    b: DVector<f64>,
}

impl Dense {
    fn affine(&self, a: &DMatrix<f64>) -> DMatrix<f64> {
        let mut z = a * &self.w;
        for (j, mut col) in z.column_iter_mut().enumerate() {
            col.add_scalar_mut(self.b[j]);
        }
        z
    }
}

/// Adam first/second moment estimates for one layer.
#[derive(Debug, Clone)]
struct Moments {
    mw: DMatrix<f64>,
    vw: DMatrix<f64>,
    mb: DVector<f64>,
    vb: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct Mlp {
    params: MlpParams,
    layers: Vec<Dense>,
    loss_curve: Vec<f64>,
}

impl Mlp {
    pub fn new(params: MlpParams) -> Self {
        Self {
            params,
            layers: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    pub fn fit(&mut self, x: &DMatrix<f64>, y: &[u8], weights: Option<&[f64]>) -> Result<(), AppError> {
        let n = x.nrows();
        if n == 0 {
            return Err(AppError::data("Cannot fit a neural network on zero rows."));
        }
        if y.len() != n || weights.is_some_and(|w| w.len() != n) {
            return Err(AppError::runtime("Neural network: label/weight count does not match rows."));
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.layers = init_layers(x.ncols(), &self.params.hidden, &mut rng);
        let mut moments: Vec<Moments> = self
            .layers
            .iter()
            .map(|l| Moments {
                mw: DMatrix::zeros(l.w.nrows(), l.w.ncols()),
                vw: DMatrix::zeros(l.w.nrows(), l.w.ncols()),
                mb: DVector::zeros(l.b.len()),
                vb: DVector::zeros(l.b.len()),
            })
            .collect();

        let targets = DVector::from_iterator(n, y.iter().map(|&v| f64::from(v)));
        let sample_w = match weights {
            Some(w) => DVector::from_row_slice(w),
            None => DVector::from_element(n, 1.0),
        };

        let batch = self.params.batch_size.clamp(1, n);
        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 0i32;
        let mut best_loss = f64::INFINITY;
        let mut stall = 0usize;
        self.loss_curve.clear();

        for epoch in 0..self.params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for chunk in order.chunks(batch) {
                let xb = x.select_rows(chunk.iter());
                let yb = targets.select_rows(chunk.iter());
                let wb = sample_w.select_rows(chunk.iter());

                step += 1;
                let loss = self.train_step(&xb, &yb, &wb, &mut moments, step);
                epoch_loss += loss * chunk.len() as f64;
            }

            let epoch_loss = epoch_loss / n as f64;
            if !epoch_loss.is_finite() {
                return Err(AppError::runtime(format!(
                    "Neural network diverged at epoch {epoch} (non-finite loss)."
                )));
            }
            self.loss_curve.push(epoch_loss);

            if epoch_loss > best_loss - self.params.tol {
                stall += 1;
            } else {
                stall = 0;
            }
            best_loss = best_loss.min(epoch_loss);
            if stall >= self.params.n_iter_no_change {
                debug!(epoch, loss = epoch_loss, "neural network converged");
                break;
            }
        }

        debug!(epochs = self.loss_curve.len(), loss = ?self.loss_curve.last(), "neural network fitted");
        Ok(())
    }

    /// One forward/backward pass and Adam update; returns the batch loss.
    fn train_step(
        &mut self,
        xb: &DMatrix<f64>,
        yb: &DVector<f64>,
        wb: &DVector<f64>,
        moments: &mut [Moments],
        step: i32,
    ) -> f64 {
        let m = xb.nrows() as f64;
        let w_sum = wb.sum().max(f64::MIN_POSITIVE);

        // activations[0] = input, activations[l + 1] = output of layer l
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(xb.clone());
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.affine(&activations[l]);
            activations.push(if l == last { z.map(sigmoid) } else { z.map(relu) });
        }

        let p = activations[last + 1].column(0).clone_owned();
        let mut loss = 0.0;
        for i in 0..p.len() {
            let pi = p[i].clamp(PROBA_CLIP, 1.0 - PROBA_CLIP);
            loss -= wb[i] * (yb[i] * pi.ln() + (1.0 - yb[i]) * (1.0 - pi).ln());
        }
        loss /= w_sum;
        let l2: f64 = self.layers.iter().map(|l| l.w.norm_squared()).sum();
        loss += 0.5 * self.params.alpha * l2 / m;

        // sigmoid + cross-entropy gradient w.r.t. the output pre-activation
        let mut delta = DMatrix::from_fn(p.len(), 1, |i, _| wb[i] * (p[i] - yb[i]) / w_sum);

        let lr_t = self.params.learning_rate * (1.0 - BETA2.powi(step)).sqrt() / (1.0 - BETA1.powi(step));
        for l in (0..self.layers.len()).rev() {
            let grad_w = activations[l].transpose() * &delta + &self.layers[l].w * (self.params.alpha / m);
            let grad_b = delta.row_sum().transpose();

            if l > 0 {
                let back = &delta * self.layers[l].w.transpose();
                delta = back.zip_map(&activations[l], |g, a| if a > 0.0 { g } else { 0.0 });
            }

            let mo = &mut moments[l];
            mo.mw = &mo.mw * BETA1 + &grad_w * (1.0 - BETA1);
            mo.vw = &mo.vw * BETA2 + grad_w.map(|g| g * g) * (1.0 - BETA2);
            mo.mb = &mo.mb * BETA1 + &grad_b * (1.0 - BETA1);
            mo.vb = &mo.vb * BETA2 + grad_b.map(|g| g * g) * (1.0 - BETA2);

            let layer = &mut self.layers[l];
            layer.w -= mo.mw.zip_map(&mo.vw, |g, v| lr_t * g / (v.sqrt() + ADAM_EPS));
            layer.b -= mo.mb.zip_map(&mo.vb, |g, v| lr_t * g / (v.sqrt() + ADAM_EPS));
        }

        loss
    }

    /// Probability of the positive class for each row of `x`.
    pub fn predict_proba(&self, x: &DMatrix<f64>) -> Result<Vec<f64>, AppError> {
        let Some(first) = self.layers.first() else {
            return Err(AppError::runtime("Neural network used before fit."));
        };
        if x.ncols() != first.w.nrows() {
            return Err(AppError::runtime(format!(
                "Neural network fitted on {} features, got {}.",
                first.w.nrows(),
                x.ncols()
            )));
        }

        let last = self.layers.len() - 1;
        let mut a = x.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            let z = layer.affine(&a);
            a = if l == last { z.map(sigmoid) } else { z.map(relu) };
        }
        Ok(a.column(0).iter().copied().collect())
    }

    /// Mean training loss per completed epoch.
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }
}

/// Glorot-uniform weights, zero biases. The sigmoid output layer uses the
/// wider bound `sqrt(2)` times larger.
fn init_layers(n_inputs: usize, hidden: &[usize], rng: &mut StdRng) -> Vec<Dense> {
    let mut sizes = Vec::with_capacity(hidden.len() + 2);
    sizes.push(n_inputs);
    sizes.extend_from_slice(hidden);
    sizes.push(1);

    let n_layers = sizes.len() - 1;
    sizes
        .windows(2)
        .enumerate()
        .map(|(l, pair)| {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let factor = if l + 1 == n_layers { 2.0 } else { 6.0 };
            let bound = (factor / (fan_in + fan_out) as f64).sqrt();
            let dist = Uniform::new_inclusive(-bound, bound);
            Dense {
                w: DMatrix::from_fn(fan_in, fan_out, |_, _| dist.sample(rng)),
                b: DVector::zeros(fan_out),
            }
        })
        .collect()
}

fn relu(v: f64) -> f64 {
    v.max(0.0)
}

fn sigmoid(v: f64) -> f64 {
    if v >= 0.0 {
        1.0 / (1.0 + (-v).exp())
    } else {
        let e = v.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs(n: usize) -> (DMatrix<f64>, Vec<u8>) {
        let mut data = Vec::with_capacity(n * 2);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let jitter = ((i * 37) % 11) as f64 / 11.0 - 0.5;
            if i % 2 == 0 {
                data.extend_from_slice(&[-1.5 + 0.3 * jitter, -1.0 - 0.3 * jitter]);
                y.push(0);
            } else {
                data.extend_from_slice(&[1.5 + 0.3 * jitter, 1.0 + 0.3 * jitter]);
                y.push(1);
            }
        }
        (DMatrix::from_row_slice(n, 2, &data), y)
    }

    #[test]
    fn separates_two_blobs() {
        let (x, y) = two_blobs(120);
        let mut net = Mlp::new(MlpParams {
            hidden: vec![8],
            epochs: 300,
            learning_rate: 0.01,
            batch_size: 32,
            ..MlpParams::default()
        });
        net.fit(&x, &y, None).unwrap();

        let p = net.predict_proba(&x).unwrap();
        let correct = p.iter().zip(&y).filter(|(p, y)| u8::from(**p >= 0.5) == **y).count();
        assert_eq!(correct, y.len());

        let curve = net.loss_curve();
        assert!(curve.last().unwrap() < curve.first().unwrap());
    }

    #[test]
    fn stops_after_n_iter_no_change_stalled_epochs() {
        let (x, y) = two_blobs(40);
        // no epoch can beat the best loss by this much, so only the first counts as progress
        let mut net = Mlp::new(MlpParams {
            epochs: 500,
            tol: 1e9,
            ..MlpParams::default()
        });
        net.fit(&x, &y, None).unwrap();
        assert_eq!(net.loss_curve().len(), 1 + net.params.n_iter_no_change);
    }

    #[test]
    fn easy_problem_stops_before_the_epoch_limit() {
        let (x, y) = two_blobs(80);
        let mut net = Mlp::new(MlpParams {
            hidden: vec![8],
            epochs: 5000,
            learning_rate: 0.01,
            batch_size: 16,
            tol: 1e-3,
            ..MlpParams::default()
        });
        net.fit(&x, &y, None).unwrap();
        assert!(net.loss_curve().len() < 5000);
        let p = net.predict_proba(&x).unwrap();
        assert!(p.iter().zip(&y).all(|(p, y)| u8::from(*p >= 0.5) == *y));
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let (x, y) = two_blobs(40);
        let params = MlpParams {
            epochs: 20,
            ..MlpParams::default()
        };
        let mut a = Mlp::new(params.clone());
        let mut b = Mlp::new(params);
        a.fit(&x, &y, None).unwrap();
        b.fit(&x, &y, None).unwrap();
        assert_eq!(a.predict_proba(&x).unwrap(), b.predict_proba(&x).unwrap());
    }

    #[test]
    fn probabilities_are_in_unit_interval() {
        let (x, y) = two_blobs(30);
        let mut net = Mlp::new(MlpParams {
            epochs: 5,
            ..MlpParams::default()
        });
        let weights = vec![2.0; 30];
        net.fit(&x, &y, Some(weights.as_slice())).unwrap();
        assert!(net.predict_proba(&x).unwrap().iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn sigmoid_is_stable_for_large_inputs() {
        assert_eq!(sigmoid(1000.0), 1.0);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn feature_count_mismatch_is_an_error() {
        let (x, y) = two_blobs(10);
        let mut net = Mlp::new(MlpParams {
            epochs: 1,
            ..MlpParams::default()
        });
        net.fit(&x, &y, None).unwrap();
        assert!(net.predict_proba(&DMatrix::zeros(2, 3)).is_err());
    }
}
