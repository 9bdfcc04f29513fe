//! Z-score standardisation.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AppError;

/// Per-column mean and population standard deviation.
#[derive(Debug, Clone, Serialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Estimate mean/std from the rows of `x`.
    ///
    /// Columns with zero variance get a scale of 1 so they map to 0 instead of NaN.
    pub fn fit(x: &DMatrix<f64>) -> Result<Self, AppError> {
        let n = x.nrows();
        if n == 0 {
            return Err(AppError::data("Cannot fit a scaler on zero rows."));
        }
        let nf = n as f64;

        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for col in x.column_iter() {
            let m = col.sum() / nf;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / nf;
            let sd = var.sqrt();
            mean.push(m);
            scale.push(if sd > 1e-12 { sd } else { 1.0 });
        }

        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
        if x.ncols() != self.mean.len() {
            return Err(AppError::runtime(format!(
                "Scaler fitted on {} columns, got {}.",
                self.mean.len(),
                x.ncols()
            )));
        }
        let mut out = x.clone();
        for (j, mut col) in out.column_iter_mut().enumerate() {
            col.add_scalar_mut(-self.mean[j]);
            col /= self.scale[j];
        }
        Ok(out)
    }

    pub fn fit_transform(x: &DMatrix<f64>) -> Result<(Self, DMatrix<f64>), AppError> {
        let scaler = Self::fit(x)?;
        let out = scaler.transform(x)?;
        Ok((scaler, out))
    }
}
