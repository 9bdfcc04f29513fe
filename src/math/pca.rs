//! Two-component PCA for plotting.
//!
//! The centred data matrix is decomposed with SVD; the right singular vectors
//! with the two largest singular values are the projection axes. Each axis is
//! sign-normalised so its largest-magnitude loading is positive, which keeps
//! the plot orientation stable across runs.

use nalgebra::DMatrix;

use crate::error::AppError;

/// Rows projected onto the first two principal components.
#[derive(Debug, Clone)]
pub struct Projection {
    /// `n x 2`
    pub coords: DMatrix<f64>,
    /// Share of total variance carried by each component.
    pub explained_variance_ratio: [f64; 2],
}

pub fn project_2d(x: &DMatrix<f64>) -> Result<Projection, AppError> {
    let (n, d) = x.shape();
    if n < 2 || d == 0 {
        return Err(AppError::data(format!(
            "PCA needs at least 2 rows and 1 column (got {n}x{d})."
        )));
    }

    let mut centred = x.clone();
    for j in 0..d {
        let mean = x.column(j).mean();
        centred.column_mut(j).add_scalar_mut(-mean);
    }

    let svd = centred.clone().svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| AppError::runtime("SVD did not return right singular vectors."))?;

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    let total: f64 = svd.singular_values.iter().map(|s| s * s).sum();
    let mut coords = DMatrix::zeros(n, 2);
    let mut ratio = [0.0; 2];

    for (slot, &comp) in order.iter().take(2).enumerate() {
        let mut axis = v_t.row(comp).transpose();
        let pivot = axis.iter().copied().fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            axis.neg_mut();
        }
        coords.set_column(slot, &(&centred * axis));
        let s = svd.singular_values[comp];
        ratio[slot] = if total > 0.0 { s * s / total } else { 0.0 };
    }

    if coords.iter().any(|v| !v.is_finite()) {
        return Err(AppError::runtime("PCA produced non-finite coordinates."));
    }

    Ok(Projection {
        coords,
        explained_variance_ratio: ratio,
    })
}
