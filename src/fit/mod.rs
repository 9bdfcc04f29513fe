//! Selection and scoring on top of the fitted models.
//!
//! - compare classifiers on held-out rows
//! - sweep k for K-Means by silhouette
//! - flag rows far from their centroid

pub mod anomaly;
pub mod selection;

pub use anomaly::*;
pub use selection::*;
