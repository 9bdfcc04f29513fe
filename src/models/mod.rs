//! Model implementations: three binary classifiers and K-Means.
//!
//! Every model is fit on an `nalgebra::DMatrix<f64>` (rows = samples) and is
//! deterministic for a given seed.

pub mod forest;
pub mod kmeans;
pub mod mlp;
pub mod model;
pub mod tree;

pub use forest::{ForestParams, RandomForest};
pub use kmeans::{KMeans, KMeansParams, fit_kmeans};
pub use mlp::{Mlp, MlpParams};
pub use model::*;
pub use tree::{DecisionTree, TreeParams};
