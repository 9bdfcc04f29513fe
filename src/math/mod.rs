//! Linear-algebra helpers.

pub mod pca;

pub use pca::*;
