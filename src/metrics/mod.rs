//! Evaluation metrics for classifiers and clusterings.

pub mod classification;
pub mod clustering;

pub use classification::*;
pub use clustering::*;
