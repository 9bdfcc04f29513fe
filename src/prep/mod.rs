//! Tabular preprocessing: encoding, scaling, train/test partitioning.

pub mod encode;
pub mod scale;
pub mod split;

pub use encode::*;
pub use scale::*;
pub use split::*;
