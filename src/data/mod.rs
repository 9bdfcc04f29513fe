//! Dataset sources (local file or HTTP).

pub mod source;

pub use source::*;
