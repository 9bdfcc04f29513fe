//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - per-row CSV and JSON summary exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
