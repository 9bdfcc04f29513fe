//! Domain types used throughout the pipelines.
//!
//! This module defines:
//!
//! - data source and column-handling settings (`DataSource`, `PrepConfig`)
//! - classifier selection enums (`ModelSpec`, `ClassifierKind`)
//! - per-command run configurations (`ClassifyConfig`, `ClusterConfig`)

pub mod types;

pub use types::*;
