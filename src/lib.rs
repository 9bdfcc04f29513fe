//! `risk-screen` library crate.
//!
//! The binary (`risk`) is a thin wrapper around this library so that the
//! pipelines are testable without spawning processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod metrics;
pub mod models;
pub mod plot;
pub mod prep;
pub mod report;
