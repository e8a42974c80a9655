//! Regional climate aggregation and anomaly detection.
//!
//! Raw observation rows are normalized into a [`pipeline::Snapshot`], reduced
//! to regional-monthly means, and compared against per-month historical
//! baselines to rank atypical years, fit annual trends, and locate seasonal
//! extremes. Every analysis is a pure function of the snapshot it is given.

pub mod aggregate;
pub mod baseline;
pub mod config;
pub mod deviation;
pub mod error;
pub mod extremes;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod trend;

pub use error::EngineError;
pub use pipeline::{analyze_variable, Snapshot, VariableAnalysis};
