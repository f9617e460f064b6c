//! Batch evaluation of evacuation scenarios.
//!
//! Wraps [`evacnet_core`] with parallel multi-scenario runs, per-scenario
//! time limits, cache prewarming and JSON reports.

pub mod batch;
pub mod error;
pub mod report;
pub mod warmup;

pub use batch::{BatchOptions, evaluate_area, evaluate_batch};
pub use error::BatchError;
pub use report::{BatchReport, ScenarioOutcome};
pub use warmup::{PrewarmReport, prewarm};

pub use evacnet_core;
