//! Bronze/silver/gold retail data pipeline.
//!
//! Raw landing-zone tables are cleaned by per-table rules into a validated (silver) layer, and
//! four analytical (gold) tables are derived from it, either in process or as SQL handed to a
//! warehouse.

pub mod config;
pub mod constants;
pub mod error;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use lakehouse_core::{PipelineError, Result};
