//! Bronze → silver → gold pipeline: rule-driven cleaning, then layered aggregation.

pub mod aggregator;
pub mod cleaner;
pub mod context;
pub mod orchestrator;
pub mod steps;

pub use context::RunContext;
pub use orchestrator::{PipelineExecutionResult, PipelineOrchestrator};
pub use steps::{CleanStep, DeriveStep, PipelineStep, StepResult};
