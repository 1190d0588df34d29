//! Context management for pipeline execution.
//!
//! This module provides:
//! - The pipeline-wide context (run id, artifact root, event sink, cancellation)
//! - The per-stage context (inputs from dependencies, execution parameters)

mod execution;
mod inputs;

pub use execution::{ExecutionContext, PipelineContext, StageContext};
pub use inputs::{StageData, StageInputs};
