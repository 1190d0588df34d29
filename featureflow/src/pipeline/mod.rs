//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications
//! - A pipeline builder with dependency and cycle validation
//! - The DAG executor

mod builder;
mod dag;
mod spec;

pub use builder::PipelineBuilder;
pub use dag::{GraphExecutionResult, StageGraph};
pub use spec::StageSpec;
