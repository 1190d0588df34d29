//! A single-stage pipeline for checking an installation.

use crate::components::DemoStage;
use crate::config::PipelineConfig;
use crate::core::StageKind;
use crate::errors::Result;
use crate::pipeline::{PipelineBuilder, StageGraph, StageSpec};
use serde_json::json;
use std::sync::Arc;

/// Name of the demo pipeline.
pub const DEMO_PIPELINE: &str = "demo-pipe";

/// Builds a pipeline with one file-loader slot run by [`DemoStage`] on the
/// `train` split.
///
/// # Errors
///
/// Returns an error for an invalid configuration.
pub fn create_pipeline(config: &PipelineConfig) -> Result<StageGraph> {
    config.validate()?;
    let graph = PipelineBuilder::new(DEMO_PIPELINE)
        .with_stage(
            StageSpec::new("file_loader", Arc::new(DemoStage::new("file_loader")))
                .with_kind(StageKind::Ingest)
                .with_param("split", json!("train")),
        )?
        .build()?;
    Ok(graph)
}
