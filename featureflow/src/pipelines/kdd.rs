//! The KDD Cup 99 preprocessing pipeline.
//!
//! ```text
//! example_gen ─┬─> statistics ──> example_validator
//!              └─> transform ───> trainer
//! ```

use crate::components::{
    CsvExampleGenStage, ExampleValidatorStage, StatisticsStage, TrainerInputStage, TransformStage,
};
use crate::config::PipelineConfig;
use crate::core::StageKind;
use crate::errors::Result;
use crate::pipeline::{PipelineBuilder, StageGraph, StageSpec};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Name of the CSV ingestion stage.
pub const EXAMPLE_GEN: &str = "example_gen";
/// Name of the statistics stage.
pub const STATISTICS: &str = "statistics";
/// Name of the validation stage.
pub const EXAMPLE_VALIDATOR: &str = "example_validator";
/// Name of the transform stage.
pub const TRANSFORM: &str = "transform";
/// Name of the training input stage.
pub const TRAINER: &str = "trainer";

/// The CSV the pipeline ingests: `<data_root>/kddcup.csv`.
#[must_use]
pub fn input_csv(config: &PipelineConfig) -> PathBuf {
    config.data_root.join("kddcup.csv")
}

/// Builds the KDD pipeline from `config`.
///
/// # Errors
///
/// Returns `InvalidConfig` or `InvalidSchema` for a bad configuration and a
/// validation error if the graph cannot be built.
pub fn create_pipeline(config: &PipelineConfig) -> Result<StageGraph> {
    config.validate()?;
    let schema = Arc::new(config.schema.clone());

    let example_gen = CsvExampleGenStage::new(EXAMPLE_GEN, Arc::clone(&schema))
        .with_split_buckets(config.train_buckets, config.eval_buckets);
    let trainer = TrainerInputStage::new(TRAINER, TRANSFORM, config.batch_size)
        .with_steps(config.train_steps, config.eval_steps);

    let graph = PipelineBuilder::new(&config.pipeline_name)
        .with_stage(
            StageSpec::new(EXAMPLE_GEN, Arc::new(example_gen))
                .with_kind(StageKind::Ingest)
                .with_param("input_csv", json!(input_csv(config).display().to_string())),
        )?
        .with_stage(
            StageSpec::new(STATISTICS, Arc::new(StatisticsStage::new(STATISTICS, EXAMPLE_GEN)))
                .with_dependency(EXAMPLE_GEN)
                .with_kind(StageKind::Analyze),
        )?
        .with_stage(
            StageSpec::new(
                EXAMPLE_VALIDATOR,
                Arc::new(ExampleValidatorStage::new(EXAMPLE_VALIDATOR, STATISTICS, Arc::clone(&schema))),
            )
            .with_dependency(STATISTICS)
            .with_kind(StageKind::Validate),
        )?
        .with_stage(
            StageSpec::new(TRANSFORM, Arc::new(TransformStage::new(TRANSFORM, EXAMPLE_GEN, schema)))
                .with_dependency(EXAMPLE_GEN)
                .with_kind(StageKind::Transform),
        )?
        .with_stage(
            StageSpec::new(TRAINER, Arc::new(trainer))
                .with_dependency(TRANSFORM)
                .with_kind(StageKind::Train),
        )?
        .build()?;

    debug!(pipeline = %graph.name(), stages = graph.stage_count(), "Created KDD pipeline");
    Ok(graph)
}
