//! Ready-made pipelines and a runner for them.

pub mod demo;
pub mod kdd;

mod integration_tests;

use crate::config::PipelineConfig;
use crate::context::{ExecutionContext, PipelineContext};
use crate::events::{EventSink, LoggingEventSink};
use crate::observability::{init_tracing, pipeline_span};
use crate::pipeline::{GraphExecutionResult, StageGraph};
use anyhow::{bail, Context};
use std::sync::Arc;
use tracing::{info, Instrument};

/// Installs logging, runs `graph` under `config.pipeline_root` and reports
/// stage events through the log.
///
/// # Errors
///
/// Fails if the pipeline root cannot be created, the graph cannot be
/// scheduled, or any stage fails.
pub async fn run_pipeline(config: &PipelineConfig, graph: &StageGraph) -> anyhow::Result<GraphExecutionResult> {
    init_tracing(&config.log);
    std::fs::create_dir_all(&config.pipeline_root)
        .with_context(|| format!("creating pipeline root {}", config.pipeline_root.display()))?;

    let ctx = Arc::new(
        PipelineContext::new(graph.name(), &config.pipeline_root)
            .with_event_sink(Arc::new(LoggingEventSink::default()) as Arc<dyn EventSink>),
    );
    info!(pipeline = %graph.name(), root = %config.pipeline_root.display(), "Running pipeline");

    let span = pipeline_span(graph.name(), &ctx.pipeline_run_id().to_string());
    let result = graph
        .execute(ctx)
        .instrument(span)
        .await
        .with_context(|| format!("scheduling pipeline '{}'", graph.name()))?;
    if !result.success {
        bail!(
            "pipeline '{}' failed: {}",
            graph.name(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_demo_pipeline() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new().with_pipeline_root(root.path().join("out"));
        let graph = demo::create_pipeline(&config).unwrap();

        let result = run_pipeline(&config, &graph).await.unwrap();
        assert!(result.success);
        assert!(root.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn test_run_reports_stage_failure() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new()
            .with_pipeline_root(root.path().join("out"))
            .with_data_root(root.path().join("missing"));
        let graph = kdd::create_pipeline(&config).unwrap();

        let err = run_pipeline(&config, &graph).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("kdd-pipe"));
        assert!(message.contains("example_gen"));
    }
}
