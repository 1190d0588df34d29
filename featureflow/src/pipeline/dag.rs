//! DAG execution engine.
//!
//! Stages start as soon as all of their dependencies have completed, each
//! on its own tokio task.

use super::StageSpec;
use crate::context::{ExecutionContext, PipelineContext, StageContext, StageData, StageInputs};
use crate::core::{StageOutput, StageStatus};
use crate::errors::{FeatureflowError, Result};
use crate::events::PipelineEvent;
use crate::observability::{stage_span, SpanTimer};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

/// Result of executing a stage graph.
#[derive(Debug)]
pub struct GraphExecutionResult {
    /// Outputs of every stage that finished.
    pub outputs: HashMap<String, StageOutput>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// True if every stage succeeded.
    pub success: bool,
    /// Why the run stopped early, if it did.
    pub error: Option<String>,
}

impl GraphExecutionResult {
    /// Output of one stage.
    #[must_use]
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.get(stage)
    }
}

/// A validated, executable pipeline.
#[derive(Debug)]
pub struct StageGraph {
    name: String,
    stages: HashMap<String, StageSpec>,
    execution_order: Vec<String>,
}

type StageTask = JoinHandle<(String, StageOutput)>;

impl StageGraph {
    /// Creates a graph; `stage_order` is the insertion order used to break ties.
    #[must_use]
    pub fn new(name: String, stages: HashMap<String, StageSpec>, stage_order: Vec<String>) -> Self {
        let execution_order = topological_sort(&stages, &stage_order);
        Self {
            name,
            stages,
            execution_order,
        }
    }

    /// The pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// A topological order of the stages.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Runs the pipeline to completion, to the first failed stage, or until
    /// `ctx` is cancelled.
    ///
    /// A failed stage is reported in the result, not as an `Err`.
    ///
    /// # Errors
    ///
    /// Returns `StageExecution` if a stage task panics or the graph cannot
    /// make progress.
    pub async fn execute(&self, ctx: Arc<PipelineContext>) -> Result<GraphExecutionResult> {
        let timer = SpanTimer::start(&self.name);
        info!(
            pipeline = %self.name,
            run_id = %ctx.pipeline_run_id(),
            stages = self.stages.len(),
            "Pipeline started"
        );

        let result = self.run(&ctx).await;
        let duration_ms = timer.finish();
        let success = matches!(&result, Ok(r) if r.success);
        ctx.try_emit_event(PipelineEvent::pipeline_completed(&self.name, success, duration_ms));

        match result {
            Ok(mut result) => {
                result.duration_ms = duration_ms;
                if result.success {
                    info!(pipeline = %self.name, duration_ms, "Pipeline completed");
                } else {
                    error!(pipeline = %self.name, error = ?result.error, "Pipeline stopped");
                }
                Ok(result)
            }
            Err(e) => {
                error!(pipeline = %self.name, error = %e, "Pipeline aborted");
                Err(e)
            }
        }
    }

    async fn run(&self, ctx: &Arc<PipelineContext>) -> Result<GraphExecutionResult> {
        let mut outputs: HashMap<String, StageOutput> = HashMap::new();
        let mut completed: HashMap<String, StageData> = HashMap::new();
        let mut in_degree: HashMap<&str, usize> = self
            .stages
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.dependencies.len()))
            .collect();
        let mut active: FuturesUnordered<StageTask> = FuturesUnordered::new();

        for name in &self.execution_order {
            if in_degree.get(name.as_str()) == Some(&0) {
                active.push(self.spawn_stage(name, ctx, &completed)?);
            }
        }

        while outputs.len() < self.stages.len() {
            if ctx.is_cancelled() {
                abort_all(&active);
                let reason = ctx.cancel_reason().unwrap_or_else(|| "no reason given".to_string());
                return Ok(stopped(outputs, format!("Pipeline cancelled: {reason}")));
            }

            let Some(joined) = active.next().await else {
                let mut pending: Vec<&String> = self.stages.keys().filter(|n| !outputs.contains_key(*n)).collect();
                pending.sort();
                return Err(FeatureflowError::StageExecution(format!(
                    "stage graph cannot make progress; pending stages: {pending:?}"
                )));
            };
            let (stage_name, output) =
                joined.map_err(|e| FeatureflowError::StageExecution(format!("stage task failed: {e}")))?;

            if output.status == StageStatus::Fail {
                abort_all(&active);
                let message = format!(
                    "Stage '{stage_name}' failed: {}",
                    output.error.as_deref().unwrap_or("no error message")
                );
                outputs.insert(stage_name, output);
                return Ok(stopped(outputs, message));
            }

            completed.insert(stage_name.clone(), output.data.clone().unwrap_or_default());
            outputs.insert(stage_name.clone(), output);

            for child in &self.execution_order {
                let depends = self
                    .stages
                    .get(child)
                    .is_some_and(|spec| spec.dependencies.contains(&stage_name));
                if !depends {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(child.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        active.push(self.spawn_stage(child, ctx, &completed)?);
                    }
                }
            }
        }

        Ok(GraphExecutionResult {
            outputs,
            duration_ms: 0.0,
            success: true,
            error: None,
        })
    }

    fn spawn_stage(
        &self,
        stage_name: &str,
        ctx: &Arc<PipelineContext>,
        completed: &HashMap<String, StageData>,
    ) -> Result<StageTask> {
        let spec = self
            .stages
            .get(stage_name)
            .cloned()
            .ok_or_else(|| FeatureflowError::StageExecution(format!("unknown stage '{stage_name}'")))?;

        let prior: HashMap<String, StageData> = completed
            .iter()
            .filter(|(name, _)| spec.dependencies.contains(*name))
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect();
        let inputs = StageInputs::new(prior, spec.dependencies.clone(), &spec.name, true);
        let stage_ctx = StageContext::new(Arc::clone(ctx), &spec.name, inputs, spec.params.clone());
        let span = stage_span(&spec.name, spec.kind);

        Ok(tokio::spawn(
            async move {
                let name = spec.name.clone();
                stage_ctx.try_emit_event(PipelineEvent::stage_started(&name));
                info!("Stage started");

                let timer = SpanTimer::start(&name);
                let output = spec.runner.execute(&stage_ctx).await;
                let duration_ms = timer.finish();

                match output.status {
                    StageStatus::Fail => {
                        let message = output.error.as_deref().unwrap_or_default();
                        error!(duration_ms, error = %message, "Stage failed");
                        stage_ctx.try_emit_event(PipelineEvent::stage_failed(&name, message));
                    }
                    StageStatus::Skip => {
                        info!(reason = ?output.skip_reason, "Stage skipped");
                        stage_ctx.try_emit_event(PipelineEvent::stage_skipped(&name, output.skip_reason.as_deref()));
                    }
                    _ => {
                        info!(duration_ms, artifacts = output.artifacts.len(), "Stage completed");
                        stage_ctx.try_emit_event(PipelineEvent::stage_completed(&name, duration_ms));
                    }
                }
                (name, output)
            }
            .instrument(span),
        ))
    }
}

fn stopped(outputs: HashMap<String, StageOutput>, error: String) -> GraphExecutionResult {
    GraphExecutionResult {
        outputs,
        duration_ms: 0.0,
        success: false,
        error: Some(error),
    }
}

fn abort_all(active: &FuturesUnordered<StageTask>) {
    for task in active.iter() {
        task.abort();
    }
}

/// Depth-first topological sort, visiting roots in insertion order.
fn topological_sort(stages: &HashMap<String, StageSpec>, stage_order: &[String]) -> Vec<String> {
    fn visit(
        node: &str,
        stages: &HashMap<String, StageSpec>,
        visited: &mut std::collections::HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(node.to_string()) {
            return;
        }
        if let Some(spec) = stages.get(node) {
            let mut deps: Vec<&String> = spec.dependencies.iter().collect();
            deps.sort();
            for dep in deps {
                visit(dep, stages, visited, result);
            }
        }
        result.push(node.to_string());
    }

    let mut result = Vec::with_capacity(stages.len());
    let mut visited = std::collections::HashSet::new();
    for name in stage_order {
        visit(name, stages, &mut visited, &mut result);
    }
    result
}
