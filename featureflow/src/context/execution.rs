//! Pipeline-wide and per-stage execution contexts.

use super::StageInputs;
use crate::events::{get_event_sink, EventSink, PipelineEvent};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Behaviour shared by pipeline and stage contexts.
pub trait ExecutionContext: Send + Sync {
    /// The run id of the enclosing pipeline.
    fn pipeline_run_id(&self) -> Uuid;

    /// Emits an event tagged with this context. Never fails.
    fn try_emit_event(&self, event: PipelineEvent);

    /// Returns true once the run has been cancelled.
    fn is_cancelled(&self) -> bool;
}

/// State shared by every stage of one pipeline run.
pub struct PipelineContext {
    run_id: Uuid,
    pipeline_name: String,
    pipeline_root: PathBuf,
    event_sink: Arc<dyn EventSink>,
    cancelled: AtomicBool,
    cancel_reason: RwLock<Option<String>>,
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("run_id", &self.run_id)
            .field("pipeline_name", &self.pipeline_name)
            .field("pipeline_root", &self.pipeline_root)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PipelineContext {
    /// Creates a context with a fresh run id and the global event sink.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, pipeline_root: impl Into<PathBuf>) -> Self {
        Self {
            run_id: crate::utils::generate_uuid(),
            pipeline_name: pipeline_name.into(),
            pipeline_root: pipeline_root.into(),
            event_sink: get_event_sink(),
            cancelled: AtomicBool::new(false),
            cancel_reason: RwLock::new(None),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Sets an explicit run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// The pipeline name.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// The directory all stage artifacts are written under.
    #[must_use]
    pub fn pipeline_root(&self) -> &Path {
        &self.pipeline_root
    }

    /// The event sink in use.
    #[must_use]
    pub fn event_sink(&self) -> &Arc<dyn EventSink> {
        &self.event_sink
    }

    /// Cancels the run. Stages already running finish; no new stage starts.
    pub fn mark_cancelled(&self, reason: impl Into<String>) {
        *self.cancel_reason.write() = Some(reason.into());
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// The cancellation reason, if cancelled.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.read().clone()
    }

    fn tag(&self, mut event: PipelineEvent) -> PipelineEvent {
        if let Value::Object(map) = &mut event.data {
            map.insert("pipeline_run_id".to_string(), json!(self.run_id.to_string()));
            map.insert("pipeline".to_string(), json!(&self.pipeline_name));
        }
        event
    }
}

impl ExecutionContext for PipelineContext {
    fn pipeline_run_id(&self) -> Uuid {
        self.run_id
    }

    fn try_emit_event(&self, event: PipelineEvent) {
        self.event_sink.try_emit(self.tag(event));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The context handed to a single stage execution.
///
/// `inputs` carries the outputs of the stage's dependencies, `params` its
/// execution parameters.
pub struct StageContext {
    pipeline_ctx: Arc<PipelineContext>,
    stage_name: String,
    inputs: StageInputs,
    params: HashMap<String, Value>,
}

impl StageContext {
    /// Creates a stage context.
    #[must_use]
    pub fn new(
        pipeline_ctx: Arc<PipelineContext>,
        stage_name: impl Into<String>,
        inputs: StageInputs,
        params: HashMap<String, Value>,
    ) -> Self {
        Self {
            pipeline_ctx,
            stage_name: stage_name.into(),
            inputs,
            params,
        }
    }

    /// The stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Outputs of the declared dependencies.
    #[must_use]
    pub fn inputs(&self) -> &StageInputs {
        &self.inputs
    }

    /// All execution parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, Value> {
        &self.params
    }

    /// One execution parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// One string execution parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// The enclosing pipeline context.
    #[must_use]
    pub fn pipeline_ctx(&self) -> &Arc<PipelineContext> {
        &self.pipeline_ctx
    }

    /// The pipeline artifact root.
    #[must_use]
    pub fn pipeline_root(&self) -> &Path {
        self.pipeline_ctx.pipeline_root()
    }

    /// `<pipeline_root>/<stage_name>`, the default home of this stage's artifacts.
    #[must_use]
    pub fn stage_dir(&self) -> PathBuf {
        self.pipeline_root().join(&self.stage_name)
    }
}

impl ExecutionContext for StageContext {
    fn pipeline_run_id(&self) -> Uuid {
        self.pipeline_ctx.pipeline_run_id()
    }

    fn try_emit_event(&self, event: PipelineEvent) {
        let event = event.with("stage", json!(&self.stage_name));
        self.pipeline_ctx.try_emit_event(event);
    }

    fn is_cancelled(&self) -> bool {
        self.pipeline_ctx.is_cancelled()
    }
}
