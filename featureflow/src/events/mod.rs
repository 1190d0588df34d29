//! Pipeline lifecycle events and the sinks that receive them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

static GLOBAL_EVENT_SINK: RwLock<Option<Arc<dyn EventSink>>> = RwLock::new(None);

/// Sets the process-wide default event sink.
pub fn set_event_sink(sink: Arc<dyn EventSink>) {
    *GLOBAL_EVENT_SINK.write() = Some(sink);
}

/// Clears the process-wide default event sink.
pub fn clear_event_sink() {
    *GLOBAL_EVENT_SINK.write() = None;
}

/// Returns the process-wide default sink, or a `NoOpEventSink`.
pub fn get_event_sink() -> Arc<dyn EventSink> {
    GLOBAL_EVENT_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpEventSink))
}

/// An event emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Dotted event type, e.g. `stage.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// When the event occurred (ISO 8601).
    pub timestamp: String,
    /// Event payload; always a JSON object.
    pub data: Value,
}

impl PipelineEvent {
    /// Creates an event with an empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: json!({}),
        }
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Value::Object(map) = &mut self.data {
            map.insert(key.into(), value);
        }
        self
    }

    /// `stage.started`.
    #[must_use]
    pub fn stage_started(stage: &str) -> Self {
        Self::new("stage.started").with("stage", json!(stage))
    }

    /// `stage.completed` with the stage duration.
    #[must_use]
    pub fn stage_completed(stage: &str, duration_ms: f64) -> Self {
        Self::new("stage.completed")
            .with("stage", json!(stage))
            .with("duration_ms", json!(duration_ms))
    }

    /// `stage.skipped` with the skip reason.
    #[must_use]
    pub fn stage_skipped(stage: &str, reason: Option<&str>) -> Self {
        Self::new("stage.skipped")
            .with("stage", json!(stage))
            .with("reason", json!(reason))
    }

    /// `stage.failed` with the error message.
    #[must_use]
    pub fn stage_failed(stage: &str, error: &str) -> Self {
        Self::new("stage.failed")
            .with("stage", json!(stage))
            .with("error", json!(error))
    }

    /// `pipeline.completed` with the overall outcome.
    #[must_use]
    pub fn pipeline_completed(pipeline: &str, success: bool, duration_ms: f64) -> Self {
        Self::new("pipeline.completed")
            .with("pipeline", json!(pipeline))
            .with("success", json!(success))
            .with("duration_ms", json!(duration_ms))
    }

    /// Reads a payload field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let event = PipelineEvent::stage_failed("validator", "2 anomalies");
        assert_eq!(event.event_type, "stage.failed");
        assert_eq!(event.get("stage"), Some(&json!("validator")));
        assert_eq!(event.get("error"), Some(&json!("2 anomalies")));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage.failed");
    }

    #[test]
    fn test_global_sink_roundtrip() {
        let sink = Arc::new(CollectingEventSink::new());
        set_event_sink(sink.clone());
        get_event_sink().try_emit(PipelineEvent::new("custom"));
        clear_event_sink();
        get_event_sink().try_emit(PipelineEvent::new("dropped"));

        let types = sink.event_types();
        assert!(types.iter().any(|t| t == "custom"));
        assert!(!types.iter().any(|t| t == "dropped"));
    }
}
