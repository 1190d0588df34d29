//! Log subscriber setup and span helpers.

use crate::config::{LogConfig, LogFormat};
use crate::core::StageKind;
use std::time::Instant;
use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over `config.level` when set. Returns `false`
/// if a subscriber was already installed, which leaves the existing one in
/// place.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(true)
            .try_init(),
    };
    installed.is_ok()
}

/// Span covering one pipeline run.
#[must_use]
pub fn pipeline_span(pipeline: &str, run_id: &str) -> Span {
    tracing::info_span!("pipeline", pipeline = %pipeline, run_id = %run_id)
}

/// Span covering one stage execution.
#[must_use]
pub fn stage_span(stage: &str, kind: StageKind) -> Span {
    tracing::info_span!("stage", stage = %stage, kind = %kind)
}

/// Wall-clock timer for a named span.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!(span = %self.name, duration_ms = elapsed, "Span finished");
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("transform");
        assert_eq!(timer.name(), "transform");
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(timer.finish() >= 5.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let config = LogConfig::default();
        let first = init_tracing(&config);
        assert!(!init_tracing(&config));
        let _ = first;
    }

    #[test]
    fn test_spans_can_be_entered() {
        let span = stage_span("transform", StageKind::Transform);
        let _guard = span.enter();
        let _run = pipeline_span("kdd-pipe", "run-1");
    }
}
