//! Observability utilities.

mod logging;

pub use logging::{init_tracing, pipeline_span, stage_span, SpanTimer};
