//! # Featureflow
//!
//! Feature preprocessing and training-input pipelines for tabular data laid
//! out like KDD Cup 99.
//!
//! Featureflow provides:
//!
//! - **Feature transforms**: fit numeric statistics once over a full pass,
//!   persist them, and apply the same numbers to every later batch
//! - **Batched datasets**: gzip JSON-lines record files read as
//!   `(features, label)` batches
//! - **Stage-based execution**: discrete pipeline stages with declared
//!   dependencies, run as a DAG
//! - **Event-driven observability**: lifecycle events and `tracing` spans
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use featureflow::prelude::*;
//!
//! let config = PipelineConfig::new().with_data_root("data");
//! let graph = featureflow::pipelines::kdd::create_pipeline(&config)?;
//! let result = featureflow::pipelines::run_pipeline(&config, &graph).await?;
//! println!("{:?}", result.output("trainer"));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod components;
pub mod config;
pub mod context;
pub mod core;
pub mod dataset;
pub mod errors;
pub mod events;
pub mod features;
pub mod observability;
pub mod pipeline;
pub mod pipelines;
pub mod stages;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{LogConfig, LogFormat, PipelineConfig};
    pub use crate::context::{ExecutionContext, PipelineContext, StageContext, StageInputs};
    pub use crate::core::{StageArtifact, StageKind, StageOutput, StageStatus};
    pub use crate::dataset::{build_dataset, build_train_eval, Batch, BatchedDataset, DatasetOptions};
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, FeatureflowError, PipelineValidationError,
        UndeclaredDependencyError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::features::{
        analyze, preprocess, FeatureSchema, FittedTransformSchema, KeyClass, RawFeatures, TransformPolicy,
    };
    pub use crate::pipeline::{GraphExecutionResult, PipelineBuilder, StageGraph, StageSpec};
    pub use crate::stages::Stage;
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
