//! Error types for featureflow.
//!
//! Feature and dataset errors are never recovered locally: they describe a
//! configuration or data-integrity fault that the caller has to fix.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = FeatureflowError> = std::result::Result<T, E>;

/// The main error type for featureflow operations.
#[derive(Debug, Error)]
pub enum FeatureflowError {
    /// A sparse column does not hold a single value slot per record.
    #[error("Shape violation for '{key}': {message}")]
    ShapeViolation {
        /// The offending feature key.
        key: String,
        /// What was wrong with the shape.
        message: String,
    },

    /// A value or record does not match the declared per-key shape or type.
    #[error("Schema mismatch for '{key}': {message}")]
    SchemaMismatch {
        /// The offending feature key.
        key: String,
        /// What did not match.
        message: String,
    },

    /// No file matched any of the supplied patterns.
    #[error("No files match patterns: [{}]", patterns.join(", "))]
    FileNotFound {
        /// The patterns that were resolved.
        patterns: Vec<String>,
    },

    /// A requested key is not part of the schema or input.
    #[error("Key not found: '{key}'")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// The feature schema itself is inconsistent.
    #[error("Invalid feature schema: {0}")]
    InvalidSchema(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline validation error occurred.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// An undeclared dependency was accessed.
    #[error("{0}")]
    UndeclaredDependency(#[from] UndeclaredDependencyError),

    /// A stage execution error.
    #[error("Stage execution error: {0}")]
    StageExecution(String),

    /// Fetching a remote archive failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// CSV input could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeatureflowError {
    /// Creates a shape violation error.
    #[must_use]
    pub fn shape_violation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShapeViolation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error.
    #[must_use]
    pub fn schema_mismatch(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a key not found error.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates a file not found error for the given patterns.
    #[must_use]
    pub fn file_not_found<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self::FileNotFound {
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
        }
    }

    /// Returns a stable machine-readable code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ShapeViolation { .. } => "shape_violation",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::FileNotFound { .. } => "file_not_found",
            Self::KeyNotFound { .. } => "key_not_found",
            Self::InvalidSchema(_) => "invalid_schema",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Validation(_) => "pipeline_validation",
            Self::CycleDetected(_) => "cycle_detected",
            Self::UndeclaredDependency(_) => "undeclared_dependency",
            Self::StageExecution(_) => "stage_execution",
            Self::Download(_) => "download",
            Self::Csv(_) => "csv",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a stage reads the output of a stage it does not depend on.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: stage '{stage}' attempted to access '{key}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared key.
    pub key: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(stage: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_violation_message() {
        let err = FeatureflowError::shape_violation("num_0", "dense_shape[1] = 2 exceeds 1");
        assert_eq!(err.to_string(), "Shape violation for 'num_0': dense_shape[1] = 2 exceeds 1");
        assert_eq!(err.code(), "shape_violation");
    }

    #[test]
    fn test_file_not_found_lists_patterns() {
        let err = FeatureflowError::file_not_found(&["/data/train-*", "/data/eval-*"]);
        assert!(err.to_string().contains("/data/train-*, /data/eval-*"));
        assert_eq!(err.code(), "file_not_found");
    }

    #[test]
    fn test_file_not_found_empty_patterns() {
        let err = FeatureflowError::file_not_found::<&str>(&[]);
        assert_eq!(err.to_string(), "No files match patterns: []");
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");

        let validation: PipelineValidationError = err.into();
        assert_eq!(validation.stages.len(), 3);
    }

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("CONTRACT-004-EMPTY", "Cannot build an empty pipeline")
            .with_fix_hint("Add a stage")
            .with_context_entry("pipeline", "kdd-pipe");

        assert_eq!(info.code, "CONTRACT-004-EMPTY");
        assert_eq!(info.fix_hint.as_deref(), Some("Add a stage"));
        assert_eq!(info.context.get("pipeline").map(String::as_str), Some("kdd-pipe"));
    }
}
