//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration for the KDD pipeline.

use crate::components::split_buckets;
use crate::errors::{FeatureflowError, Result};
use crate::features::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive, used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Configuration shared by the pipeline components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name, used in logs and events.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Directory receiving every artifact the pipeline writes.
    #[serde(default = "default_pipeline_root")]
    pub pipeline_root: PathBuf,
    /// Directory holding the raw input files.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    /// Feature schema of the raw data.
    #[serde(default)]
    pub schema: FeatureSchema,
    /// Records per batch fed to the trainer.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of training batches.
    #[serde(default = "default_train_steps")]
    pub train_steps: usize,
    /// Maximum number of evaluation batches.
    #[serde(default = "default_eval_steps")]
    pub eval_steps: usize,
    /// Hash buckets assigned to the train split.
    #[serde(default = "default_train_buckets")]
    pub train_buckets: u32,
    /// Hash buckets assigned to the eval split.
    #[serde(default = "default_eval_buckets")]
    pub eval_buckets: u32,
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_pipeline_name() -> String {
    "kdd-pipe".to_string()
}

fn default_pipeline_root() -> PathBuf {
    PathBuf::from("pipeline_output")
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    40
}

fn default_train_steps() -> usize {
    10_000
}

fn default_eval_steps() -> usize {
    5_000
}

fn default_train_buckets() -> u32 {
    2
}

fn default_eval_buckets() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            pipeline_root: default_pipeline_root(),
            data_root: default_data_root(),
            schema: FeatureSchema::default(),
            batch_size: default_batch_size(),
            train_steps: default_train_steps(),
            eval_steps: default_eval_steps(),
            train_buckets: default_train_buckets(),
            eval_buckets: default_eval_buckets(),
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error if the file cannot be read,
    /// `InvalidSchema` for an inconsistent schema and `InvalidConfig` for
    /// out-of-range values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_name.trim().is_empty() {
            return Err(FeatureflowError::InvalidConfig(
                "pipeline_name cannot be empty".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(FeatureflowError::InvalidConfig(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        split_buckets(self.train_buckets, self.eval_buckets)?;
        self.schema.validate()
    }

    /// Sets the pipeline name.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Sets the artifact root.
    #[must_use]
    pub fn with_pipeline_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.pipeline_root = root.into();
        self
    }

    /// Sets the raw data directory.
    #[must_use]
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    /// Sets the feature schema.
    #[must_use]
    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Sets the trainer batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the train and eval step limits.
    #[must_use]
    pub fn with_steps(mut self, train_steps: usize, eval_steps: usize) -> Self {
        self.train_steps = train_steps;
        self.eval_steps = eval_steps;
        self
    }

    /// Sets the train/eval hash-split ratio.
    #[must_use]
    pub fn with_split_buckets(mut self, train_buckets: u32, eval_buckets: u32) -> Self {
        self.train_buckets = train_buckets;
        self.eval_buckets = eval_buckets;
        self
    }

    /// Sets the log configuration.
    #[must_use]
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.pipeline_name, "kdd-pipe");
        assert_eq!(config.batch_size, 40);
        assert_eq!(config.train_steps, 10_000);
        assert_eq!(config.eval_steps, 5_000);
        assert_eq!((config.train_buckets, config.eval_buckets), (2, 1));
        assert_eq!(config.schema, FeatureSchema::kdd());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"pipeline_name": "nightly", "batch_size": 16, "log": {"level": "debug", "format": "json"}}"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.pipeline_name, "nightly");
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"batch_size": 0}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(FeatureflowError::InvalidConfig(_))
        ));

        let config = PipelineConfig::new().with_pipeline_name("  ");
        assert!(matches!(config.validate(), Err(FeatureflowError::InvalidConfig(_))));

        let config = PipelineConfig::new().with_split_buckets(2, 0);
        assert!(config.validate().is_err());

        let config = PipelineConfig::new().with_split_buckets(u32::MAX, 1);
        assert!(matches!(config.validate(), Err(FeatureflowError::InvalidConfig(_))));
    }
}
