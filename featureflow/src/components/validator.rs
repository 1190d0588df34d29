//! Checks example statistics against the feature schema.

use super::run_blocking;
use super::statistics::DatasetStatistics;
use crate::context::StageContext;
use crate::core::{StageArtifact, StageOutput};
use crate::features::{DType, FeatureSchema, KeyClass};
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the anomaly report.
pub const ANOMALIES_FILE: &str = "anomalies.json";

/// What is wrong with a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The schema declares the key but no record carries it.
    MissingFeature,
    /// The values do not have the type the key class needs.
    WrongType,
    /// The key is present but every value is missing.
    EmptyColumn,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFeature => write!(f, "missing_feature"),
            Self::WrongType => write!(f, "wrong_type"),
            Self::EmptyColumn => write!(f, "empty_column"),
        }
    }
}

/// One schema violation found in one split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Split the anomaly was found in.
    pub split: String,
    /// Offending feature key.
    pub key: String,
    /// Kind of anomaly.
    pub kind: AnomalyKind,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.split, self.kind, self.key, self.message)
    }
}

/// Compares per-split statistics with the schema.
///
/// Anomalies are ordered by split name, then by schema key order.
#[must_use]
pub fn validate_statistics(schema: &FeatureSchema, stats: &DatasetStatistics) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for (split, split_stats) in &stats.splits {
        let mut report = |key: &str, kind, message: String| {
            anomalies.push(Anomaly {
                split: split.clone(),
                key: key.to_string(),
                kind,
                message,
            });
        };

        for key in schema.all_keys() {
            let Some(feature) = split_stats.features.get(key) else {
                report(key, AnomalyKind::MissingFeature, "no record carries this key".to_string());
                continue;
            };

            if split_stats.records > 0 && feature.count == 0 {
                report(
                    key,
                    AnomalyKind::EmptyColumn,
                    format!("all {} values are missing", split_stats.records),
                );
                continue;
            }

            if feature.mixed_types {
                report(key, AnomalyKind::WrongType, "column mixes text and numbers".to_string());
            } else if schema.key_class(key) == Some(KeyClass::Numerical) && feature.dtype == Some(DType::Text) {
                report(key, AnomalyKind::WrongType, "numerical feature holds text values".to_string());
            }
        }
    }

    anomalies
}

/// Fails when the statistics published by `source` violate the schema.
///
/// The anomaly report is written either way. Publishes `anomalies_uri`.
#[derive(Debug, Clone)]
pub struct ExampleValidatorStage {
    name: String,
    source: String,
    schema: Arc<FeatureSchema>,
}

impl ExampleValidatorStage {
    /// Creates a validator reading the statistics published by `source`.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>, schema: Arc<FeatureSchema>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            schema,
        }
    }
}

#[async_trait]
impl Stage for ExampleValidatorStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let stats_path = match ctx.inputs().require_path(&self.source, "statistics_uri") {
            Ok(path) => path,
            Err(e) => return StageOutput::fail(e.to_string()),
        };
        let schema = Arc::clone(&self.schema);
        let target = ctx.stage_dir().join(ANOMALIES_FILE);

        run_blocking(&self.name, move || {
            let stats = DatasetStatistics::load(&stats_path)?;
            let anomalies = validate_statistics(&schema, &stats);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, serde_json::to_vec_pretty(&anomalies)?)?;
            let artifact = StageArtifact::new("anomalies", "examples", &target);

            if anomalies.is_empty() {
                info!(path = %target.display(), "Examples match the schema");
                return Ok(StageOutput::ok_value("anomalies_uri", json!(target.display().to_string()))
                    .with_artifact(artifact));
            }

            for anomaly in &anomalies {
                warn!(split = %anomaly.split, key = %anomaly.key, kind = %anomaly.kind, "{}", anomaly.message);
            }
            Ok(StageOutput::fail(format!(
                "{} anomalies found, first: {}",
                anomalies.len(),
                anomalies[0]
            ))
            .with_artifact(artifact)
            .add_metadata("anomalies", json!(anomalies.len())))
        })
        .await
    }
}
