//! Full-pass analysis: fits the statistics the transform policy applies.
//!
//! The fitted statistics are captured in a [`FittedTransformSchema`] that is
//! saved once and reloaded verbatim by every later consumer, so that training
//! and serving apply exactly the same numbers.

use super::column::{densify, DType, FeatureColumn};
use super::schema::{FeatureSchema, KeyClass};
use super::RawFeatures;
use crate::errors::{FeatureflowError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// File name of the fitted schema inside a transform output directory.
pub const FITTED_SCHEMA_FILE: &str = "transform_graph.json";

/// Shape and type of one fixed-length scalar feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Element dtype.
    pub dtype: DType,
}

impl FeatureSpec {
    /// Creates a scalar feature spec.
    #[must_use]
    pub fn scalar(dtype: DType) -> Self {
        Self { dtype }
    }
}

/// Statistics fitted over one numerical column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    /// Number of records the statistics were fitted on.
    pub count: usize,
    /// Population mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest z-score in the fitting corpus.
    pub z_min: f64,
    /// Largest z-score in the fitting corpus.
    pub z_max: f64,
}

impl NumericStats {
    /// Fits mean and standard deviation, then the z-score range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                std_dev: 0.0,
                z_min: 0.0,
                z_max: 0.0,
            };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut stats = Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
            z_min: 0.0,
            z_max: 0.0,
        };

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
        stats.z_min = stats.z_score(min);
        stats.z_max = stats.z_score(max);
        stats
    }

    /// `(x - mean) / std_dev`; a zero deviation leaves `x - mean`.
    #[must_use]
    pub fn z_score(&self, x: f64) -> f64 {
        let centered = x - self.mean;
        if self.std_dev > 0.0 {
            centered / self.std_dev
        } else {
            centered
        }
    }

    /// Z-scores `x` and maps the fitted z-score range onto [0, 1].
    ///
    /// A degenerate range falls back to the logistic sigmoid of the z-score,
    /// so the fitted mean still maps to 0.5. Values outside the fitted range
    /// are not clamped.
    #[must_use]
    pub fn scale(&self, x: f64) -> f64 {
        let z = self.z_score(x);
        if self.z_max > self.z_min {
            (z - self.z_min) / (self.z_max - self.z_min)
        } else {
            1.0 / (1.0 + (-z).exp())
        }
    }
}

/// The artifact produced by analysis: schema, fitted statistics and the
/// transformed feature spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransformSchema {
    schema: FeatureSchema,
    numeric: BTreeMap<String, NumericStats>,
    feature_spec: BTreeMap<String, FeatureSpec>,
    fingerprint: String,
}

impl FittedTransformSchema {
    /// Assembles an artifact from already-fitted parts.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if a numerical key has no statistics or a schema
    /// key has no feature spec.
    pub fn from_parts(
        schema: FeatureSchema,
        numeric: BTreeMap<String, NumericStats>,
        feature_spec: BTreeMap<String, FeatureSpec>,
    ) -> Result<Self> {
        if let Some(key) = schema.numerical_keys().iter().find(|k| !numeric.contains_key(*k)) {
            return Err(FeatureflowError::key_not_found(key.clone()));
        }
        if let Some(key) = schema.all_keys().find(|k| !feature_spec.contains_key(*k)) {
            return Err(FeatureflowError::key_not_found(key));
        }

        let fingerprint = compute_fingerprint(&numeric, &feature_spec)?;
        Ok(Self {
            schema,
            numeric,
            feature_spec,
            fingerprint,
        })
    }

    /// The feature schema the statistics were fitted for.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Fitted statistics of a numerical key.
    #[must_use]
    pub fn numeric_stats(&self, key: &str) -> Option<&NumericStats> {
        self.numeric.get(key)
    }

    /// The transformed feature spec, keyed by feature name.
    #[must_use]
    pub fn feature_spec(&self) -> &BTreeMap<String, FeatureSpec> {
        &self.feature_spec
    }

    /// SHA-256 digest of the fitted statistics and feature spec.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Writes the artifact as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        debug!(path = %path.display(), fingerprint = %self.fingerprint, "Saved fitted transform schema");
        Ok(())
    }

    /// Reads an artifact and checks that its statistics were not altered.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error, `InvalidSchema` for an
    /// inconsistent schema, and `SchemaMismatch` when the stored fingerprint
    /// does not match the stored statistics.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        let fitted: Self = serde_json::from_slice(&raw)?;
        fitted.schema.validate()?;

        let expected = compute_fingerprint(&fitted.numeric, &fitted.feature_spec)?;
        if expected != fitted.fingerprint {
            return Err(FeatureflowError::schema_mismatch(
                "fingerprint",
                format!(
                    "stored fingerprint {} does not match fitted statistics {expected}",
                    fitted.fingerprint
                ),
            ));
        }
        Ok(fitted)
    }
}

fn compute_fingerprint(
    numeric: &BTreeMap<String, NumericStats>,
    feature_spec: &BTreeMap<String, FeatureSpec>,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(numeric)?);
    hasher.update(serde_json::to_vec(feature_spec)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Labels are stored as one scalar per record, so every record must hold one.
pub(crate) fn require_complete_label(key: &str, column: &FeatureColumn) -> Result<()> {
    match column.first_missing_row() {
        Some(row) => Err(FeatureflowError::schema_mismatch(
            key,
            format!("label is missing for record {row}"),
        )),
        None => Ok(()),
    }
}

/// Fits the transform statistics over a representative corpus.
///
/// # Errors
///
/// Returns `KeyNotFound` when a schema key is missing from the corpus,
/// `SchemaMismatch` when columns disagree on record count, a numerical
/// column holds text or a label is missing for some record, and
/// `ShapeViolation` from densification.
pub fn analyze(schema: &FeatureSchema, corpus: &RawFeatures) -> Result<FittedTransformSchema> {
    let mut rows: Option<usize> = None;
    let mut numeric = BTreeMap::new();
    let mut feature_spec = BTreeMap::new();

    for key in schema.all_keys() {
        let column = corpus
            .get(key)
            .ok_or_else(|| FeatureflowError::key_not_found(key))?;

        match rows {
            None => rows = Some(column.rows()),
            Some(expected) if expected != column.rows() => {
                return Err(FeatureflowError::schema_mismatch(
                    key,
                    format!("column has {} records, expected {expected}", column.rows()),
                ));
            }
            Some(_) => {}
        }

        match schema.key_class(key) {
            Some(KeyClass::Numerical) => {
                let values = densify(key, column)?.to_f64(key)?;
                let stats = NumericStats::fit(&values);
                debug!(key, mean = stats.mean, std_dev = stats.std_dev, "Fitted numerical feature");
                numeric.insert(key.to_string(), stats);
                feature_spec.insert(key.to_string(), FeatureSpec::scalar(DType::Float));
            }
            Some(KeyClass::Categorical) => {
                let dense = densify(key, column)?;
                feature_spec.insert(key.to_string(), FeatureSpec::scalar(dense.dtype()));
            }
            Some(KeyClass::Label) | None => {
                require_complete_label(key, column)?;
                feature_spec.insert(key.to_string(), FeatureSpec::scalar(column.dtype()));
            }
        }
    }

    info!(
        records = rows.unwrap_or(0),
        numerical = numeric.len(),
        features = feature_spec.len(),
        "Analyzed feature corpus"
    );
    FittedTransformSchema::from_parts(schema.clone(), numeric, feature_spec)
}
