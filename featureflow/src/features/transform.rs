//! The per-feature-class preprocessing policy.

use super::analyzer::{analyze, require_complete_label, FittedTransformSchema};
use super::column::{densify, ColumnValues, DType, FeatureColumn};
use super::schema::FeatureSchema;
use super::{RawFeatures, TransformedFeatures};
use crate::errors::{FeatureflowError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Applies fitted statistics to raw feature columns.
///
/// Numerical keys are densified, z-scored and mapped onto [0, 1]; categorical
/// keys are densified; label keys are copied verbatim.
#[derive(Debug, Clone)]
pub struct TransformPolicy {
    fitted: Arc<FittedTransformSchema>,
}

impl TransformPolicy {
    /// Creates a policy bound to one fitted artifact.
    #[must_use]
    pub fn new(fitted: Arc<FittedTransformSchema>) -> Self {
        Self { fitted }
    }

    /// The fitted artifact in use.
    #[must_use]
    pub fn fitted(&self) -> &FittedTransformSchema {
        &self.fitted
    }

    /// The feature schema in use.
    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        self.fitted.schema()
    }

    /// Transforms one batch of raw columns.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` for a schema key missing from `raw`,
    /// `SchemaMismatch` for keys outside the schema, text in a numerical
    /// column, a categorical or label dtype other than the fitted one, or a
    /// missing label, and `ShapeViolation` from densification.
    pub fn transform(&self, raw: &RawFeatures) -> Result<TransformedFeatures> {
        let schema = self.schema();

        if let Some(key) = schema.all_keys().find(|k| !raw.contains_key(*k)) {
            return Err(FeatureflowError::key_not_found(key));
        }
        if let Some(key) = raw.keys().find(|k| !schema.contains(k)) {
            return Err(FeatureflowError::schema_mismatch(
                key.clone(),
                "key is not declared in the feature schema",
            ));
        }

        let mut outputs = TransformedFeatures::new();

        debug!(count = schema.numerical_keys().len(), "Scaling numerical keys to z-score, then to [0, 1]");
        for key in schema.numerical_keys() {
            let stats = self
                .fitted
                .numeric_stats(key)
                .ok_or_else(|| FeatureflowError::key_not_found(key.clone()))?;
            let values = densify(key, &raw[key])?.to_f64(key)?;
            let scaled = values.into_iter().map(|x| stats.scale(x)).collect();
            outputs.insert(key.clone(), FeatureColumn::Dense(ColumnValues::Float(scaled)));
        }

        debug!(count = schema.categorical_keys().len(), "Densifying categorical keys");
        for key in schema.categorical_keys() {
            let dense = densify(key, &raw[key])?;
            self.require_fitted_dtype(key, dense.dtype())?;
            outputs.insert(key.clone(), FeatureColumn::Dense(dense));
        }

        debug!(count = schema.label_keys().len(), "Passing label keys through");
        for key in schema.label_keys() {
            let column = &raw[key];
            require_complete_label(key, column)?;
            self.require_fitted_dtype(key, column.dtype())?;
            outputs.insert(key.clone(), column.clone());
        }

        Ok(outputs)
    }

    fn require_fitted_dtype(&self, key: &str, dtype: DType) -> Result<()> {
        let fitted = self
            .fitted
            .feature_spec()
            .get(key)
            .ok_or_else(|| FeatureflowError::key_not_found(key))?;
        if fitted.dtype == dtype {
            Ok(())
        } else {
            Err(FeatureflowError::schema_mismatch(
                key,
                format!("column holds {dtype} values, fitted as {}", fitted.dtype),
            ))
        }
    }
}

/// Fits statistics over `corpus` and transforms that same corpus.
///
/// # Errors
///
/// Propagates analysis and transform errors.
pub fn preprocess(
    schema: &FeatureSchema,
    corpus: &RawFeatures,
) -> Result<(Arc<FittedTransformSchema>, TransformedFeatures)> {
    let fitted = Arc::new(analyze(schema, corpus)?);
    let policy = TransformPolicy::new(Arc::clone(&fitted));
    let transformed = policy.transform(corpus)?;
    info!(
        fingerprint = %fitted.fingerprint(),
        features = transformed.len(),
        "Preprocessed feature corpus"
    );
    Ok((fitted, transformed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::analyzer::{FeatureSpec, NumericStats};
    use crate::features::column::{DType, SparseColumn};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["num_0", "num_1"], ["cat_0", "cat_1"], ["label_0"], 100, 10).unwrap()
    }

    fn corpus() -> RawFeatures {
        let mut raw = RawFeatures::new();
        raw.insert("num_0".into(), ColumnValues::Float(vec![0.0, 5.0, 10.0, 5.0]).into());
        raw.insert(
            "num_1".into(),
            SparseColumn::new(vec![[1, 0], [3, 0]], ColumnValues::Int(vec![4, 8]), [4, 1]).into(),
        );
        raw.insert(
            "cat_0".into(),
            SparseColumn::new(
                vec![[0, 0], [2, 0]],
                ColumnValues::Text(vec!["tcp".into(), "udp".into()]),
                [4, 1],
            )
            .into(),
        );
        raw.insert(
            "cat_1".into(),
            SparseColumn::new(vec![[3, 0]], ColumnValues::Int(vec![7]), [4, 1]).into(),
        );
        raw.insert(
            "label_0".into(),
            SparseColumn::new(
                vec![[0, 0], [1, 0], [2, 0], [3, 0]],
                ColumnValues::Int(vec![1, 0, 0, 1]),
                [4, 1],
            )
            .into(),
        );
        raw
    }

    fn floats(column: &FeatureColumn) -> Vec<f64> {
        match column {
            FeatureColumn::Dense(ColumnValues::Float(v)) => v.clone(),
            other => panic!("expected dense float column, got {other:?}"),
        }
    }

    #[test]
    fn test_preprocess_numerical_in_unit_range() {
        let (_, out) = preprocess(&schema(), &corpus()).unwrap();

        for key in ["num_0", "num_1"] {
            let values = floats(&out[key]);
            assert_eq!(values.len(), 4);
            assert!(values.iter().all(|v| (0.0..=1.0).contains(v)), "{key}: {values:?}");
        }

        let num_0 = floats(&out["num_0"]);
        assert!((num_0[0] - 0.0).abs() < 1e-12);
        assert!((num_0[1] - 0.5).abs() < 1e-12);
        assert!((num_0[2] - 1.0).abs() < 1e-12);
        let mean = num_0.iter().sum::<f64>() / 4.0;
        assert!((mean - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_densified_with_defaults() {
        let (_, out) = preprocess(&schema(), &corpus()).unwrap();
        assert_eq!(
            out["cat_0"],
            FeatureColumn::Dense(ColumnValues::Text(vec![
                "tcp".into(),
                String::new(),
                "udp".into(),
                String::new()
            ]))
        );
        assert_eq!(
            out["cat_1"],
            FeatureColumn::Dense(ColumnValues::Int(vec![0, 0, 0, 7]))
        );
    }

    #[test]
    fn test_labels_pass_through_and_key_set_preserved() {
        let raw = corpus();
        let (_, out) = preprocess(&schema(), &raw).unwrap();

        assert_eq!(out["label_0"], raw["label_0"]);
        let in_keys: Vec<&String> = raw.keys().collect();
        let out_keys: Vec<&String> = out.keys().collect();
        assert_eq!(in_keys, out_keys);
    }

    #[test]
    fn test_constant_column_yields_midpoint() {
        let schema = FeatureSchema::new(["num_0"], Vec::<String>::new(), ["label_0"], 1, 1).unwrap();
        let mut raw = RawFeatures::new();
        raw.insert("num_0".into(), ColumnValues::Float(vec![2.0; 3]).into());
        raw.insert("label_0".into(), ColumnValues::Int(vec![0; 3]).into());

        let (_, out) = preprocess(&schema, &raw).unwrap();
        assert_eq!(floats(&out["num_0"]), vec![0.5; 3]);
    }

    #[test]
    fn test_missing_numeric_maps_to_midpoint_with_centered_stats() {
        let schema = FeatureSchema::new(["num_0"], ["cat_0"], ["label_0"], 100, 10).unwrap();
        let mut numeric = BTreeMap::new();
        numeric.insert(
            "num_0".to_string(),
            NumericStats {
                count: 2,
                mean: 0.0,
                std_dev: 1.0,
                z_min: -1.0,
                z_max: 1.0,
            },
        );
        let mut spec = BTreeMap::new();
        spec.insert("num_0".to_string(), FeatureSpec::scalar(DType::Float));
        spec.insert("cat_0".to_string(), FeatureSpec::scalar(DType::Text));
        spec.insert("label_0".to_string(), FeatureSpec::scalar(DType::Int));
        let fitted = FittedTransformSchema::from_parts(schema, numeric, spec).unwrap();
        let policy = TransformPolicy::new(Arc::new(fitted));

        let mut raw = RawFeatures::new();
        raw.insert(
            "num_0".into(),
            SparseColumn::new(Vec::new(), ColumnValues::Float(Vec::new()), [1, 1]).into(),
        );
        raw.insert("cat_0".into(), ColumnValues::Text(vec!["tcp".into()]).into());
        raw.insert("label_0".into(), ColumnValues::Int(vec![1]).into());

        let out = policy.transform(&raw).unwrap();
        assert_eq!(floats(&out["num_0"]), vec![0.5]);
        assert_eq!(out["cat_0"], FeatureColumn::Dense(ColumnValues::Text(vec!["tcp".into()])));
        assert_eq!(out["label_0"], FeatureColumn::Dense(ColumnValues::Int(vec![1])));
    }

    #[test]
    fn test_serving_values_outside_fit_range_are_kept() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let policy = TransformPolicy::new(fitted);

        let mut serving = corpus();
        serving.insert("num_0".into(), ColumnValues::Float(vec![20.0, -10.0, 5.0, 5.0]).into());
        let out = policy.transform(&serving).unwrap();
        let num_0 = floats(&out["num_0"]);
        assert!(num_0[0] > 1.0);
        assert!(num_0[1] < 0.0);
    }

    #[test]
    fn test_missing_key_fails() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let mut raw = corpus();
        raw.remove("label_0");
        let err = TransformPolicy::new(fitted).transform(&raw).unwrap_err();
        assert!(matches!(err, FeatureflowError::KeyNotFound { ref key } if key == "label_0"));
    }

    #[test]
    fn test_unknown_key_fails() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let mut raw = corpus();
        raw.insert("tips".into(), ColumnValues::Float(vec![0.0; 4]).into());
        let err = TransformPolicy::new(fitted).transform(&raw).unwrap_err();
        assert!(matches!(err, FeatureflowError::SchemaMismatch { ref key, .. } if key == "tips"));
    }

    #[test]
    fn test_categorical_dtype_must_match_fit() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let mut serving = corpus();
        serving.insert("cat_0".into(), ColumnValues::Int(vec![3, 3, 3, 3]).into());

        let err = TransformPolicy::new(fitted).transform(&serving).unwrap_err();
        match err {
            FeatureflowError::SchemaMismatch { key, message } => {
                assert_eq!(key, "cat_0");
                assert!(message.contains("fitted as text"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_label_dtype_must_match_fit() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let mut serving = corpus();
        serving.insert("label_0".into(), ColumnValues::Text(vec!["normal.".into(); 4]).into());
        assert!(matches!(
            TransformPolicy::new(fitted).transform(&serving),
            Err(FeatureflowError::SchemaMismatch { ref key, .. }) if key == "label_0"
        ));
    }

    #[test]
    fn test_missing_label_fails() {
        let (fitted, _) = preprocess(&schema(), &corpus()).unwrap();
        let mut serving = corpus();
        serving.insert(
            "label_0".into(),
            SparseColumn::new(vec![[0, 0]], ColumnValues::Int(vec![1]), [4, 1]).into(),
        );
        assert!(matches!(
            TransformPolicy::new(fitted).transform(&serving),
            Err(FeatureflowError::SchemaMismatch { ref key, .. }) if key == "label_0"
        ));
    }

    #[test]
    fn test_multi_slot_numeric_fails() {
        let mut raw = corpus();
        raw.insert(
            "num_1".into(),
            SparseColumn::new(vec![[0, 1]], ColumnValues::Float(vec![1.0]), [4, 2]).into(),
        );
        assert!(matches!(
            preprocess(&schema(), &raw),
            Err(FeatureflowError::ShapeViolation { .. })
        ));
    }
}
