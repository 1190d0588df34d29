//! JSON record encoding for raw and transformed examples.
//!
//! One record is one JSON object. Raw records may hold `null` (or omit a key)
//! for a missing value; transformed records hold a scalar for every key.

use crate::errors::{FeatureflowError, Result};
use crate::features::{
    ColumnValues, DType, FeatureColumn, FeatureSchema, FeatureSpec, FittedTransformSchema, KeyClass,
    RawFeatures, Scalar, SparseColumn,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A record as stored on disk.
pub type Record = serde_json::Map<String, Value>;

/// Where a record came from, for error messages.
#[derive(Debug, Clone, Copy)]
pub struct RecordLocation<'a> {
    /// Source file.
    pub path: &'a Path,
    /// 1-based line number.
    pub line: usize,
}

impl fmt::Display for RecordLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

/// Converts a JSON scalar; `null` is a missing value.
///
/// # Errors
///
/// Returns `SchemaMismatch` naming `key` for arrays and objects.
pub fn scalar_from_json(key: &str, value: &Value) -> Result<Option<Scalar>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(Scalar::Text(s.clone()))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(Scalar::Int(i)))
            } else {
                n.as_f64()
                    .map(|f| Some(Scalar::Float(f)))
                    .ok_or_else(|| FeatureflowError::schema_mismatch(key, format!("unsupported number {n}")))
            }
        }
        Value::Bool(b) => Ok(Some(Scalar::Int(i64::from(*b)))),
        Value::Array(_) | Value::Object(_) => Err(FeatureflowError::schema_mismatch(
            key,
            "expected a scalar value",
        )),
    }
}

/// Parses one transformed record against a fixed-length feature spec.
///
/// Keys outside the feature spec are ignored.
///
/// # Errors
///
/// Returns `SchemaMismatch` if the line is not a JSON object, or a spec key is
/// absent, `null`, non-scalar or of another dtype. Integers are accepted for
/// float features.
pub fn parse_record(
    line: &str,
    spec: &BTreeMap<String, FeatureSpec>,
    location: RecordLocation<'_>,
) -> Result<BTreeMap<String, Scalar>> {
    let record: Record = serde_json::from_str(line).map_err(|e| {
        FeatureflowError::schema_mismatch("<record>", format!("{location}: not a JSON object: {e}"))
    })?;

    let mut parsed = BTreeMap::new();
    for (key, feature) in spec {
        let value = record.get(key).unwrap_or(&Value::Null);
        let scalar = scalar_from_json(key, value)
            .map_err(|_| {
                FeatureflowError::schema_mismatch(key.clone(), format!("{location}: expected a scalar value"))
            })?
            .ok_or_else(|| {
                FeatureflowError::schema_mismatch(key.clone(), format!("{location}: value is missing"))
            })?;

        let scalar = match (feature.dtype, scalar) {
            (DType::Float, Scalar::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                let widened = i as f64;
                Scalar::Float(widened)
            }
            (expected, scalar) if scalar.dtype() == expected => scalar,
            (expected, scalar) => {
                return Err(FeatureflowError::schema_mismatch(
                    key.clone(),
                    format!("{location}: expected {expected}, got {}", scalar.dtype()),
                ));
            }
        };
        parsed.insert(key.clone(), scalar);
    }
    Ok(parsed)
}

/// Turns column-major features into row-major records.
///
/// Missing cells of sparse columns are written as `null`.
///
/// # Errors
///
/// Returns `SchemaMismatch` if the columns disagree on record count.
pub fn columns_to_records(columns: &BTreeMap<String, FeatureColumn>) -> Result<Vec<Record>> {
    let rows = columns.values().next().map_or(0, FeatureColumn::rows);
    if let Some((key, column)) = columns.iter().find(|(_, c)| c.rows() != rows) {
        return Err(FeatureflowError::schema_mismatch(
            key.clone(),
            format!("column has {} records, expected {rows}", column.rows()),
        ));
    }

    let records = (0..rows)
        .map(|row| {
            columns
                .iter()
                .map(|(key, column)| {
                    let value = column.cell(row).map_or(Value::Null, |s| s.to_json());
                    (key.clone(), value)
                })
                .collect::<Record>()
        })
        .collect();
    Ok(records)
}

/// Builds raw feature columns for every schema key from row-major records.
///
/// Numerical keys are read as floats. Other keys take the dtype of their
/// present values (text, else float if any float, else int). Columns with any
/// missing value become sparse `[n, 1]` columns.
///
/// # Errors
///
/// Returns `SchemaMismatch` when a column mixes text and numbers or holds a
/// non-scalar value.
pub fn records_to_columns(schema: &FeatureSchema, records: &[Record]) -> Result<RawFeatures> {
    build_columns(schema, records, |key, cells| infer_dtype(key, schema.key_class(key), cells))
}

/// Builds raw feature columns with the dtypes recorded in a fitted schema.
///
/// Used for data transformed after fitting, so that a split whose present
/// values would infer another dtype (or none at all) still lines up with the
/// fitted feature spec. Integers are accepted into float columns.
///
/// # Errors
///
/// Returns `KeyNotFound` for a schema key without a feature spec and
/// `SchemaMismatch` when a value does not fit the fitted dtype.
pub fn records_to_fitted_columns(fitted: &FittedTransformSchema, records: &[Record]) -> Result<RawFeatures> {
    let spec = fitted.feature_spec();
    build_columns(fitted.schema(), records, |key, _| {
        spec.get(key)
            .map(|feature| feature.dtype)
            .ok_or_else(|| FeatureflowError::key_not_found(key))
    })
}

fn build_columns<F>(schema: &FeatureSchema, records: &[Record], dtype_of: F) -> Result<RawFeatures>
where
    F: Fn(&str, &[Option<Scalar>]) -> Result<DType>,
{
    let mut columns = RawFeatures::new();

    for key in schema.all_keys() {
        let cells = records
            .iter()
            .map(|record| scalar_from_json(key, record.get(key).unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>>>()?;

        let dtype = dtype_of(key, &cells)?;
        let column = if cells.iter().all(Option::is_some) {
            let scalars = cells.into_iter().flatten().collect();
            FeatureColumn::Dense(ColumnValues::from_scalars(key, dtype, scalars)?)
        } else {
            FeatureColumn::Sparse(SparseColumn::from_options(key, dtype, cells)?)
        };
        columns.insert(key.to_string(), column);
    }

    Ok(columns)
}

fn infer_dtype(key: &str, class: Option<KeyClass>, cells: &[Option<Scalar>]) -> Result<DType> {
    let present = || cells.iter().flatten();
    let has_text = present().any(|s| matches!(s, Scalar::Text(_)));
    let has_number = present().any(|s| !matches!(s, Scalar::Text(_)));

    if has_text && has_number {
        return Err(FeatureflowError::schema_mismatch(key, "column mixes text and numeric values"));
    }
    if class == Some(KeyClass::Numerical) {
        return if has_text {
            Err(FeatureflowError::schema_mismatch(key, "numerical feature holds text values"))
        } else {
            Ok(DType::Float)
        };
    }
    if has_text {
        Ok(DType::Text)
    } else if present().any(|s| matches!(s, Scalar::Float(_))) {
        Ok(DType::Float)
    } else if has_number {
        Ok(DType::Int)
    } else {
        Ok(DType::Text)
    }
}
