//! Column model for raw and transformed features.
//!
//! A raw column may be sparse (`indices`, `values`, `dense_shape`), a
//! transformed column is always dense.

use crate::errors::{FeatureflowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// 64-bit float.
    Float,
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    Text,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Int => write!(f, "int"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl Scalar {
    /// The dtype this scalar naturally belongs to.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Int(_) => DType::Int,
            Self::Float(_) => DType::Float,
            Self::Text(_) => DType::Text,
        }
    }

    /// Converts to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::json!(v),
            Self::Float(v) => serde_json::json!(v),
            Self::Text(v) => serde_json::json!(v),
        }
    }
}

/// A dense column of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "snake_case")]
pub enum ColumnValues {
    /// Float values.
    Float(Vec<f64>),
    /// Integer values.
    Int(Vec<i64>),
    /// Text values.
    Text(Vec<String>),
}

impl ColumnValues {
    /// An empty column of the given dtype.
    #[must_use]
    pub fn empty(dtype: DType) -> Self {
        Self::defaults(dtype, 0)
    }

    /// A column of `len` type defaults: `0.0`, `0` or `""`.
    #[must_use]
    pub fn defaults(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::Float => Self::Float(vec![0.0; len]),
            DType::Int => Self::Int(vec![0; len]),
            DType::Text => Self::Text(vec![String::new(); len]),
        }
    }

    /// Builds a column from scalars of a single dtype.
    ///
    /// Integers are accepted into float columns.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` naming `key` if a scalar has another dtype.
    pub fn from_scalars(key: &str, dtype: DType, scalars: Vec<Scalar>) -> Result<Self> {
        let mut column = Self::empty(dtype);
        for scalar in scalars {
            column.push(key, scalar)?;
        }
        Ok(column)
    }

    /// Appends one scalar.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` if the scalar does not fit the column dtype.
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, key: &str, scalar: Scalar) -> Result<()> {
        match (self, scalar) {
            (Self::Float(values), Scalar::Float(v)) => values.push(v),
            (Self::Float(values), Scalar::Int(v)) => values.push(v as f64),
            (Self::Int(values), Scalar::Int(v)) => values.push(v),
            (Self::Text(values), Scalar::Text(v)) => values.push(v),
            (column, scalar) => {
                return Err(FeatureflowError::schema_mismatch(
                    key,
                    format!("expected {} value, got {}", column.dtype(), scalar.dtype()),
                ));
            }
        }
        Ok(())
    }

    /// The column dtype.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Float(_) => DType::Float,
            Self::Int(_) => DType::Int,
            Self::Text(_) => DType::Text,
        }
    }

    /// Number of records in the column.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Returns true if the column has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` as a scalar.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Self::Float(v) => v.get(index).copied().map(Scalar::Float),
            Self::Int(v) => v.get(index).copied().map(Scalar::Int),
            Self::Text(v) => v.get(index).cloned().map(Scalar::Text),
        }
    }

    /// Reads the column as floats, widening integers.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` naming `key` for text columns.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(&self, key: &str) -> Result<Vec<f64>> {
        match self {
            Self::Float(v) => Ok(v.clone()),
            Self::Int(v) => Ok(v.iter().map(|x| *x as f64).collect()),
            Self::Text(_) => Err(FeatureflowError::schema_mismatch(
                key,
                "numerical feature holds text values",
            )),
        }
    }
}

/// A column where some records may hold no value.
///
/// `indices[i] = [row, slot]` locates `values[i]`; `dense_shape = [rows, slots]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseColumn {
    /// Coordinates of present values.
    pub indices: Vec<[usize; 2]>,
    /// Present values, parallel to `indices`.
    pub values: ColumnValues,
    /// `[record count, value slots per record]`.
    pub dense_shape: [usize; 2],
}

impl SparseColumn {
    /// Creates a sparse column without validating it; `densify` validates.
    #[must_use]
    pub fn new(indices: Vec<[usize; 2]>, values: ColumnValues, dense_shape: [usize; 2]) -> Self {
        Self {
            indices,
            values,
            dense_shape,
        }
    }

    /// Builds a `[n, 1]` column from optional cells; `None` marks a missing value.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` naming `key` if a present cell does not fit `dtype`.
    pub fn from_options(key: &str, dtype: DType, cells: Vec<Option<Scalar>>) -> Result<Self> {
        let rows = cells.len();
        let mut indices = Vec::new();
        let mut values = ColumnValues::empty(dtype);
        for (row, cell) in cells.into_iter().enumerate() {
            if let Some(scalar) = cell {
                values.push(key, scalar)?;
                indices.push([row, 0]);
            }
        }
        Ok(Self::new(indices, values, [rows, 1]))
    }

    /// Number of records the column spans.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.dense_shape[0]
    }
}

/// A raw feature column: dense or sparse.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureColumn {
    /// Every record holds a value.
    Dense(ColumnValues),
    /// Some records may hold no value.
    Sparse(SparseColumn),
}

impl FeatureColumn {
    /// Number of records in the column.
    #[must_use]
    pub fn rows(&self) -> usize {
        match self {
            Self::Dense(values) => values.len(),
            Self::Sparse(sparse) => sparse.rows(),
        }
    }

    /// Element dtype.
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Dense(values) => values.dtype(),
            Self::Sparse(sparse) => sparse.values.dtype(),
        }
    }

    /// Returns true for dense columns.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }

    /// First record holding no value, if any.
    #[must_use]
    pub fn first_missing_row(&self) -> Option<usize> {
        match self {
            Self::Dense(_) => None,
            Self::Sparse(sparse) => {
                let mut present = vec![false; sparse.rows()];
                for &[row, _] in &sparse.indices {
                    if let Some(slot) = present.get_mut(row) {
                        *slot = true;
                    }
                }
                present.iter().position(|p| !p)
            }
        }
    }

    /// Value of record `row`, `None` if the record holds no value.
    #[must_use]
    pub fn cell(&self, row: usize) -> Option<Scalar> {
        match self {
            Self::Dense(values) => values.get(row),
            Self::Sparse(sparse) => sparse
                .indices
                .iter()
                .position(|[r, _]| *r == row)
                .and_then(|pos| sparse.values.get(pos)),
        }
    }
}

impl From<ColumnValues> for FeatureColumn {
    fn from(values: ColumnValues) -> Self {
        Self::Dense(values)
    }
}

impl From<SparseColumn> for FeatureColumn {
    fn from(sparse: SparseColumn) -> Self {
        Self::Sparse(sparse)
    }
}

/// Fills the missing records of a single-valued column with type defaults.
///
/// Dense columns are returned unchanged. Sparse columns must have at most one
/// value slot per record.
///
/// # Errors
///
/// Returns `ShapeViolation` naming `key` if `dense_shape[1] > 1`, or if an
/// index lies outside the declared shape, repeats a record, or the index and
/// value counts differ.
pub fn densify(key: &str, column: &FeatureColumn) -> Result<ColumnValues> {
    let sparse = match column {
        FeatureColumn::Dense(values) => return Ok(values.clone()),
        FeatureColumn::Sparse(sparse) => sparse,
    };

    let [rows, slots] = sparse.dense_shape;
    if slots > 1 {
        return Err(FeatureflowError::shape_violation(
            key,
            format!("dense_shape[1] = {slots}, expected at most one value per record"),
        ));
    }
    if sparse.indices.len() != sparse.values.len() {
        return Err(FeatureflowError::shape_violation(
            key,
            format!(
                "{} indices but {} values",
                sparse.indices.len(),
                sparse.values.len()
            ),
        ));
    }

    let mut dense = ColumnValues::defaults(sparse.values.dtype(), rows);
    let mut filled = vec![false; rows];
    for (pos, &[row, slot]) in sparse.indices.iter().enumerate() {
        if row >= rows || slot >= slots {
            return Err(FeatureflowError::shape_violation(
                key,
                format!("index [{row}, {slot}] outside dense_shape [{rows}, {slots}]"),
            ));
        }
        if std::mem::replace(&mut filled[row], true) {
            return Err(FeatureflowError::shape_violation(
                key,
                format!("record {row} holds more than one value"),
            ));
        }
        match (&mut dense, &sparse.values) {
            (ColumnValues::Float(out), ColumnValues::Float(src)) => out[row] = src[pos],
            (ColumnValues::Int(out), ColumnValues::Int(src)) => out[row] = src[pos],
            (ColumnValues::Text(out), ColumnValues::Text(src)) => out[row].clone_from(&src[pos]),
            _ => unreachable!("defaults share the dtype of the sparse values"),
        }
    }

    Ok(dense)
}
