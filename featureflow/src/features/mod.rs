//! Feature schema, column model and the preprocessing policy.
//!
//! This module provides:
//! - The immutable [`FeatureSchema`] naming numerical, categorical and label keys
//! - Dense/sparse columns and [`densify`]
//! - Full-pass analysis producing a [`FittedTransformSchema`]
//! - The [`TransformPolicy`] that applies the fitted statistics

mod analyzer;
mod column;
mod schema;
mod transform;

use std::collections::BTreeMap;

pub use analyzer::{analyze, FeatureSpec, FittedTransformSchema, NumericStats, FITTED_SCHEMA_FILE};
pub use column::{densify, ColumnValues, DType, FeatureColumn, Scalar, SparseColumn};
pub use schema::{FeatureSchema, KeyClass, KDD_NUMERICAL_COUNT};
pub use transform::{preprocess, TransformPolicy};

/// Raw feature columns keyed by feature name.
pub type RawFeatures = BTreeMap<String, FeatureColumn>;

/// Transformed feature columns keyed by feature name.
pub type TransformedFeatures = BTreeMap<String, FeatureColumn>;
