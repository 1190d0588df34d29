//! Static feature schema: which keys are numerical, categorical or labels.

use crate::errors::{FeatureflowError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Number of numerical columns in the KDD Cup 99 layout.
pub const KDD_NUMERICAL_COUNT: usize = 38;

/// The class a feature key belongs to, which decides its transform policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyClass {
    /// Scalar numeric measurement, z-scored then scaled to [0, 1].
    Numerical,
    /// Scalar categorical value, densified only.
    Categorical,
    /// Supervised target, passed through untouched.
    Label,
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numerical => write!(f, "numerical"),
            Self::Categorical => write!(f, "categorical"),
            Self::Label => write!(f, "label"),
        }
    }
}

/// Immutable description of the feature keys of a dataset.
///
/// Built once at process start and shared by reference (usually behind an
/// `Arc`). The three key lists are pairwise disjoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    numerical_keys: Vec<String>,
    categorical_keys: Vec<String>,
    label_keys: Vec<String>,
    /// Vocabulary capacity for downstream categorical encoders.
    vocab_size: usize,
    /// Out-of-vocabulary bucket count for downstream categorical encoders.
    oov_size: usize,
}

impl FeatureSchema {
    /// Creates a validated schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` if a key is empty, duplicated, or appears in
    /// more than one class.
    pub fn new<N, C, L>(
        numerical_keys: N,
        categorical_keys: C,
        label_keys: L,
        vocab_size: usize,
        oov_size: usize,
    ) -> Result<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let schema = Self {
            numerical_keys: numerical_keys.into_iter().map(Into::into).collect(),
            categorical_keys: categorical_keys.into_iter().map(Into::into).collect(),
            label_keys: label_keys.into_iter().map(Into::into).collect(),
            vocab_size,
            oov_size,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// The KDD Cup 99 schema: `num_0..num_37`, three categorical columns and
    /// a single label.
    #[must_use]
    pub fn kdd() -> Self {
        Self {
            numerical_keys: (0..KDD_NUMERICAL_COUNT).map(|i| format!("num_{i}")).collect(),
            categorical_keys: vec![
                "transport_protocol".to_string(),
                "application_protocol".to_string(),
                "cat_0".to_string(),
            ],
            label_keys: vec!["label_0".to_string()],
            vocab_size: 100,
            oov_size: 10,
        }
    }

    /// Loads a schema from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error if the file cannot be read, and
    /// `InvalidSchema` if the decoded schema is inconsistent.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let schema: Self = serde_json::from_str(&raw)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks key disjointness and naming.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSchema` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for key in self.all_keys() {
            if key.trim().is_empty() {
                return Err(FeatureflowError::InvalidSchema(
                    "feature keys cannot be empty".to_string(),
                ));
            }
            if !seen.insert(key) {
                return Err(FeatureflowError::InvalidSchema(format!(
                    "key '{key}' is declared more than once"
                )));
            }
        }
        Ok(())
    }

    /// Numerical keys, in declaration order.
    #[must_use]
    pub fn numerical_keys(&self) -> &[String] {
        &self.numerical_keys
    }

    /// Categorical keys, in declaration order.
    #[must_use]
    pub fn categorical_keys(&self) -> &[String] {
        &self.categorical_keys
    }

    /// Label keys, in declaration order.
    #[must_use]
    pub fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    /// Vocabulary size for categorical encoders.
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// OOV bucket count for categorical encoders.
    #[must_use]
    pub fn oov_size(&self) -> usize {
        self.oov_size
    }

    /// All keys: numerical, then categorical, then labels.
    pub fn all_keys(&self) -> impl Iterator<Item = &str> {
        self.numerical_keys
            .iter()
            .chain(&self.categorical_keys)
            .chain(&self.label_keys)
            .map(String::as_str)
    }

    /// Total number of keys across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.numerical_keys.len() + self.categorical_keys.len() + self.label_keys.len()
    }

    /// Returns true if the schema declares no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classifies a key, or `None` if the schema does not declare it.
    #[must_use]
    pub fn key_class(&self, key: &str) -> Option<KeyClass> {
        if self.numerical_keys.iter().any(|k| k == key) {
            Some(KeyClass::Numerical)
        } else if self.categorical_keys.iter().any(|k| k == key) {
            Some(KeyClass::Categorical)
        } else if self.label_keys.iter().any(|k| k == key) {
            Some(KeyClass::Label)
        } else {
            None
        }
    }

    /// Returns true if the schema declares `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.key_class(key).is_some()
    }

    /// The first label key, which training uses as its target.
    #[must_use]
    pub fn primary_label(&self) -> Option<&str> {
        self.label_keys.first().map(String::as_str)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::kdd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdd_schema_layout() {
        let schema = FeatureSchema::kdd();
        assert_eq!(schema.numerical_keys().len(), 38);
        assert_eq!(schema.numerical_keys()[0], "num_0");
        assert_eq!(schema.numerical_keys()[37], "num_37");
        assert_eq!(
            schema.categorical_keys(),
            ["transport_protocol", "application_protocol", "cat_0"]
        );
        assert_eq!(schema.label_keys(), ["label_0"]);
        assert_eq!(schema.vocab_size(), 100);
        assert_eq!(schema.oov_size(), 10);
        assert_eq!(schema.len(), 42);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_key_class() {
        let schema = FeatureSchema::kdd();
        assert_eq!(schema.key_class("num_5"), Some(KeyClass::Numerical));
        assert_eq!(schema.key_class("cat_0"), Some(KeyClass::Categorical));
        assert_eq!(schema.key_class("label_0"), Some(KeyClass::Label));
        assert_eq!(schema.key_class("tips"), None);
        assert_eq!(schema.primary_label(), Some("label_0"));
    }

    #[test]
    fn test_overlapping_classes_rejected() {
        let result = FeatureSchema::new(["a", "b"], ["b"], ["y"], 10, 1);
        assert!(matches!(result, Err(FeatureflowError::InvalidSchema(_))));
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = FeatureSchema::new(["a"], [" "], ["y"], 10, 1);
        assert!(matches!(result, Err(FeatureflowError::InvalidSchema(_))));
    }

    #[test]
    fn test_all_keys_order() {
        let schema = FeatureSchema::new(["n1", "n0"], ["c"], ["y"], 10, 1).unwrap();
        let keys: Vec<&str> = schema.all_keys().collect();
        assert_eq!(keys, vec!["n1", "n0", "c", "y"]);
    }

    #[test]
    fn test_from_json_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"numerical_keys":["x"],"categorical_keys":["x"],"label_keys":["y"],"vocab_size":5,"oov_size":1}"#,
        )
        .unwrap();

        assert!(matches!(
            FeatureSchema::from_json_file(&path),
            Err(FeatureflowError::InvalidSchema(_))
        ));

        let good = FeatureSchema::kdd();
        std::fs::write(&path, serde_json::to_string(&good).unwrap()).unwrap();
        assert_eq!(FeatureSchema::from_json_file(&path).unwrap(), good);
    }
}
