//! Stage inputs with strictness enforcement.

use crate::errors::{FeatureflowError, Result, UndeclaredDependencyError};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Output data of one stage, as seen by its dependents.
pub type StageData = HashMap<String, Value>;

/// An immutable view of the outputs of completed stages.
///
/// In strict mode only declared dependencies can be read.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    outputs: HashMap<String, StageData>,
    declared_dependencies: HashSet<String>,
    stage_name: String,
    strict: bool,
}

impl StageInputs {
    /// Creates inputs for `stage_name`.
    #[must_use]
    pub fn new(
        outputs: HashMap<String, StageData>,
        declared_dependencies: HashSet<String>,
        stage_name: impl Into<String>,
        strict: bool,
    ) -> Self {
        Self {
            outputs,
            declared_dependencies,
            stage_name: stage_name.into(),
            strict,
        }
    }

    /// Creates inputs where every available output is readable.
    #[must_use]
    pub fn permissive(outputs: HashMap<String, StageData>, stage_name: impl Into<String>) -> Self {
        Self {
            declared_dependencies: outputs.keys().cloned().collect(),
            outputs,
            stage_name: stage_name.into(),
            strict: false,
        }
    }

    fn check(&self, stage: &str) -> std::result::Result<(), UndeclaredDependencyError> {
        if self.strict && !self.declared_dependencies.contains(stage) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, stage));
        }
        Ok(())
    }

    /// Gets the output data of `stage`.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if `stage` is not a
    /// declared dependency.
    pub fn get(&self, stage: &str) -> std::result::Result<Option<&StageData>, UndeclaredDependencyError> {
        self.check(stage)?;
        Ok(self.outputs.get(stage))
    }

    /// Gets one value from the output of `stage`.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if `stage` is not a
    /// declared dependency.
    pub fn get_value(&self, stage: &str, key: &str) -> std::result::Result<Option<&Value>, UndeclaredDependencyError> {
        self.check(stage)?;
        Ok(self.outputs.get(stage).and_then(|o| o.get(key)))
    }

    /// Gets a string value that the stage cannot run without.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependency` for an undeclared stage and
    /// `KeyNotFound` (naming `stage.key`) if the value is absent or not a
    /// string.
    pub fn require_str(&self, stage: &str, key: &str) -> Result<&str> {
        self.get_value(stage, key)?
            .and_then(Value::as_str)
            .ok_or_else(|| FeatureflowError::key_not_found(format!("{stage}.{key}")))
    }

    /// Like [`require_str`](Self::require_str), as a path.
    ///
    /// # Errors
    ///
    /// See [`require_str`](Self::require_str).
    pub fn require_path(&self, stage: &str, key: &str) -> Result<PathBuf> {
        self.require_str(stage, key).map(PathBuf::from)
    }

    /// Returns true if `stage` has produced output.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.outputs.contains_key(stage)
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &HashSet<String> {
        &self.declared_dependencies
    }

    /// Returns whether strict mode is enabled.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.strict
    }
}
