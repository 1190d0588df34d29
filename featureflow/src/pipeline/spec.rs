//! Stage specifications.

use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A stage as placed in a pipeline: runner, dependencies and parameters.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// Names of stages this stage depends on.
    pub dependencies: HashSet<String>,
    /// The kind of stage.
    pub kind: StageKind,
    /// Execution parameters handed to the stage.
    pub params: HashMap<String, Value>,
}

impl StageSpec {
    /// Creates a stage specification with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: HashSet::new(),
            kind: StageKind::Work,
            params: HashMap::new(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets the stage kind.
    #[must_use]
    pub fn with_kind(mut self, kind: StageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Adds an execution parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage depends on itself.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;
    use serde_json::json;

    #[test]
    fn test_stage_spec_builder() {
        let spec = StageSpec::new("transform", Arc::new(NoOpStage::new("transform")))
            .with_dependencies(["example_gen"])
            .with_kind(StageKind::Transform)
            .with_param("fit_split", json!("train"));

        assert_eq!(spec.dependencies.len(), 1);
        assert_eq!(spec.kind, StageKind::Transform);
        assert_eq!(spec.params.get("fit_split"), Some(&json!("train")));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_stage_spec_invalid() {
        let runner = Arc::new(NoOpStage::new("loop"));
        assert!(StageSpec::new("loop", runner.clone()).with_dependency("loop").validate().is_err());
        assert!(StageSpec::new(" ", runner).validate().is_err());
    }
}
