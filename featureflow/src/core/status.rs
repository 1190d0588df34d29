//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a stage plays in a preprocessing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Brings raw data into the pipeline root.
    Ingest,
    /// Computes statistics over examples.
    Analyze,
    /// Checks examples or statistics against the schema.
    Validate,
    /// Fits and applies the feature transform.
    Transform,
    /// Feeds transformed data to a trainer.
    Train,
    /// Any other unit of work.
    #[default]
    Work,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingest => "ingest",
            Self::Analyze => "analyze",
            Self::Validate => "validate",
            Self::Transform => "transform",
            Self::Train => "train",
            Self::Work => "work",
        };
        f.write_str(name)
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage was skipped.
    Skip,
    /// Stage failed.
    Fail,
    /// Stage is waiting on its dependencies.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "ok",
            Self::Skip => "skip",
            Self::Fail => "fail",
            Self::Pending => "pending",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

impl StageStatus {
    /// Returns true if the stage will not change status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip | Self::Fail)
    }

    /// Returns true if downstream stages may run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}
