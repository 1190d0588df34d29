//! Artifacts written by stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A file or directory a stage wrote under the pipeline root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageArtifact {
    /// The artifact type (e.g. "examples", "statistics", "transform_graph").
    #[serde(rename = "type")]
    pub artifact_type: String,

    /// Name within the producing stage (e.g. "train").
    pub name: String,

    /// Location on disk.
    pub uri: PathBuf,

    /// Additional metadata such as record counts.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// When the artifact was created (ISO 8601).
    pub created_at: String,
}

impl StageArtifact {
    /// Creates an artifact stamped with the current time.
    #[must_use]
    pub fn new(artifact_type: impl Into<String>, name: impl Into<String>, uri: impl Into<PathBuf>) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            name: name.into(),
            uri: uri.into(),
            metadata: BTreeMap::new(),
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The artifact location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_serializes_type_field() {
        let artifact = StageArtifact::new("examples", "train", "/tmp/root/examples/train")
            .with_metadata("records", serde_json::json!(120));

        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["type"], "examples");
        assert_eq!(json["metadata"]["records"], 120);
        assert_eq!(artifact.path(), Path::new("/tmp/root/examples/train"));
    }
}
