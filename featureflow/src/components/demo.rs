//! A stage that only reports that it ran.

use crate::context::StageContext;
use crate::core::StageOutput;
use crate::stages::Stage;
use async_trait::async_trait;
use tracing::info;

/// Logs its arrival together with its parameters and succeeds.
#[derive(Debug, Clone)]
pub struct DemoStage {
    name: String,
}

impl DemoStage {
    /// Creates a demo stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for DemoStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        info!(
            stage = %self.name,
            split = ctx.param_str("split").unwrap_or("-"),
            "Arrived in demo stage"
        );
        StageOutput::ok_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support::stage_context;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_demo_stage_succeeds_without_output() {
        let root = tempfile::tempdir().unwrap();
        let ctx = stage_context(root.path(), "file_loader", HashMap::new(), HashMap::new());

        let output = DemoStage::new("file_loader").execute(&ctx).await;
        assert!(output.is_success());
        assert!(output.data.is_none());
        assert!(!root.path().join("file_loader").exists());
    }
}
