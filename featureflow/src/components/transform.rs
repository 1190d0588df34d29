//! Fits the transform on the train split and applies it to both splits.

use super::{run_blocking, split_record_file, SPLIT_EVAL, SPLIT_TRAIN};
use crate::context::StageContext;
use crate::core::{StageArtifact, StageOutput};
use crate::dataset::{columns_to_records, read_records, records_to_columns, records_to_fitted_columns, write_records};
use crate::errors::Result;
use crate::features::{preprocess, FeatureSchema, TransformPolicy, FITTED_SCHEMA_FILE};
use crate::stages::Stage;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Transforms the examples published by `source`.
///
/// Publishes `transform_graph_uri`, `train_uri` and `eval_uri`.
#[derive(Debug, Clone)]
pub struct TransformStage {
    name: String,
    source: String,
    schema: Arc<FeatureSchema>,
}

impl TransformStage {
    /// Creates a transform stage reading the examples published by `source`.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>, schema: Arc<FeatureSchema>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            schema,
        }
    }
}

#[async_trait]
impl Stage for TransformStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let paths = ctx
            .inputs()
            .require_path(&self.source, "train_uri")
            .and_then(|train| Ok((train, ctx.inputs().require_path(&self.source, "eval_uri")?)));
        let (train, eval) = match paths {
            Ok(paths) => paths,
            Err(e) => return StageOutput::fail(e.to_string()),
        };

        let schema = Arc::clone(&self.schema);
        let out_dir = ctx.stage_dir();
        run_blocking(&self.name, move || transform_splits(&schema, &train, &eval, &out_dir)).await
    }
}

fn transform_splits(schema: &FeatureSchema, train: &Path, eval: &Path, out_dir: &Path) -> Result<StageOutput> {
    let train_raw = records_to_columns(schema, &read_records(train)?)?;
    let (fitted, train_transformed) = preprocess(schema, &train_raw)?;

    let graph_path = out_dir.join(FITTED_SCHEMA_FILE);
    fitted.save(&graph_path)?;

    let eval_raw = records_to_fitted_columns(&fitted, &read_records(eval)?)?;
    let eval_transformed = TransformPolicy::new(Arc::clone(&fitted)).transform(&eval_raw)?;

    let train_path: PathBuf = split_record_file(out_dir, SPLIT_TRAIN);
    let eval_path: PathBuf = split_record_file(out_dir, SPLIT_EVAL);
    let train_records = write_records(&train_path, &columns_to_records(&train_transformed)?)?;
    let eval_records = write_records(&eval_path, &columns_to_records(&eval_transformed)?)?;

    info!(
        fingerprint = %fitted.fingerprint(),
        train_records,
        eval_records,
        "Transformed examples"
    );

    Ok(StageOutput::ok(HashMap::from([
        ("transform_graph_uri".to_string(), json!(graph_path.display().to_string())),
        ("train_uri".to_string(), json!(train_path.display().to_string())),
        ("eval_uri".to_string(), json!(eval_path.display().to_string())),
    ]))
    .with_artifacts([
        StageArtifact::new("transform_graph", "fitted", &graph_path)
            .with_metadata("fingerprint", json!(fitted.fingerprint())),
        StageArtifact::new("transformed_examples", SPLIT_TRAIN, &train_path).with_metadata("records", json!(train_records)),
        StageArtifact::new("transformed_examples", SPLIT_EVAL, &eval_path).with_metadata("records", json!(eval_records)),
    ]))
}
