//! Feeds transformed examples to training as label-split batches.

use super::run_blocking;
use crate::context::StageContext;
use crate::core::StageOutput;
use crate::dataset::{build_train_eval, BatchedDataset, DatasetOptions};
use crate::errors::{FeatureflowError, Result};
use crate::features::FittedTransformSchema;
use crate::stages::Stage;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Builds the train and eval datasets from the output of `source` and
/// consumes up to `train_steps` and `eval_steps` batches.
///
/// The label key is the first label of the fitted schema. Publishes batch
/// and record counts per split.
#[derive(Debug, Clone)]
pub struct TrainerInputStage {
    name: String,
    source: String,
    batch_size: usize,
    train_steps: usize,
    eval_steps: usize,
}

impl TrainerInputStage {
    /// Creates a trainer input stage reading the output of `source`.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>, batch_size: usize) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            batch_size,
            train_steps: 10_000,
            eval_steps: 5_000,
        }
    }

    /// Caps the number of batches drawn from each split.
    #[must_use]
    pub fn with_steps(mut self, train_steps: usize, eval_steps: usize) -> Self {
        self.train_steps = train_steps;
        self.eval_steps = eval_steps;
        self
    }

    fn input_paths(&self, ctx: &StageContext) -> Result<(PathBuf, String, String)> {
        let inputs = ctx.inputs();
        Ok((
            inputs.require_path(&self.source, "transform_graph_uri")?,
            inputs.require_str(&self.source, "train_uri")?.to_string(),
            inputs.require_str(&self.source, "eval_uri")?.to_string(),
        ))
    }
}

fn drain(dataset: BatchedDataset, steps: usize) -> Result<(usize, usize)> {
    let mut batches = 0;
    let mut records = 0;
    for batch in dataset.take(steps) {
        let batch = batch?;
        batches += 1;
        records += batch.len();
    }
    Ok((batches, records))
}

#[async_trait]
impl Stage for TrainerInputStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let (graph, train, eval) = match self.input_paths(ctx) {
            Ok(paths) => paths,
            Err(e) => return StageOutput::fail(e.to_string()),
        };

        let batch_size = self.batch_size;
        let (train_steps, eval_steps) = (self.train_steps, self.eval_steps);
        run_blocking(&self.name, move || {
            let fitted = FittedTransformSchema::load(&graph)?;
            let label_key = fitted
                .schema()
                .primary_label()
                .ok_or_else(|| FeatureflowError::InvalidSchema("schema declares no label key".to_string()))?
                .to_string();
            let options = DatasetOptions::new(batch_size, label_key);
            let (train_ds, eval_ds) = build_train_eval(&[train], &[eval], &fitted, &options)?;

            let (train_batches, train_records) = drain(train_ds, train_steps)?;
            let (eval_batches, eval_records) = drain(eval_ds, eval_steps)?;
            info!(
                label_key = %options.label_key,
                batch_size,
                train_batches,
                train_records,
                eval_batches,
                eval_records,
                "Consumed training input"
            );

            Ok(StageOutput::ok(HashMap::from([
                ("label_key".to_string(), json!(options.label_key)),
                ("train_batches".to_string(), json!(train_batches)),
                ("train_records".to_string(), json!(train_records)),
                ("eval_batches".to_string(), json!(eval_batches)),
                ("eval_records".to_string(), json!(eval_records)),
            ]))
            .add_metadata("fingerprint", json!(fitted.fingerprint())))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::split_record_file;
    use crate::components::test_support::stage_context;
    use crate::context::StageData;
    use crate::dataset::{columns_to_records, write_records};
    use crate::features::{preprocess, ColumnValues, FeatureSchema, RawFeatures, FITTED_SCHEMA_FILE};
    use std::path::Path;

    fn transform_output(root: &Path, records: usize) -> HashMap<String, StageData> {
        let schema = FeatureSchema::new(["num_0"], Vec::<String>::new(), ["label_0"], 10, 1).unwrap();
        let mut raw = RawFeatures::new();
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f64> = (0..records).map(|i| i as f64).collect();
        raw.insert("num_0".to_string(), ColumnValues::Float(values).into());
        raw.insert("label_0".to_string(), ColumnValues::Int(vec![1; records]).into());
        let (fitted, transformed) = preprocess(&schema, &raw).unwrap();

        let dir = root.join("transform");
        fitted.save(dir.join(FITTED_SCHEMA_FILE)).unwrap();
        let rows = columns_to_records(&transformed).unwrap();
        let train = split_record_file(&dir, "train");
        let eval = split_record_file(&dir, "eval");
        write_records(&train, &rows).unwrap();
        write_records(&eval, &rows[..records / 2]).unwrap();

        HashMap::from([(
            "transform".to_string(),
            StageData::from([
                ("transform_graph_uri".to_string(), json!(dir.join(FITTED_SCHEMA_FILE).display().to_string())),
                ("train_uri".to_string(), json!(train.display().to_string())),
                ("eval_uri".to_string(), json!(eval.display().to_string())),
            ]),
        )])
    }

    #[tokio::test]
    async fn test_counts_batches_up_to_steps() {
        let root = tempfile::tempdir().unwrap();
        let ctx = stage_context(root.path(), "trainer", transform_output(root.path(), 100), HashMap::new());

        let output = TrainerInputStage::new("trainer", "transform", 40).execute(&ctx).await;
        assert!(output.is_success(), "{:?}", output.error);
        assert_eq!(output.get("label_key"), Some(&json!("label_0")));
        assert_eq!(output.get("train_batches"), Some(&json!(3)));
        assert_eq!(output.get("train_records"), Some(&json!(100)));
        assert_eq!(output.get("eval_batches"), Some(&json!(2)));
        assert_eq!(output.get("eval_records"), Some(&json!(50)));

        let output = TrainerInputStage::new("trainer", "transform", 40)
            .with_steps(2, 1)
            .execute(&ctx)
            .await;
        assert_eq!(output.get("train_records"), Some(&json!(80)));
        assert_eq!(output.get("eval_records"), Some(&json!(40)));
    }

    #[tokio::test]
    async fn test_zero_batch_size_fails() {
        let root = tempfile::tempdir().unwrap();
        let ctx = stage_context(root.path(), "trainer", transform_output(root.path(), 10), HashMap::new());

        let output = TrainerInputStage::new("trainer", "transform", 0).execute(&ctx).await;
        assert!(output.error.unwrap().contains("batch_size"));
    }
}
