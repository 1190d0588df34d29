//! CSV ingestion into gzip record splits.

use super::{run_blocking, split_record_file, SPLIT_EVAL, SPLIT_TRAIN};
use crate::context::StageContext;
use crate::core::{StageArtifact, StageOutput};
use crate::dataset::{GzipRecordWriter, Record};
use crate::errors::{FeatureflowError, Result};
use crate::features::{FeatureSchema, KeyClass};
use crate::stages::Stage;
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Maps a row onto one of `buckets` buckets by its MD5 digest.
///
/// The same row always lands in the same bucket.
#[must_use]
pub fn hash_bucket(row: &str, buckets: u32) -> u32 {
    let digest = Md5::digest(row.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(head) % u64::from(buckets.max(1));
    u32::try_from(bucket).unwrap_or(0)
}

/// Reads a headered CSV and writes `train` and `eval` record files.
///
/// Reads the `input_csv` parameter. Empty cells become `null`, numerical
/// cells are parsed as floats, label cells as integers when integral and
/// text otherwise. Cells of a numerical column that do not parse are kept as
/// text so that validation can report them.
#[derive(Debug, Clone)]
pub struct CsvExampleGenStage {
    name: String,
    schema: Arc<FeatureSchema>,
    train_buckets: u32,
    eval_buckets: u32,
}

impl CsvExampleGenStage {
    /// Creates a stage with a 2:1 train/eval split.
    #[must_use]
    pub fn new(name: impl Into<String>, schema: Arc<FeatureSchema>) -> Self {
        Self {
            name: name.into(),
            schema,
            train_buckets: 2,
            eval_buckets: 1,
        }
    }

    /// Sets the hash buckets assigned to each split.
    #[must_use]
    pub fn with_split_buckets(mut self, train_buckets: u32, eval_buckets: u32) -> Self {
        self.train_buckets = train_buckets;
        self.eval_buckets = eval_buckets;
        self
    }
}

#[async_trait]
impl Stage for CsvExampleGenStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(input) = ctx.param_str("input_csv").map(PathBuf::from) else {
            return StageOutput::fail("example gen requires an 'input_csv' parameter");
        };
        let total_buckets = match split_buckets(self.train_buckets, self.eval_buckets) {
            Ok(total) => total,
            Err(e) => return StageOutput::fail(e.to_string()),
        };

        let split = Splitter {
            schema: Arc::clone(&self.schema),
            train_buckets: self.train_buckets,
            total_buckets,
        };
        let out_dir = ctx.stage_dir();
        run_blocking(&self.name, move || split.run(&input, &out_dir)).await
    }
}

/// Total bucket count of a train/eval split.
///
/// # Errors
///
/// Returns `InvalidConfig` if either split has no bucket or the total does
/// not fit in a `u32`.
pub fn split_buckets(train_buckets: u32, eval_buckets: u32) -> Result<u32> {
    if train_buckets == 0 || eval_buckets == 0 {
        return Err(FeatureflowError::InvalidConfig(
            "both splits need at least one hash bucket".to_string(),
        ));
    }
    train_buckets.checked_add(eval_buckets).ok_or_else(|| {
        FeatureflowError::InvalidConfig(format!(
            "{train_buckets} train and {eval_buckets} eval hash buckets overflow the bucket count"
        ))
    })
}

struct Splitter {
    schema: Arc<FeatureSchema>,
    train_buckets: u32,
    total_buckets: u32,
}

impl Splitter {
    fn run(&self, input: &Path, out_dir: &Path) -> Result<StageOutput> {
        if !input.is_file() {
            return Err(FeatureflowError::file_not_found(&[input.display().to_string()]));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(input)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        for key in self.schema.all_keys() {
            if !headers.iter().any(|h| h == key) {
                warn!(key, path = %input.display(), "Schema key has no CSV column");
            }
        }

        let train_path = split_record_file(out_dir, SPLIT_TRAIN);
        let eval_path = split_record_file(out_dir, SPLIT_EVAL);
        let mut train = GzipRecordWriter::create(&train_path)?;
        let mut eval = GzipRecordWriter::create(&eval_path)?;

        for row in reader.records() {
            let row = row?;
            let record: Record = headers
                .iter()
                .zip(row.iter())
                .map(|(key, cell)| (key.clone(), self.cell_value(key, cell)))
                .collect();

            let fingerprint = row.iter().collect::<Vec<_>>().join(",");
            if hash_bucket(&fingerprint, self.total_buckets) < self.train_buckets {
                train.write_record(&record)?;
            } else {
                eval.write_record(&record)?;
            }
        }

        let train_records = train.finish()?;
        let eval_records = eval.finish()?;
        info!(
            path = %input.display(),
            train_records,
            eval_records,
            "Split CSV into examples"
        );

        Ok(StageOutput::ok(HashMap::from([
            ("examples_uri".to_string(), json!(out_dir.display().to_string())),
            ("train_uri".to_string(), json!(train_path.display().to_string())),
            ("eval_uri".to_string(), json!(eval_path.display().to_string())),
        ]))
        .with_artifacts([
            StageArtifact::new("examples", SPLIT_TRAIN, &train_path).with_metadata("records", json!(train_records)),
            StageArtifact::new("examples", SPLIT_EVAL, &eval_path).with_metadata("records", json!(eval_records)),
        ])
        .add_metadata("records", json!(train_records + eval_records)))
    }

    fn cell_value(&self, key: &str, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self.schema.key_class(key) {
            Some(KeyClass::Numerical) => cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map_or_else(|| json!(cell), |v| json!(v)),
            Some(KeyClass::Label) => cell.parse::<i64>().map_or_else(|_| json!(cell), |v| json!(v)),
            Some(KeyClass::Categorical) | None => json!(cell),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support::stage_context;
    use crate::dataset::read_records;
    use pretty_assertions::assert_eq;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(FeatureSchema::new(["num_0"], ["cat_0"], ["label_0"], 10, 1).unwrap())
    }

    fn write_csv(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("input.csv");
        let mut body = String::from("num_0,cat_0,label_0\n");
        for i in 0..rows {
            body.push_str(&format!("{i}.5,{},{}\n", if i % 2 == 0 { "tcp" } else { "" }, i % 3));
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_hash_bucket_is_stable() {
        let first = hash_bucket("0,tcp,normal.", 3);
        assert_eq!(first, hash_bucket("0,tcp,normal.", 3));
        assert!(first < 3);
        assert_eq!(hash_bucket("anything", 1), 0);
    }

    #[tokio::test]
    async fn test_splits_every_row_once() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), 60);
        let params = HashMap::from([("input_csv".to_string(), json!(csv.display().to_string()))]);
        let ctx = stage_context(dir.path(), "example_gen", HashMap::new(), params);

        let output = CsvExampleGenStage::new("example_gen", schema()).execute(&ctx).await;
        assert!(output.is_success(), "{:?}", output.error);

        let train = read_records(output.get("train_uri").unwrap().as_str().unwrap()).unwrap();
        let eval = read_records(output.get("eval_uri").unwrap().as_str().unwrap()).unwrap();
        assert_eq!(train.len() + eval.len(), 60);
        assert!(!train.is_empty() && !eval.is_empty());
        assert_eq!(output.metadata.get("records"), Some(&json!(60)));
    }

    #[tokio::test]
    async fn test_cell_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("input.csv");
        std::fs::write(&csv, "num_0,cat_0,label_0,extra\n1,udp,normal.,x\n,,7,\n").unwrap();
        let params = HashMap::from([("input_csv".to_string(), json!(csv.display().to_string()))]);
        let ctx = stage_context(dir.path(), "example_gen", HashMap::new(), params);

        let output = CsvExampleGenStage::new("example_gen", schema())
            .with_split_buckets(1, 1)
            .execute(&ctx)
            .await;
        assert!(output.is_success(), "{:?}", output.error);

        let mut records = read_records(output.get("train_uri").unwrap().as_str().unwrap()).unwrap();
        records.extend(read_records(output.get("eval_uri").unwrap().as_str().unwrap()).unwrap());
        records.sort_by_key(|r| r.get("label_0").map_or(false, Value::is_string));

        assert_eq!(records.len(), 2);
        assert_eq!(Value::Object(records[0].clone()), json!({"num_0": null, "cat_0": null, "label_0": 7, "extra": null}));
        assert_eq!(
            Value::Object(records[1].clone()),
            json!({"num_0": 1.0, "cat_0": "udp", "label_0": "normal.", "extra": "x"})
        );
    }

    #[test]
    fn test_split_buckets() {
        assert_eq!(split_buckets(2, 1).unwrap(), 3);
        assert!(matches!(split_buckets(0, 1), Err(FeatureflowError::InvalidConfig(_))));
        assert!(matches!(split_buckets(u32::MAX, 1), Err(FeatureflowError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_overflowing_buckets_fail_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_csv(dir.path(), 3);
        let params = HashMap::from([("input_csv".to_string(), json!(csv.display().to_string()))]);
        let ctx = stage_context(dir.path(), "example_gen", HashMap::new(), params);

        let output = CsvExampleGenStage::new("example_gen", schema())
            .with_split_buckets(u32::MAX, u32::MAX)
            .execute(&ctx)
            .await;
        assert!(output.is_failure());
        assert!(output.error.unwrap().contains("overflow"));
    }

    #[tokio::test]
    async fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let params = HashMap::from([("input_csv".to_string(), json!("/nonexistent/kddcup.csv"))]);
        let ctx = stage_context(dir.path(), "example_gen", HashMap::new(), params);

        let output = CsvExampleGenStage::new("example_gen", schema()).execute(&ctx).await;
        assert!(output.error.unwrap().contains("No files match"));

        let ctx = stage_context(dir.path(), "example_gen", HashMap::new(), HashMap::new());
        assert!(CsvExampleGenStage::new("example_gen", schema()).execute(&ctx).await.is_failure());
    }
}
