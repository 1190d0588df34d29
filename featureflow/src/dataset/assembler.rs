//! Lazy batching of transformed record files.

use super::codec::{parse_record, RecordLocation};
use super::io::{resolve_file_patterns, GzipRecordReader};
use crate::errors::{FeatureflowError, Result};
use crate::features::{ColumnValues, FeatureSpec, FittedTransformSchema};
use std::collections::{BTreeMap, VecDeque};
use std::iter::FusedIterator;
use std::path::PathBuf;
use tracing::{debug, info};

/// Default batch size for [`DatasetOptions`].
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// One batch of consecutive records.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Feature columns, excluding the label key.
    pub features: BTreeMap<String, ColumnValues>,
    /// The label column.
    pub label: ColumnValues,
}

impl Batch {
    /// Number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.label.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }
}

/// A forward-only stream of batches over resolved record files.
///
/// Files are opened one at a time; the current file is closed once it is
/// exhausted. After the first error the stream yields nothing further.
pub struct BatchedDataset {
    files: VecDeque<PathBuf>,
    reader: Option<GzipRecordReader>,
    spec: BTreeMap<String, FeatureSpec>,
    label_key: String,
    batch_size: usize,
    done: bool,
}

impl BatchedDataset {
    /// The configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The label key split out of each batch.
    #[must_use]
    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    fn empty_columns(&self) -> BTreeMap<String, ColumnValues> {
        self.spec
            .iter()
            .map(|(key, spec)| (key.clone(), ColumnValues::empty(spec.dtype)))
            .collect()
    }

    fn next_line(&mut self) -> Result<Option<(PathBuf, usize, String)>> {
        loop {
            if self.reader.is_none() {
                let Some(path) = self.files.pop_front() else {
                    return Ok(None);
                };
                debug!(path = %path.display(), "Opening record file");
                self.reader = Some(GzipRecordReader::open(&path)?);
            }

            let Some(reader) = self.reader.as_mut() else {
                continue;
            };
            match reader.next() {
                Some(item) => {
                    let (line, text) = item?;
                    return Ok(Some((reader.path().to_path_buf(), line, text)));
                }
                None => self.reader = None,
            }
        }
    }

    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let mut columns = self.empty_columns();
        let mut rows = 0;

        while rows < self.batch_size {
            let Some((path, line, text)) = self.next_line()? else {
                break;
            };
            let location = RecordLocation { path: &path, line };
            for (key, scalar) in parse_record(&text, &self.spec, location)? {
                if let Some(column) = columns.get_mut(&key) {
                    column.push(&key, scalar)?;
                }
            }
            rows += 1;
        }

        if rows == 0 {
            return Ok(None);
        }
        let label = columns
            .remove(&self.label_key)
            .ok_or_else(|| FeatureflowError::key_not_found(self.label_key.clone()))?;
        Ok(Some(Batch {
            features: columns,
            label,
        }))
    }
}

impl Iterator for BatchedDataset {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.reader = None;
                self.files.clear();
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for BatchedDataset {}

/// Builds a batched dataset over transformed record files.
///
/// # Errors
///
/// Returns `InvalidConfig` for a zero batch size, `KeyNotFound` if
/// `label_key` is not a transformed feature, and `FileNotFound` if no file
/// matches `file_patterns`.
pub fn build_dataset<S: AsRef<str>>(
    file_patterns: &[S],
    schema: &FittedTransformSchema,
    batch_size: usize,
    label_key: &str,
) -> Result<BatchedDataset> {
    if batch_size == 0 {
        return Err(FeatureflowError::InvalidConfig(
            "batch_size must be greater than zero".to_string(),
        ));
    }
    if !schema.feature_spec().contains_key(label_key) {
        return Err(FeatureflowError::key_not_found(label_key));
    }
    let files = resolve_file_patterns(file_patterns)?;

    info!(files = files.len(), batch_size, label_key, "Built batched dataset");
    Ok(BatchedDataset {
        files: files.into(),
        reader: None,
        spec: schema.feature_spec().clone(),
        label_key: label_key.to_string(),
        batch_size,
        done: false,
    })
}

/// Batch size and label key for [`build_dataset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetOptions {
    /// Records per batch.
    pub batch_size: usize,
    /// Key split out as [`Batch::label`].
    pub label_key: String,
}

impl DatasetOptions {
    /// Creates options with an explicit batch size and label key.
    #[must_use]
    pub fn new(batch_size: usize, label_key: impl Into<String>) -> Self {
        Self {
            batch_size,
            label_key: label_key.into(),
        }
    }
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, "label_0")
    }
}

/// Builds the train and eval datasets with shared options.
///
/// # Errors
///
/// Propagates [`build_dataset`] errors for either split.
pub fn build_train_eval<S: AsRef<str>>(
    train_patterns: &[S],
    eval_patterns: &[S],
    schema: &FittedTransformSchema,
    options: &DatasetOptions,
) -> Result<(BatchedDataset, BatchedDataset)> {
    let train = build_dataset(train_patterns, schema, options.batch_size, &options.label_key)?;
    let eval = build_dataset(eval_patterns, schema, options.batch_size, &options.label_key)?;
    Ok((train, eval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::codec::Record;
    use crate::dataset::io::write_records;
    use crate::features::{DType, FeatureSchema, NumericStats};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn fitted() -> FittedTransformSchema {
        let schema = FeatureSchema::new(["num_0"], ["cat_0"], ["label_0"], 100, 10).unwrap();
        let mut numeric = BTreeMap::new();
        numeric.insert("num_0".to_string(), NumericStats::fit(&[0.0, 1.0]));
        let mut spec = BTreeMap::new();
        spec.insert("num_0".to_string(), FeatureSpec::scalar(DType::Float));
        spec.insert("cat_0".to_string(), FeatureSpec::scalar(DType::Text));
        spec.insert("label_0".to_string(), FeatureSpec::scalar(DType::Int));
        FittedTransformSchema::from_parts(schema, numeric, spec).unwrap()
    }

    fn records(range: std::ops::Range<i64>) -> Vec<Record> {
        range
            .map(|i| {
                json!({"num_0": 0.5, "cat_0": format!("c{i}"), "label_0": i})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    fn write(dir: &Path, name: &str, range: std::ops::Range<i64>) {
        write_records(dir.join(name), &records(range)).unwrap();
    }

    fn labels(batch: &Batch) -> Vec<i64> {
        match &batch.label {
            ColumnValues::Int(v) => v.clone(),
            other => panic!("unexpected label column {other:?}"),
        }
    }

    #[test]
    fn test_batches_span_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "part-0.gz", 0..30);
        write(dir.path(), "part-1.gz", 30..70);
        write(dir.path(), "part-2.gz", 70..100);

        let pattern = format!("{}/part-*.gz", dir.path().display());
        let batches: Vec<Batch> = build_dataset(&[pattern], &fitted(), 40, "label_0")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![40, 40, 20]);

        let all: Vec<i64> = batches.iter().flat_map(labels).collect();
        assert_eq!(all, (0..100).collect::<Vec<_>>());

        let keys: Vec<&String> = batches[0].features.keys().collect();
        assert_eq!(keys, vec!["cat_0", "num_0"]);
    }

    #[test]
    fn test_rebuild_reproduces_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.gz", 0..7);
        let pattern = format!("{}/a.gz", dir.path().display());

        let first: Vec<Batch> = build_dataset(&[&pattern], &fitted(), 3, "label_0")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let second: Vec<Batch> = build_dataset(&[&pattern], &fitted(), 3, "label_0")
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_build_time_errors() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.gz", 0..2);
        let pattern = format!("{}/a.gz", dir.path().display());

        assert!(matches!(
            build_dataset::<&str>(&[], &fitted(), 40, "label_0"),
            Err(FeatureflowError::FileNotFound { .. })
        ));
        assert!(matches!(
            build_dataset(&[&pattern], &fitted(), 40, "tips"),
            Err(FeatureflowError::KeyNotFound { ref key }) if key == "tips"
        ));
        assert!(matches!(
            build_dataset(&[&pattern], &fitted(), 0, "label_0"),
            Err(FeatureflowError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_fuses_stream() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = records(0..3);
        bad[1].insert("num_0".into(), json!([1.0, 2.0]));
        write_records(dir.path().join("bad.gz"), &bad).unwrap();
        let pattern = format!("{}/bad.gz", dir.path().display());

        let mut dataset = build_dataset(&[pattern], &fitted(), 2, "label_0").unwrap();
        assert!(matches!(
            dataset.next(),
            Some(Err(FeatureflowError::SchemaMismatch { ref key, .. })) if key == "num_0"
        ));
        assert!(dataset.next().is_none());
    }

    #[test]
    fn test_build_train_eval_uses_options() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "train.gz", 0..50);
        write(dir.path(), "eval.gz", 0..10);
        let train = format!("{}/train.gz", dir.path().display());
        let eval = format!("{}/eval.gz", dir.path().display());

        let options = DatasetOptions::new(40, "label_0");
        let (train, eval) = build_train_eval(&[train], &[eval], &fitted(), &options).unwrap();
        assert_eq!(train.batch_size(), 40);
        assert_eq!(train.count(), 2);
        assert_eq!(eval.count(), 1);
    }
}
