//! Per-split, per-feature descriptive statistics.

use super::{run_blocking, SPLIT_EVAL, SPLIT_TRAIN};
use crate::context::StageContext;
use crate::core::{StageArtifact, StageOutput};
use crate::dataset::{scalar_from_json, GzipRecordReader, Record, RecordLocation};
use crate::errors::{FeatureflowError, Result};
use crate::features::{DType, Scalar};
use crate::stages::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the statistics document.
pub const STATISTICS_FILE: &str = "statistics.json";

/// Range and moments of the numeric values of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Statistics of one feature over one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatistics {
    /// Dominant dtype of the present values; `None` if every value is missing.
    pub dtype: Option<DType>,
    /// Records holding a value.
    pub count: usize,
    /// Records where the value is `null` or absent.
    pub missing: usize,
    /// True when text and numbers are mixed.
    #[serde(default)]
    pub mixed_types: bool,
    /// Present for features with numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericSummary>,
    /// Number of distinct values, for text and integer features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<usize>,
}

/// Statistics of every feature seen in one split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitStatistics {
    /// Number of records in the split.
    pub records: usize,
    /// Per-feature statistics, keyed by feature name.
    pub features: BTreeMap<String, FeatureStatistics>,
}

/// Statistics of all splits of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    /// Per-split statistics, keyed by split name.
    pub splits: BTreeMap<String, SplitStatistics>,
}

impl DatasetStatistics {
    /// Writes the statistics as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// Reads statistics written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[derive(Debug)]
struct FeatureAccumulator {
    texts: usize,
    ints: usize,
    floats: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
    distinct: HashSet<String>,
}

impl Default for FeatureAccumulator {
    fn default() -> Self {
        Self {
            texts: 0,
            ints: 0,
            floats: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            distinct: HashSet::new(),
        }
    }
}

impl FeatureAccumulator {
    fn present(&self) -> usize {
        self.texts + self.ints + self.floats
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe_number(&mut self, x: f64) {
        let n = (self.ints + self.floats) as f64;
        let delta = x - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (x - self.mean);
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    #[allow(clippy::cast_precision_loss)]
    fn observe(&mut self, scalar: Scalar) {
        match scalar {
            Scalar::Text(s) => {
                self.texts += 1;
                self.distinct.insert(s);
            }
            Scalar::Int(i) => {
                self.ints += 1;
                self.distinct.insert(i.to_string());
                self.observe_number(i as f64);
            }
            Scalar::Float(f) => {
                self.floats += 1;
                self.observe_number(f);
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self, records: usize) -> FeatureStatistics {
        let numbers = self.ints + self.floats;
        let dtype = if self.texts > 0 {
            Some(DType::Text)
        } else if self.floats > 0 {
            Some(DType::Float)
        } else if self.ints > 0 {
            Some(DType::Int)
        } else {
            None
        };
        let numeric = (numbers > 0).then(|| NumericSummary {
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev: (self.m2 / numbers as f64).sqrt(),
        });
        let distinct = (self.texts > 0 || (self.ints > 0 && self.floats == 0)).then_some(self.distinct.len());

        FeatureStatistics {
            dtype,
            count: self.present(),
            missing: records - self.present(),
            mixed_types: self.texts > 0 && numbers > 0,
            numeric,
            distinct,
        }
    }
}

/// Streams records into per-feature statistics.
#[derive(Debug, Default)]
pub struct StatisticsAccumulator {
    records: usize,
    features: BTreeMap<String, FeatureAccumulator>,
}

impl StatisticsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record. Keys never seen before start with every earlier
    /// record counted as missing.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` for a non-scalar value.
    pub fn observe(&mut self, record: &Record) -> Result<()> {
        self.records += 1;
        for (key, value) in record {
            let feature = self.features.entry(key.clone()).or_default();
            if let Some(scalar) = scalar_from_json(key, value)? {
                feature.observe(scalar);
            }
        }
        Ok(())
    }

    /// Number of records observed.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Finalizes the statistics.
    #[must_use]
    pub fn finish(self) -> SplitStatistics {
        let records = self.records;
        SplitStatistics {
            records,
            features: self
                .features
                .into_iter()
                .map(|(key, acc)| (key, acc.finish(records)))
                .collect(),
        }
    }
}

fn split_statistics(path: &Path) -> Result<SplitStatistics> {
    let mut acc = StatisticsAccumulator::new();
    for item in GzipRecordReader::open(path)? {
        let (line, text) = item?;
        let record: Record = serde_json::from_str(&text).map_err(|e| {
            let location = RecordLocation { path, line };
            FeatureflowError::schema_mismatch("<record>", format!("{location}: not a JSON object: {e}"))
        })?;
        acc.observe(&record)?;
    }
    debug!(path = %path.display(), records = acc.records(), "Computed split statistics");
    Ok(acc.finish())
}

/// Computes statistics of the `train` and `eval` examples of `source`.
///
/// Publishes `statistics_uri`.
#[derive(Debug, Clone)]
pub struct StatisticsStage {
    name: String,
    source: String,
}

impl StatisticsStage {
    /// Creates a stage reading the examples published by `source`.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

#[async_trait]
impl Stage for StatisticsStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let inputs = [SPLIT_TRAIN, SPLIT_EVAL]
            .into_iter()
            .map(|split| {
                ctx.inputs()
                    .require_path(&self.source, &format!("{split}_uri"))
                    .map(|path| (split.to_string(), path))
            })
            .collect::<Result<Vec<(String, PathBuf)>>>();
        let inputs = match inputs {
            Ok(inputs) => inputs,
            Err(e) => return StageOutput::fail(e.to_string()),
        };

        let target = ctx.stage_dir().join(STATISTICS_FILE);
        run_blocking(&self.name, move || {
            let mut stats = DatasetStatistics::default();
            for (split, path) in inputs {
                stats.splits.insert(split, split_statistics(&path)?);
            }
            stats.save(&target)?;

            let records: usize = stats.splits.values().map(|s| s.records).sum();
            info!(path = %target.display(), records, "Wrote statistics");
            Ok(StageOutput::ok_value("statistics_uri", json!(target.display().to_string()))
                .with_artifact(StageArtifact::new("statistics", "examples", &target))
                .add_metadata("records", json!(records)))
        })
        .await
    }
}
