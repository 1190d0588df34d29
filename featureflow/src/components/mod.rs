//! Concrete pipeline stages for the KDD preprocessing flow.
//!
//! Every stage reads the paths its dependencies published in their output
//! data, writes its own files under `<pipeline_root>/<stage_name>` and
//! publishes the resulting paths for its dependents.

mod demo;
mod example_gen;
mod file_loader;
mod statistics;
mod trainer;
mod transform;
mod validator;

pub use demo::DemoStage;
pub use example_gen::{hash_bucket, split_buckets, CsvExampleGenStage};
#[cfg(feature = "download")]
pub use file_loader::download_kdd99;
pub use file_loader::{kdd_column_names, FileLoaderStage, KDD99_URL, SOURCE_SPLITS};
pub use statistics::{
    DatasetStatistics, FeatureStatistics, NumericSummary, SplitStatistics, StatisticsAccumulator, StatisticsStage,
    STATISTICS_FILE,
};
pub use trainer::TrainerInputStage;
pub use transform::TransformStage;
pub use validator::{validate_statistics, Anomaly, AnomalyKind, ExampleValidatorStage, ANOMALIES_FILE};

use crate::core::StageOutput;
use crate::dataset::RECORD_FILE_NAME;
use crate::errors::Result;
use std::path::{Path, PathBuf};
use tracing::error;

/// Name of the split analysis is fitted on.
pub const SPLIT_TRAIN: &str = "train";

/// Name of the held-out split.
pub const SPLIT_EVAL: &str = "eval";

/// Path of the record file of `split` under `dir`.
#[must_use]
pub fn split_record_file(dir: &Path, split: &str) -> PathBuf {
    dir.join(split).join(RECORD_FILE_NAME)
}

/// Runs blocking stage work off the async executor and folds errors into a
/// failed output.
pub(crate) async fn run_blocking<F>(stage: &str, work: F) -> StageOutput
where
    F: FnOnce() -> Result<StageOutput> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            error!(stage, code = e.code(), error = %e, "Stage work failed");
            StageOutput::fail(e.to_string())
        }
        Err(e) => {
            error!(stage, error = %e, "Stage task did not complete");
            StageOutput::fail(format!("stage task did not complete: {e}"))
        }
    }
}
