//! Raw KDD file loading.

use super::run_blocking;
use crate::context::StageContext;
use crate::core::{StageArtifact, StageOutput};
use crate::errors::{FeatureflowError, Result};
use crate::features::KDD_NUMERICAL_COUNT;
use crate::stages::Stage;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Location of the 10% KDD Cup 99 archive.
pub const KDD99_URL: &str = "http://kdd.ics.uci.edu/databases/kddcup99/kddcup.data_10_percent.gz";

/// Splits the raw KDD files are published under.
pub const SOURCE_SPLITS: [&str; 3] = ["train", "test", "validate"];

/// Column names of the raw KDD Cup 99 layout, matching [`FeatureSchema::kdd`].
///
/// The archive has no header row: one leading numeric column, three
/// categorical columns, the remaining numeric columns and the label.
///
/// [`FeatureSchema::kdd`]: crate::features::FeatureSchema::kdd
#[must_use]
pub fn kdd_column_names() -> Vec<String> {
    let mut names = vec![
        "num_0".to_string(),
        "transport_protocol".to_string(),
        "application_protocol".to_string(),
        "cat_0".to_string(),
    ];
    names.extend((1..KDD_NUMERICAL_COUNT).map(|i| format!("num_{i}")));
    names.push("label_0".to_string());
    names
}

/// Name of the file holding the path of the loaded CSV.
const EXTERNAL_INPUT_FILE: &str = "external_input";

/// Copies `<data_root>/kddcup.<split>` into the pipeline root.
///
/// Reads the `split` parameter. Publishes `csv_uri` and
/// `external_input_uri`; the latter file holds the CSV path so later runs
/// can import it as external input.
#[derive(Debug, Clone)]
pub struct FileLoaderStage {
    name: String,
    data_root: PathBuf,
}

impl FileLoaderStage {
    /// Creates a loader reading from `data_root`.
    #[must_use]
    pub fn new(name: impl Into<String>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            data_root: data_root.into(),
        }
    }
}

#[async_trait]
impl Stage for FileLoaderStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let Some(split) = ctx.param_str("split").map(str::to_string) else {
            return StageOutput::fail("file loader requires a 'split' parameter");
        };
        if !SOURCE_SPLITS.contains(&split.as_str()) {
            return StageOutput::fail(format!(
                "unknown split '{split}', expected one of {}",
                SOURCE_SPLITS.join(", ")
            ));
        }

        let source = self.data_root.join(format!("kddcup.{split}"));
        let out_dir = ctx.stage_dir();
        run_blocking(&self.name, move || load_split(&source, &out_dir, &split)).await
    }
}

fn load_split(source: &Path, out_dir: &Path, split: &str) -> Result<StageOutput> {
    if !source.is_file() {
        return Err(FeatureflowError::file_not_found(&[source.display().to_string()]));
    }
    std::fs::create_dir_all(out_dir)?;

    let csv_path = out_dir.join(format!("{split}.csv"));
    let bytes = std::fs::copy(source, &csv_path)?;
    let reference = out_dir.join(EXTERNAL_INPUT_FILE);
    std::fs::write(&reference, csv_path.display().to_string())?;

    info!(split, bytes, path = %csv_path.display(), "Loaded raw split");
    Ok(StageOutput::ok(HashMap::from([
        ("csv_uri".to_string(), json!(csv_path.display().to_string())),
        ("external_input_uri".to_string(), json!(reference.display().to_string())),
    ]))
    .with_artifact(StageArtifact::new("external_input", split, &reference))
    .add_metadata("bytes", json!(bytes)))
}

/// Downloads the gzip KDD archive at `url` and writes the decompressed
/// `kddcup.csv` into `destination`, prefixed with [`kdd_column_names`] as
/// header row.
///
/// # Errors
///
/// Returns `Download` for transport or HTTP status failures and an IO error
/// if the archive cannot be decompressed or written.
#[cfg(feature = "download")]
pub async fn download_kdd99(url: &str, destination: impl AsRef<Path>) -> Result<PathBuf> {
    use flate2::read::GzDecoder;
    use std::io::{BufWriter, Write};

    let destination = destination.as_ref();
    let response = reqwest::get(url)
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| FeatureflowError::Download(format!("{url}: {e}")))?;
    let archive = response
        .bytes()
        .await
        .map_err(|e| FeatureflowError::Download(format!("{url}: {e}")))?;
    info!(url, bytes = archive.len(), "Downloaded KDD archive");

    std::fs::create_dir_all(destination)?;
    let target = destination.join("kddcup.csv");
    let mut decoder = GzDecoder::new(archive.as_ref());
    let mut writer = BufWriter::new(std::fs::File::create(&target)?);
    writeln!(writer, "{}", kdd_column_names().join(","))?;
    let written = std::io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;

    info!(path = %target.display(), bytes = written, "Decompressed KDD archive");
    Ok(target)
}
