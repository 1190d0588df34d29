//! Gzip-compressed, newline-delimited record files.

use super::codec::Record;
use crate::errors::{FeatureflowError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name used for record shards written by the pipeline components.
pub const RECORD_FILE_NAME: &str = "data.jsonl.gz";

/// Writes records as gzip-compressed JSON lines.
pub struct GzipRecordWriter {
    path: PathBuf,
    encoder: GzEncoder<BufWriter<File>>,
    records: usize,
}

impl GzipRecordWriter {
    /// Creates (or truncates) `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            encoder: GzEncoder::new(BufWriter::new(file), Compression::default()),
            records: 0,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an IO or serialization error.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.encoder, record)?;
        self.encoder.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Flushes the gzip trailer and returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the final flush fails.
    pub fn finish(self) -> Result<usize> {
        let mut inner = self.encoder.finish()?;
        inner.flush()?;
        debug!(path = %self.path.display(), records = self.records, "Wrote record file");
        Ok(self.records)
    }
}

/// Writes all `records` to a new gzip record file.
///
/// # Errors
///
/// Returns an IO or serialization error.
pub fn write_records(path: impl AsRef<Path>, records: &[Record]) -> Result<usize> {
    let mut writer = GzipRecordWriter::create(path)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.finish()
}

/// Lazily reads the non-blank lines of a gzip record file.
///
/// The file handle is owned by the reader and released when it is dropped.
pub struct GzipRecordReader {
    path: PathBuf,
    lines: Lines<BufReader<GzDecoder<File>>>,
    line: usize,
}

impl GzipRecordReader {
    /// Opens a gzip record file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            lines: BufReader::new(GzDecoder::new(file)).lines(),
            path,
            line: 0,
        })
    }

    /// The file being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for GzipRecordReader {
    /// `(1-based line number, line)`.
    type Item = Result<(usize, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line += 1;
            match line {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => return Some(Ok((self.line, text))),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Reads every record of a gzip record file.
///
/// # Errors
///
/// Returns an IO error, or `SchemaMismatch` for a line that is not a JSON
/// object.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let reader = GzipRecordReader::open(path.as_ref())?;
    let mut records = Vec::new();
    for item in reader {
        let (line, text) = item?;
        let record: Record = serde_json::from_str(&text).map_err(|e| {
            FeatureflowError::schema_mismatch(
                "<record>",
                format!("{}:{line}: not a JSON object: {e}", path.as_ref().display()),
            )
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Resolves file patterns to existing files.
///
/// A pattern is a literal file path, or a path whose final component holds
/// `*` / `?` wildcards matched against the entries of its parent directory.
/// Matches are sorted within each pattern, patterns keep their order, and a
/// file matched twice is listed once.
///
/// # Errors
///
/// Returns `FileNotFound` if nothing matches (including an empty pattern
/// list), `InvalidConfig` for an unusable pattern, and IO errors from
/// directory listing.
pub fn resolve_file_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        for path in resolve_one(pattern)? {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(FeatureflowError::file_not_found(patterns));
    }
    debug!(patterns = patterns.len(), files = files.len(), "Resolved file patterns");
    Ok(files)
}

fn resolve_one(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };

    if !name.contains(['*', '?']) {
        return Ok(if path.is_file() { vec![path.to_path_buf()] } else { Vec::new() });
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = wildcard_regex(name)?;
    let mut matches = Vec::new();
    for entry in std::fs::read_dir(parent)? {
        let entry_path = entry?.path();
        let matched = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| matcher.is_match(n));
        if matched && entry_path.is_file() {
            matches.push(entry_path);
        }
    }
    matches.sort();
    Ok(matches)
}

fn wildcard_regex(name: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(name.len() + 8);
    expr.push('^');
    for ch in name.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|e| FeatureflowError::InvalidConfig(format!("invalid file pattern '{name}': {e}")))
}
