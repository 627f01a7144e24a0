#![deny(unsafe_code)]
#![warn(missing_docs)]
//! sf-execlog
//!
//! The append-only provenance log every trusted execution lands in. One
//! JSON object per line, never mutated or removed after being written.
//! Grounded directly on `kavi.consumer.log.ExecutionLogWriter`: open for
//! append, write one line, `fsync` before returning. Reads tolerate
//! malformed lines (skip silently) since the file is append-only and never
//! rewritten in place.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use sf_core::ExecutionRecord;
use sf_error::{ErrorCode, SfError};

/// Default log location, matching the original's `~/.kavi/executions.jsonl`.
pub fn default_log_path() -> PathBuf {
    dirs_home().join(".skill-forge").join("executions.jsonl")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// Optional filters applied when reading back the log.
#[derive(Debug, Clone, Default)]
pub struct ReadFilters {
    /// Keep only records where `success == false`.
    pub only_failures: bool,
    /// Keep only records for this skill name.
    pub skill_name: Option<String>,
}

/// Appends [`ExecutionRecord`]s to a JSONL file, one per call.
#[derive(Debug, Clone)]
pub struct ExecutionLogWriter {
    path: PathBuf,
}

impl ExecutionLogWriter {
    /// Writer at the default log path.
    pub fn new() -> Self {
        Self {
            path: default_log_path(),
        }
    }

    /// Writer at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The path this writer appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `record` and append it as one line, ensuring the parent
    /// directory exists and the write is flushed to stable storage before
    /// returning.
    pub fn append(&self, record: &ExecutionRecord) -> Result<(), SfError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SfError::new(ErrorCode::StoreError, format!("create_dir_all failed: {e}"))
                    .with_context("path", parent.display().to_string())
            })?;
        }

        let mut line = serde_json::to_string(record).map_err(|e| {
            SfError::new(ErrorCode::StoreError, format!("serialize execution record failed: {e}"))
        })?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                SfError::new(ErrorCode::StoreError, format!("open execution log failed: {e}"))
                    .with_context("path", self.path.display().to_string())
            })?;

        file.write_all(line.as_bytes()).map_err(|e| {
            SfError::new(ErrorCode::StoreError, format!("write execution log failed: {e}"))
        })?;
        file.sync_all().map_err(|e| {
            SfError::new(ErrorCode::StoreError, format!("fsync execution log failed: {e}"))
        })?;
        Ok(())
    }
}

impl Default for ExecutionLogWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and filter execution records from a JSONL log at `path`.
///
/// Malformed lines are skipped silently. Returns up to the last `n`
/// matching records, oldest-to-newest (file append order preserved).
pub fn read_execution_log(path: &Path, n: usize, filters: &ReadFilters) -> Result<Vec<ExecutionRecord>, SfError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path).map_err(|e| {
        SfError::new(ErrorCode::StoreError, format!("open execution log failed: {e}"))
            .with_context("path", path.display().to_string())
    })?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ExecutionRecord = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(_) => continue,
        };

        if filters.only_failures && record.success {
            continue;
        }
        if let Some(name) = &filters.skill_name {
            if &record.skill_name != name {
                continue;
            }
        }
        records.push(record);
    }

    let len = records.len();
    if len > n {
        records.drain(0..len - n);
    }
    Ok(records)
}
