//! I/O operations for benchmark records.
//!
//! Records are persisted as JSON Lines: one object per line, appended in
//! insertion order. A single writer per sink file is assumed; there is no
//! locking.

use crate::result::BenchmarkRecord;
use llm_locality_core::SinkWriteError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default sink path.
pub const DEFAULT_SINK: &str = "results.jsonl";

/// Append-only destination for benchmark records.
pub trait RecordSink: Send + Sync {
    /// Append one record.
    fn append(&self, record: &BenchmarkRecord) -> Result<(), SinkWriteError>;
}

/// JSON Lines file sink.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a sink writing to `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlSink {
    fn append(&self, record: &BenchmarkRecord) -> Result<(), SinkWriteError> {
        let line = serde_json::to_string(record)?;
        let io_err = |source| SinkWriteError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{line}").map_err(io_err)?;

        debug!(path = %self.path.display(), "appended benchmark record");
        Ok(())
    }
}

/// Raw records read back from a sink file.
#[derive(Debug, Default)]
pub struct RecordBatch {
    /// Successfully parsed JSON objects, in file order.
    pub records: Vec<serde_json::Value>,
    /// Lines that were not valid JSON objects.
    pub skipped: usize,
}

/// Read every JSON object from a JSON Lines file.
///
/// Blank lines are ignored. Lines that do not parse as JSON objects are
/// skipped and counted, so files written by older harness versions (or
/// truncated by an interrupted run) remain readable.
pub fn read_records(path: impl AsRef<Path>) -> io::Result<RecordBatch> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    Ok(parse_records(&content, path))
}

fn parse_records(content: &str, path: &Path) -> RecordBatch {
    let mut batch = RecordBatch::default();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) if value.is_object() => batch.records.push(value),
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), line = line_no + 1, "skipping unparseable result line");
                batch.skipped += 1;
            }
        }
    }

    batch
}

/// Write a rendered report to disk.
pub fn write_report(path: impl AsRef<Path>, contents: &str) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}
