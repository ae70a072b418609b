// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prompt pair source.
//!
//! A corpus is a delimited text file with one test case per record:
//! `prompt_cold<d>prompt_warm[<d>topic]`. The delimiter is fixed per corpus
//! (`,` or `|`) and must be agreed between the producer and the harness.

use llm_locality_core::{CorpusError, PromptPair};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default corpus path.
pub const DEFAULT_CORPUS: &str = "prompts.txt";

/// Default field delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Anything that can hand out prompt pairs by ordinal.
pub trait PromptPairSource: Send + Sync {
    /// Read the pair at 0-based `index`.
    fn read_pair(&self, index: usize) -> Result<PromptPair, CorpusError>;
}

/// Prompt pairs read from a delimited corpus file.
#[derive(Debug, Clone)]
pub struct CsvPromptSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvPromptSource {
    /// Create a source over `path` using `delimiter`.
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
        }
    }

    /// Corpus path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Field delimiter.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Read the corpus as physical lines.
    ///
    /// Every line holds one ordinal position, blank lines included.
    pub(crate) fn read_lines(&self) -> Result<Vec<String>, CorpusError> {
        let text = fs::read_to_string(&self.path).map_err(|source| CorpusError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Split one line into fields. A blank line yields no fields.
    pub(crate) fn parse_line(&self, line: &str) -> Result<csv::StringRecord, csv::Error> {
        let mut record = csv::StringRecord::new();
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(line.as_bytes())
            .read_record(&mut record)?;
        Ok(record)
    }
}

impl PromptPairSource for CsvPromptSource {
    fn read_pair(&self, index: usize) -> Result<PromptPair, CorpusError> {
        let lines = self.read_lines()?;
        let line = lines.get(index).ok_or_else(|| CorpusError::IndexOutOfRange {
            path: self.path.clone(),
            index,
            available: lines.len(),
        })?;

        let record = self.parse_line(line).map_err(|err| CorpusError::Read {
            path: self.path.clone(),
            index,
            source: Box::new(err),
        })?;
        let malformed = || CorpusError::MalformedRecord {
            index,
            fields: record.len(),
        };
        if record.len() < 2 {
            return Err(malformed());
        }

        let (cold, warm) = (record[0].trim(), record[1].trim());
        if cold.is_empty() || warm.is_empty() {
            return Err(malformed());
        }
        let topic = record
            .get(2)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        debug!(index, topic = ?topic, "read prompt pair");
        Ok(PromptPair::new(cold, warm, topic))
    }
}

/// Parse a delimiter argument. Accepts a single ASCII character.
pub fn parse_delimiter(value: &str) -> Option<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() && *b != b'\n' && *b != b'"' => Some(*b),
        _ => None,
    }
}

/// Read the shared-prefix file, if one is configured.
///
/// An empty file counts as no prefix.
pub fn load_shared_prefix(path: Option<&Path>) -> Result<Option<String>, CorpusError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(text).filter(|t| !t.is_empty()))
}

/// Join a prefix and a prompt body with a blank line.
///
/// Whitespace is trimmed only at the join point: the prefix's tail and the
/// body's head.
pub fn build_prompt(prefix: Option<&str>, body: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            format!("{}\n\n{}", prefix.trim_end(), body.trim_start())
        }
        _ => body.to_string(),
    }
}

/// Prepend `prefix` to both prompts of a pair.
///
/// Consumes the pair so a given pair is prefixed exactly once.
pub fn apply_shared_prefix(mut pair: PromptPair, prefix: Option<&str>) -> PromptPair {
    pair.cold.text = build_prompt(prefix, &pair.cold.text);
    pair.warm.text = build_prompt(prefix, &pair.warm.text);
    pair
}
