// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Corpus production and validation.
//!
//! Generated corpora must round-trip through [`crate::prompts`]: prompts may
//! not contain the delimiter or a newline, and each pair carries a topic that
//! is unique within the file. Topic uniqueness is tracked in an explicit
//! [`TopicRegistry`] passed to the generator.

use crate::prompts::CsvPromptSource;
use llm_locality_core::{CorpusError, PromptPair};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info};

/// Minimum words per prompt.
pub const MIN_WORDS: usize = 18;

/// Maximum words per prompt.
pub const MAX_WORDS: usize = 32;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("static regex"));

/// Number of words in `text`.
pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Why a prompt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptViolation {
    /// Contains the corpus delimiter.
    ContainsDelimiter(char),
    /// Contains a line break.
    ContainsNewline,
    /// Word count outside the accepted range.
    WordCount(usize),
}

impl fmt::Display for PromptViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptViolation::ContainsDelimiter(d) => write!(f, "contains delimiter '{d}'"),
            PromptViolation::ContainsNewline => f.write_str("contains newline"),
            PromptViolation::WordCount(n) => {
                write!(f, "word count {n} (needs {MIN_WORDS}-{MAX_WORDS})")
            }
        }
    }
}

/// Check a prompt against the corpus rules.
pub fn validate_prompt(text: &str, delimiter: u8) -> Result<(), PromptViolation> {
    let delimiter = char::from(delimiter);
    if text.contains(delimiter) {
        return Err(PromptViolation::ContainsDelimiter(delimiter));
    }
    if text.contains('\n') || text.contains('\r') {
        return Err(PromptViolation::ContainsNewline);
    }
    let words = word_count(text);
    if !(MIN_WORDS..=MAX_WORDS).contains(&words) {
        return Err(PromptViolation::WordCount(words));
    }
    Ok(())
}

/// Set of topics already present in a corpus, compared case-insensitively.
#[derive(Debug, Default, Clone)]
pub struct TopicRegistry {
    seen: HashSet<String>,
}

impl TopicRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry from an existing corpus file.
    ///
    /// Only three-field records with a non-empty topic contribute. A missing
    /// file yields an empty registry.
    pub fn from_corpus(path: &Path, delimiter: u8) -> Result<Self, CorpusError> {
        let mut registry = Self::new();
        if !path.exists() {
            return Ok(registry);
        }

        let source = CsvPromptSource::new(path, delimiter);
        for (index, line) in source.read_lines()?.iter().enumerate() {
            let record = source.parse_line(line).map_err(|err| CorpusError::Read {
                path: path.to_path_buf(),
                index,
                source: Box::new(err),
            })?;
            if record.len() == 3 {
                registry.insert(&record[2]);
            }
        }

        debug!(path = %path.display(), topics = registry.len(), "seeded topic registry");
        Ok(registry)
    }

    /// Normalize a topic label: collapse whitespace, trim.
    pub fn normalize(topic: &str) -> String {
        topic.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Whether the topic was already seen.
    pub fn contains(&self, topic: &str) -> bool {
        self.seen.contains(&Self::normalize(topic).to_lowercase())
    }

    /// Record a topic. Returns `false` if it was empty or already present.
    pub fn insert(&mut self, topic: &str) -> bool {
        let key = Self::normalize(topic).to_lowercase();
        !key.is_empty() && self.seen.insert(key)
    }

    /// Number of distinct topics.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no topic was recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

const SUBJECTS: &[&str] = &[
    "tidal energy",
    "glacier formation",
    "honeybee navigation",
    "volcanic soil",
    "coral reef recovery",
    "desert irrigation",
    "bird migration",
    "river delta erosion",
    "urban heat islands",
    "mushroom networks",
    "ocean acidification",
    "solar sail propulsion",
    "deep sea vents",
    "wetland filtration",
    "lightning formation",
    "permafrost thaw",
];

const LENSES: &[&str] = &[
    "physics",
    "history",
    "economics",
    "ecology",
    "engineering",
    "public policy",
    "daily life",
    "future research",
];

/// Deterministic template-based pair generator.
///
/// Produces syntactically valid, topic-unique pairs for smoke runs and
/// plumbing tests. The text is formulaic by construction.
#[derive(Debug, Default)]
pub struct SyntheticCorpus {
    cursor: usize,
}

impl SyntheticCorpus {
    /// Generator starting at the first template combination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct topics the templates can produce.
    pub fn capacity() -> usize {
        SUBJECTS.len() * LENSES.len()
    }

    /// Next pair whose topic is not yet in `registry`, recording it there.
    ///
    /// Returns `None` once every combination is used.
    pub fn next_pair(&mut self, registry: &mut TopicRegistry) -> Option<PromptPair> {
        while self.cursor < Self::capacity() {
            let subject = SUBJECTS[self.cursor % SUBJECTS.len()];
            let lens = LENSES[self.cursor / SUBJECTS.len()];
            self.cursor += 1;

            let topic = format!("{subject} {lens}");
            if !registry.insert(&topic) {
                continue;
            }

            let cold = format!(
                "Explain the topic of {subject} through the lens of {lens} in plain language \
                 and describe the single most important mechanism that a curious newcomer should understand first"
            );
            let warm = format!(
                "Continuing with {subject} through the lens of {lens} now describe one common \
                 misconception about it and explain why that misconception persists among students"
            );
            return Some(PromptPair::new(cold, warm, Some(topic)));
        }
        None
    }
}

/// Append `count` synthetic pairs to a corpus file.
///
/// Topics already present in the file are skipped. Returns how many pairs
/// were written, which is less than `count` when the templates run out.
pub fn generate_corpus(path: &Path, delimiter: u8, count: usize) -> Result<usize, CorpusError> {
    let mut registry = TopicRegistry::from_corpus(path, delimiter)?;
    let io_err = |source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    };

    let unterminated = ends_without_newline(path).map_err(io_err)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    if unterminated {
        file.write_all(b"\n").map_err(io_err)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(file);

    let mut generator = SyntheticCorpus::new();
    let mut written = 0;
    while written < count {
        let Some(pair) = generator.next_pair(&mut registry) else {
            break;
        };
        if validate_prompt(&pair.cold.text, delimiter).is_err()
            || validate_prompt(&pair.warm.text, delimiter).is_err()
        {
            continue;
        }

        let topic = pair.topic.as_deref().unwrap_or_default();
        writer
            .write_record([pair.cold.text.as_str(), pair.warm.text.as_str(), topic])
            .map_err(|err| io_err(csv_write_error(err)))?;
        written += 1;
        if written % 50 == 0 {
            info!(written, count, "generated prompt pairs");
        }
    }

    writer.flush().map_err(io_err)?;
    Ok(written)
}

fn ends_without_newline(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn csv_write_error(err: csv::Error) -> io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(err) => err,
        other => io::Error::other(format!("{other:?}")),
    }
}

/// A corpus record that breaks the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusIssue {
    /// 0-based record index.
    pub index: usize,
    /// Description of the problem.
    pub problem: String,
}

/// Scan a corpus and report every record that the harness or the rules
/// would reject.
pub fn check_corpus(path: &Path, delimiter: u8) -> Result<(usize, Vec<CorpusIssue>), CorpusError> {
    let source = CsvPromptSource::new(path, delimiter);
    let lines = source.read_lines()?;
    let mut registry = TopicRegistry::new();
    let mut issues = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let record = match source.parse_line(line) {
            Ok(record) => record,
            Err(err) => {
                issues.push(CorpusIssue {
                    index,
                    problem: err.to_string(),
                });
                continue;
            }
        };

        if record.len() < 2 {
            issues.push(CorpusIssue {
                index,
                problem: format!("needs at least 2 fields, found {}", record.len()),
            });
            continue;
        }
        for (role, text) in [("cold", &record[0]), ("warm", &record[1])] {
            if let Err(violation) = validate_prompt(text.trim(), delimiter) {
                issues.push(CorpusIssue {
                    index,
                    problem: format!("{role} prompt {violation}"),
                });
            }
        }
        if let Some(topic) = record.get(2).filter(|t| !t.trim().is_empty()) {
            if !registry.insert(topic) {
                issues.push(CorpusIssue {
                    index,
                    problem: format!("duplicate topic '{}'", topic.trim()),
                });
            }
        }
    }

    Ok((lines.len(), issues))
}
