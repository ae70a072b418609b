// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy.
//!
//! Every failure the harness can surface falls in one of four families:
//! configuration problems (fatal before any network call), corpus access
//! problems (fatal for the invocation), transport failures (fatal for the
//! enclosing test case) and sink write failures (logged, never fatal).

use crate::types::{CallPhase, Mode};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed underlying cause carried by transport and sink errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Bad or missing command-line level inputs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The base URL for the selected mode was not supplied.
    #[error("missing required base URL for mode '{mode}' (set --{mode}-url)")]
    MissingBaseUrl {
        /// Mode whose URL is missing.
        mode: Mode,
    },

    /// Mode string is neither `lb` nor `gw`.
    #[error("unsupported mode '{0}': expected 'lb' or 'gw'")]
    UnsupportedMode(String),

    /// A request header could not be parsed.
    #[error("invalid header '{header}': {reason}")]
    InvalidHeader {
        /// Raw header argument.
        header: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting holds a value outside its domain.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Setting name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Layered settings could not be loaded.
    #[error("failed to load settings: {0}")]
    Load(String),
}

/// Problems reading the prompt corpus or the shared-prefix file.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// File could not be opened or read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File was readable but a record could not be decoded.
    #[error("failed to decode record {index} in {}: {source}", path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// Ordinal of the record being decoded.
        index: usize,
        /// Underlying decoder error.
        #[source]
        source: BoxError,
    },

    /// Corpus has fewer records than the requested index.
    #[error("index {index} out of range for {} ({available} records)", path.display())]
    IndexOutOfRange {
        /// File path.
        path: PathBuf,
        /// Requested 0-based index.
        index: usize,
        /// Number of records available.
        available: usize,
    },

    /// Record lacks two non-empty prompt fields.
    #[error("record {index} needs two non-empty prompt fields ({fields} fields found)")]
    MalformedRecord {
        /// 0-based record index.
        index: usize,
        /// Number of fields found.
        fields: usize,
    },
}

/// Network failure or timeout during a chat-completion call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The call did not complete within its time budget.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// Configured per-call timeout.
        after: Duration,
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// A connection to the endpoint could not be established.
    #[error("failed to connect: {source}")]
    Connect {
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// Request could not be built or sent.
    #[error("request failed: {source}")]
    Network {
        /// Underlying cause.
        #[source]
        source: BoxError,
    },

    /// The response body could not be read to completion.
    #[error("failed to read response body: {source}")]
    Body {
        /// Underlying cause.
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    /// Whether this is the timeout subtype.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Failure to append a record to the result sink.
#[derive(Debug, Error)]
pub enum SinkWriteError {
    /// Sink file could not be opened or written.
    #[error("failed to append to {}: {source}", path.display())]
    Io {
        /// Sink path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Umbrella error for a benchmark invocation.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Configuration problem.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Corpus access problem.
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// A chat-completion call failed.
    #[error("{phase} call failed: {source}")]
    Call {
        /// Which call failed.
        phase: CallPhase,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// Sink write failed.
    #[error(transparent)]
    Sink(#[from] SinkWriteError),
}

impl BenchError {
    /// Whether the failure only invalidates the current test case.
    ///
    /// A driver looping over corpus indices may continue after these.
    pub fn is_test_case_local(&self) -> bool {
        matches!(self, BenchError::Call { .. } | BenchError::Sink(_))
    }
}

/// Result type for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;
