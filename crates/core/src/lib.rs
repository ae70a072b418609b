// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types for LLM Locality.
//!
//! This crate holds the vocabulary shared by the harness, the result
//! pipeline and the CLI:
//!
//! - [`types`] - test modes, test cases, prompts and response payloads
//! - [`endpoint`] - resolution of the target base URL for a test mode
//! - [`error`] - the error taxonomy used across the workspace

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod endpoint;
pub mod error;
pub mod types;

pub use endpoint::resolve_endpoint;
pub use error::{
    BenchError, ConfigurationError, CorpusError, Result, SinkWriteError, TransportError,
};
pub use types::{
    CallPhase, ConnectionPolicy, Mode, Prompt, PromptPair, PromptRole, ResponsePayload, TestCase,
    TransportMode,
};
