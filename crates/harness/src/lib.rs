// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cold/warm latency harness for LLM serving stacks.
//!
//! Each test case sends two chat-completion requests in strict order: a
//! *cold* call expected to populate reusable cache state, then a *warm*
//! call expected to benefit from it. Comparing the two tells whether the
//! serving layer (a plain load balancer or an affinity-aware gateway) routes
//! related requests so that KV/prefix caching pays off.
//!
//! - [`prompts`] - corpus access and shared-prefix injection
//! - [`corpus`] - corpus validation and synthetic generation
//! - [`executor`] - one timed chat-completion call
//! - [`sequencer`] - the per-test-case state machine and sweeps
//! - [`settings`] - layered configuration

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod corpus;
pub mod executor;
pub mod prompts;
pub mod sequencer;
pub mod settings;
pub mod sse;
pub mod timing;

pub use executor::{CallOptions, CallResult, ChatCall, ChatExecutor, HttpChatExecutor};
pub use prompts::{apply_shared_prefix, build_prompt, CsvPromptSource, PromptPairSource};
pub use sequencer::{Echo, RunPlan, Sequencer, SequencerOptions, SweepReport};
pub use settings::{ConnectionChoice, HarnessSettings};
