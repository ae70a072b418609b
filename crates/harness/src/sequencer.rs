// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark sequencer.
//!
//! Drives one test case through
//! `Init -> Warmup(N) -> Cold -> InterCallPause -> Warm -> Assemble -> Published`.
//! Calls are strictly sequential: the warm call starts only after the cold
//! call's response has been consumed in full.

use crate::executor::{CallOptions, ChatCall, ChatExecutor};
use crate::prompts::{apply_shared_prefix, PromptPairSource};
use llm_locality_benchmarks::{BenchmarkRecord, RecordSink};
use llm_locality_core::{BenchError, CallPhase, Mode, TestCase};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default quiescent interval between the cold and warm calls.
pub const DEFAULT_INTER_CALL_PAUSE: Duration = Duration::from_millis(50);

/// Default throwaway prompt used for warmup calls.
pub const DEFAULT_WARMUP_PROMPT: &str = "warm up";

/// How published records are echoed to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Echo {
    /// Nothing is printed.
    #[default]
    Off,
    /// Indented JSON, for single runs read by a person.
    Pretty,
    /// One JSON object per line, for sweeps piped into other tools.
    Compact,
}

impl Echo {
    /// Render `record`, or `None` when echo is off.
    pub fn render(self, record: &BenchmarkRecord) -> Option<serde_json::Result<String>> {
        match self {
            Echo::Off => None,
            Echo::Pretty => Some(record.to_pretty_json()),
            Echo::Compact => Some(serde_json::to_string(record)),
        }
    }
}

/// Tunables that do not change the identity of a test case.
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Pause between cold and warm calls.
    pub inter_call_pause: Duration,
    /// Prompt sent by warmup calls.
    pub warmup_prompt: String,
    /// Response header identifying the serving backend instance.
    pub upstream_header: Option<String>,
    /// Stdout rendering of each record.
    pub echo: Echo,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            inter_call_pause: DEFAULT_INTER_CALL_PAUSE,
            warmup_prompt: DEFAULT_WARMUP_PROMPT.to_string(),
            upstream_header: None,
            echo: Echo::Off,
        }
    }
}

/// Everything needed to run one test case.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Serving layer under test.
    pub mode: Mode,
    /// Resolved base URL.
    pub base_url: String,
    /// 0-based corpus index.
    pub index: usize,
    /// Model identifier.
    pub model: String,
    /// Text prepended to both prompts.
    pub shared_prefix: Option<String>,
    /// Settings shared by the cold and warm calls.
    pub call: CallOptions,
    /// Number of untimed warmup calls.
    pub warmup: u32,
}

impl RunPlan {
    /// The same plan for another corpus index.
    pub fn at_index(&self, index: usize) -> Self {
        Self {
            index,
            ..self.clone()
        }
    }

    fn chat_call(&self, prompt: String, options: CallOptions) -> ChatCall {
        ChatCall {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            prompt,
            options,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Warmup(u32),
    Cold,
    InterCallPause,
    Warm,
    Assemble,
    Published,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Init => write!(f, "init"),
            State::Warmup(n) => write!(f, "warmup({n})"),
            State::Cold => write!(f, "cold"),
            State::InterCallPause => write!(f, "inter-call-pause"),
            State::Warm => write!(f, "warm"),
            State::Assemble => write!(f, "assemble"),
            State::Published => write!(f, "published"),
        }
    }
}

/// Runs test cases against an executor and publishes to a sink.
pub struct Sequencer<'a> {
    executor: &'a dyn ChatExecutor,
    sink: &'a dyn RecordSink,
    options: SequencerOptions,
}

impl<'a> Sequencer<'a> {
    /// Create a sequencer.
    pub fn new(
        executor: &'a dyn ChatExecutor,
        sink: &'a dyn RecordSink,
        options: SequencerOptions,
    ) -> Self {
        Self {
            executor,
            sink,
            options,
        }
    }

    /// Run one test case to completion.
    ///
    /// # Errors
    ///
    /// Corpus errors abort before any call is made. A failed cold or warm
    /// call aborts the test case with [`BenchError::Call`]; no record is
    /// produced and, for a cold failure, no warm call is attempted. Warmup
    /// and sink failures are logged and never returned.
    pub async fn run(
        &self,
        plan: &RunPlan,
        prompts: &dyn PromptPairSource,
    ) -> Result<BenchmarkRecord, BenchError> {
        let mut state = State::Init;
        debug!(index = plan.index, mode = %plan.mode, %state, "sequencer start");

        let pair = prompts.read_pair(plan.index)?;
        let pair = apply_shared_prefix(pair, plan.shared_prefix.as_deref());

        let warmup_options = plan.call.buffered();
        for n in 0..plan.warmup {
            state = State::Warmup(n);
            debug!(%state, "sequencer transition");
            let call = plan.chat_call(self.options.warmup_prompt.clone(), warmup_options.clone());
            if let Err(err) = self.executor.execute(call).await {
                warn!(phase = %CallPhase::Warmup, attempt = n + 1, error = %err, "warmup call failed");
            }
        }

        state = State::Cold;
        debug!(%state, "sequencer transition");
        let cold = self
            .executor
            .execute(plan.chat_call(pair.cold.text, plan.call.clone()))
            .await
            .map_err(|source| BenchError::Call {
                phase: CallPhase::Cold,
                source,
            })?;

        state = State::InterCallPause;
        debug!(%state, pause_ms = self.options.inter_call_pause.as_millis() as u64, "sequencer transition");
        if !self.options.inter_call_pause.is_zero() {
            tokio::time::sleep(self.options.inter_call_pause).await;
        }

        state = State::Warm;
        debug!(%state, "sequencer transition");
        let warm = self
            .executor
            .execute(plan.chat_call(pair.warm.text, plan.call.clone()))
            .await
            .map_err(|source| BenchError::Call {
                phase: CallPhase::Warm,
                source,
            })?;

        state = State::Assemble;
        debug!(%state, "sequencer transition");
        let upstream_header = self.options.upstream_header.as_deref();
        let test_case = TestCase {
            mode: plan.mode,
            base_url: plan.base_url.clone(),
            index: plan.index,
            topic: pair.topic,
            model: plan.model.clone(),
            shared_prefix_used: plan.shared_prefix.as_deref().is_some_and(|p| !p.is_empty()),
        };
        let record = BenchmarkRecord::new(
            test_case,
            plan.call.transport,
            plan.call.connection,
            cold.into_timing(upstream_header),
            warm.into_timing(upstream_header),
        );

        self.publish(&record);
        state = State::Published;
        info!(
            index = record.test_case.index,
            mode = %record.test_case.mode,
            cold_total_ms = record.cold_total_ms,
            warm_total_ms = record.warm_total_ms,
            delta_total_ms = record.delta_total_ms,
            delta_first_token_ms = record.delta_first_token_ms,
            same_upstream = ?record.same_upstream(),
            %state,
            "test case complete"
        );
        Ok(record)
    }

    fn publish(&self, record: &BenchmarkRecord) {
        match self.options.echo.render(record) {
            Some(Ok(json)) => println!("{json}"),
            Some(Err(err)) => warn!(error = %err, "failed to render record"),
            None => {}
        }
        if let Err(err) = self.sink.append(record) {
            warn!(error = %err, "failed to append record to sink");
        }
    }

    /// Run `count` consecutive corpus indices starting at `plan.index`.
    ///
    /// Test cases run one after another. A failed call skips that index;
    /// configuration and corpus errors stop the sweep.
    pub async fn sweep(
        &self,
        plan: &RunPlan,
        prompts: &dyn PromptPairSource,
        count: usize,
    ) -> Result<SweepReport, BenchError> {
        let mut report = SweepReport::default();
        for index in plan.index..plan.index.saturating_add(count) {
            match self.run(&plan.at_index(index), prompts).await {
                Ok(record) => report.records.push(record),
                Err(err) if err.is_test_case_local() => {
                    warn!(index, error = %err, "test case failed, continuing");
                    report.failed.push(index);
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            succeeded = report.records.len(),
            failed = report.failed.len(),
            "sweep complete"
        );
        Ok(report)
    }
}

/// Outcome of a sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Records produced, in index order.
    pub records: Vec<BenchmarkRecord>,
    /// Indices whose test case failed.
    pub failed: Vec<usize>,
}
