//! Benchmark record types.
//!
//! A [`BenchmarkRecord`] is the persisted unit: one per test case, built once
//! by the sequencer and appended to the result sink without further mutation.

use chrono::{DateTime, Utc};
use llm_locality_core::{ConnectionPolicy, TestCase, TransportMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and metadata kept from one timed call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTiming {
    /// Time from request send to the first parsed response unit.
    pub first_token: Duration,
    /// Time from request send to full completion.
    pub total: Duration,
    /// Usage block reported by the server.
    pub usage: Option<serde_json::Value>,
    /// Value of the upstream-identifying response header.
    pub upstream: Option<String>,
}

/// Canonical cold/warm benchmark record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// Identity of the run.
    #[serde(flatten)]
    pub test_case: TestCase,
    /// Whether both calls streamed.
    pub stream: bool,
    /// Connection policy applied to both calls.
    pub connection: ConnectionPolicy,
    /// Cold call first-token latency in milliseconds.
    pub cold_first_token_ms: f64,
    /// Cold call total latency in milliseconds.
    pub cold_total_ms: f64,
    /// Warm call first-token latency in milliseconds.
    pub warm_first_token_ms: f64,
    /// Warm call total latency in milliseconds.
    pub warm_total_ms: f64,
    /// `warm_first_token - cold_first_token` in milliseconds.
    pub delta_first_token_ms: f64,
    /// `warm_total - cold_total` in milliseconds.
    pub delta_total_ms: f64,
    /// Usage reported by the cold call.
    pub usage_cold: Option<serde_json::Value>,
    /// Usage reported by the warm call.
    pub usage_warm: Option<serde_json::Value>,
    /// Backend instance that served the cold call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_cold: Option<String>,
    /// Backend instance that served the warm call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_warm: Option<String>,
    /// When the record was assembled.
    pub timestamp: DateTime<Utc>,
}

impl BenchmarkRecord {
    /// Assemble a record from the two timed calls.
    ///
    /// Deltas are computed from the unrounded durations and rounded once.
    pub fn new(
        test_case: TestCase,
        transport: TransportMode,
        connection: ConnectionPolicy,
        cold: CallTiming,
        warm: CallTiming,
    ) -> Self {
        Self {
            test_case,
            stream: transport.is_streaming(),
            connection,
            cold_first_token_ms: duration_ms(cold.first_token),
            cold_total_ms: duration_ms(cold.total),
            warm_first_token_ms: duration_ms(warm.first_token),
            warm_total_ms: duration_ms(warm.total),
            delta_first_token_ms: delta_ms(cold.first_token, warm.first_token),
            delta_total_ms: delta_ms(cold.total, warm.total),
            usage_cold: cold.usage,
            usage_warm: warm.usage,
            upstream_cold: cold.upstream,
            upstream_warm: warm.upstream,
            timestamp: Utc::now(),
        }
    }

    /// Whether both calls report the same upstream instance.
    ///
    /// `None` when either call carried no upstream header.
    pub fn same_upstream(&self) -> Option<bool> {
        match (&self.upstream_cold, &self.upstream_warm) {
            (Some(cold), Some(warm)) => Some(cold == warm),
            _ => None,
        }
    }

    /// Indented JSON for console output.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Round milliseconds to two decimal places.
pub fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Duration in milliseconds, rounded to two decimal places.
pub fn duration_ms(d: Duration) -> f64 {
    round_ms(d.as_secs_f64() * 1000.0)
}

/// Signed `later - earlier` in milliseconds, rounded to two decimal places.
pub fn delta_ms(earlier: Duration, later: Duration) -> f64 {
    round_ms((later.as_secs_f64() - earlier.as_secs_f64()) * 1000.0)
}
