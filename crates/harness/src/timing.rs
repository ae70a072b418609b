// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-call latency measurement.
//!
//! A [`Measurement`] is started immediately before a request is sent. Its
//! first-token mark can be set at most once; [`Measurement::finish`] always
//! yields a first-token latency, falling back to the total latency when no
//! mark was recorded.

use std::time::{Duration, Instant};

/// An in-flight timing measurement for one call.
#[derive(Debug)]
pub struct Measurement {
    start: Instant,
    first_token: Option<Duration>,
}

impl Measurement {
    /// Start measuring now.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            first_token: None,
        }
    }

    /// Record first token arrival. Later calls are ignored.
    pub fn record_first_token(&mut self) {
        if self.first_token.is_none() {
            self.first_token = Some(self.start.elapsed());
        }
    }

    /// Time to first token, if recorded.
    pub fn first_token(&self) -> Option<Duration> {
        self.first_token
    }

    /// Elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish the measurement.
    pub fn finish(self) -> CallLatency {
        let total = self.start.elapsed();
        CallLatency {
            first_token: self.first_token.unwrap_or(total),
            total,
        }
    }

    /// Finish a measurement where no partial response was observable.
    ///
    /// First-token and total latency are the same reading.
    pub fn finish_buffered(self) -> CallLatency {
        let total = self.start.elapsed();
        CallLatency {
            first_token: total,
            total,
        }
    }
}

/// Final latencies of one call. `first_token <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLatency {
    /// Time from send to the first parsed response unit.
    pub first_token: Duration,
    /// Time from send to completion.
    pub total: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_token_recorded_once() {
        let mut measurement = Measurement::start();
        std::thread::sleep(Duration::from_millis(5));
        measurement.record_first_token();
        let first = measurement.first_token().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        measurement.record_first_token();
        assert_eq!(measurement.first_token(), Some(first));

        let latency = measurement.finish();
        assert_eq!(latency.first_token, first);
        assert!(latency.first_token <= latency.total);
        assert!(latency.total >= Duration::from_millis(10));
    }

    #[test]
    fn test_missing_first_token_defaults_to_total() {
        let measurement = Measurement::start();
        std::thread::sleep(Duration::from_millis(2));
        let latency = measurement.finish();
        assert_eq!(latency.first_token, latency.total);
    }

    #[test]
    fn test_buffered_collapses_latencies() {
        let mut measurement = Measurement::start();
        measurement.record_first_token();
        let latency = measurement.finish_buffered();
        assert_eq!(latency.first_token, latency.total);
    }
}
