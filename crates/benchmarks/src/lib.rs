//! Benchmark records and offline analysis for LLM Locality.
//!
//! The harness produces one [`BenchmarkRecord`] per cold/warm test case and
//! appends it to a JSON Lines sink. This crate owns that record format, the
//! sink, and the offline aggregator that later reads the sink back.
//!
//! # Quick Start
//!
//! ```no_run
//! use llm_locality_benchmarks::{aggregate, io};
//!
//! let batch = io::read_records("results.jsonl")?;
//! let summaries = aggregate::summarize(&batch.records);
//! print!("{}", aggregate::render_text(&summaries));
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`result`] - The canonical `BenchmarkRecord` struct
//! - [`io`] - Appending records and reading them back
//! - [`aggregate`] - Extractor chains and delta statistics
//! - [`markdown`] - Markdown report generation

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod io;
pub mod markdown;
pub mod result;

pub use aggregate::{summarize, DeltaStats, ModeSummary};
pub use io::{read_records, JsonlSink, RecordSink};
pub use result::{BenchmarkRecord, CallTiming};

/// Read a sink file and summarize it per mode.
///
/// Returns the summaries together with the number of skipped lines.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be read.
pub fn analyze_file(path: impl AsRef<std::path::Path>) -> std::io::Result<(Vec<ModeSummary>, usize)> {
    let batch = io::read_records(path)?;
    Ok((aggregate::summarize(&batch.records), batch.skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_locality_core::{ConnectionPolicy, Mode, TestCase, TransportMode};
    use std::time::Duration;

    fn timing(first_us: u64, total_us: u64) -> CallTiming {
        CallTiming {
            first_token: Duration::from_micros(first_us),
            total: Duration::from_micros(total_us),
            usage: None,
            upstream: None,
        }
    }

    #[test]
    fn test_sink_round_trip_preserves_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("results.jsonl"));

        let record = BenchmarkRecord::new(
            TestCase {
                mode: Mode::Gw,
                base_url: "http://gw".into(),
                index: 3,
                topic: Some("tides".into()),
                model: "m".into(),
                shared_prefix_used: true,
            },
            TransportMode::Streaming,
            ConnectionPolicy::AllowReuse,
            timing(41_234, 512_345),
            timing(18_765, 498_001),
        );
        sink.append(&record).unwrap();

        let (summaries, skipped) = analyze_file(sink.path()).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].mode, "gw");
        assert_eq!(summaries[0].total.as_ref().unwrap().mean, record.delta_total_ms);
        assert_eq!(
            summaries[0].first_token.as_ref().unwrap().mean,
            record.delta_first_token_ms
        );
        assert_eq!(record.delta_total_ms, -14.34);
        assert_eq!(record.delta_first_token_ms, -22.47);
    }
}
