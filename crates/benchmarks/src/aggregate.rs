//! Offline aggregation of accumulated benchmark records.
//!
//! Sink files accumulate across harness versions whose field names drifted,
//! so every value is read through an ordered chain of [`Extractor`]s: the
//! first one that yields a number wins.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;

/// One strategy for pulling a millisecond value out of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Read a numeric field directly.
    Field(&'static str),
    /// Compute `later - earlier` from two numeric fields.
    Difference {
        /// Field holding the warm-call value.
        later: &'static str,
        /// Field holding the cold-call value.
        earlier: &'static str,
    },
}

impl Extractor {
    /// Apply this strategy to a record.
    pub fn extract(&self, record: &Value) -> Option<f64> {
        match *self {
            Extractor::Field(name) => number(record, name),
            Extractor::Difference { later, earlier } => {
                Some(number(record, later)? - number(record, earlier)?)
            }
        }
    }
}

fn number(record: &Value, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

/// Strategies for the total-latency delta, newest layout first.
pub const TOTAL_DELTA: &[Extractor] = &[
    Extractor::Field("delta_total_ms"),
    Extractor::Field("delta_full_ms"),
    Extractor::Field("delta_ms"),
    Extractor::Difference {
        later: "warm_total_ms",
        earlier: "cold_total_ms",
    },
    Extractor::Difference {
        later: "warm_full_ms",
        earlier: "cold_full_ms",
    },
];

/// Strategies for the first-token delta, newest layout first.
pub const FIRST_TOKEN_DELTA: &[Extractor] = &[
    Extractor::Field("delta_first_token_ms"),
    Extractor::Field("delta_fftp_ms"),
    Extractor::Field("delta_ttft_ms"),
    Extractor::Difference {
        later: "warm_first_token_ms",
        earlier: "cold_first_token_ms",
    },
    Extractor::Difference {
        later: "warm_fftp_ms",
        earlier: "cold_fftp_ms",
    },
];

/// Fields that may carry the test mode, newest layout first.
pub const MODE_FIELDS: &[&str] = &["mode", "target"];

/// Group label for records that name no mode.
pub const UNKNOWN_MODE: &str = "unknown";

/// Run an extractor chain, returning the first value found.
pub fn extract_first(chain: &[Extractor], record: &Value) -> Option<f64> {
    chain.iter().find_map(|extractor| extractor.extract(record))
}

/// Mode label of a record.
pub fn extract_mode(record: &Value) -> String {
    MODE_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(Value::as_str))
        .unwrap_or(UNKNOWN_MODE)
        .to_string()
}

/// Distribution summary of a set of deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaStats {
    /// Number of samples.
    pub n: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// 10th percentile.
    pub p10: f64,
    /// 90th percentile.
    pub p90: f64,
}

impl DeltaStats {
    /// Summarize a sample set. `None` when empty.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let deciles = deciles(&sorted);

        Some(Self {
            n,
            mean: sorted.iter().sum::<f64>() / n as f64,
            median: median(&sorted),
            p10: deciles[0],
            p90: deciles[8],
        })
    }
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// The nine cut points splitting `sorted` into ten groups.
///
/// Uses the exclusive method: positions are interpolated over `n + 1`
/// and the bracketing indices are clamped to the data, so small samples
/// extrapolate past their extremes.
fn deciles(sorted: &[f64]) -> [f64; 9] {
    const GROUPS: i64 = 10;
    let len = sorted.len();
    let mut cuts = [sorted[0]; 9];
    if len < 2 {
        return cuts;
    }

    let m = len as i64 + 1;
    for (slot, i) in cuts.iter_mut().zip(1..GROUPS) {
        let j = (i * m / GROUPS).clamp(1, len as i64 - 1);
        let delta = (i * m - j * GROUPS) as f64;
        let lower = sorted[(j - 1) as usize];
        let upper = sorted[j as usize];
        *slot = (lower * (GROUPS as f64 - delta) + upper * delta) / GROUPS as f64;
    }
    cuts
}

/// Per-mode summary of warm-minus-cold deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeSummary {
    /// Mode label (`lb`, `gw`, or whatever older records used).
    pub mode: String,
    /// Total-latency delta distribution.
    pub total: Option<DeltaStats>,
    /// First-token delta distribution.
    pub first_token: Option<DeltaStats>,
}

/// Group records by mode and summarize both deltas.
///
/// Records yielding neither delta are ignored. Modes are returned in
/// lexical order. Input is never modified.
pub fn summarize(records: &[Value]) -> Vec<ModeSummary> {
    let mut groups: BTreeMap<String, (Vec<f64>, Vec<f64>)> = BTreeMap::new();

    for record in records {
        let total = extract_first(TOTAL_DELTA, record);
        let first_token = extract_first(FIRST_TOKEN_DELTA, record);
        if total.is_none() && first_token.is_none() {
            continue;
        }

        let (totals, first_tokens) = groups.entry(extract_mode(record)).or_default();
        totals.extend(total);
        first_tokens.extend(first_token);
    }

    groups
        .into_iter()
        .map(|(mode, (totals, first_tokens))| ModeSummary {
            mode,
            total: DeltaStats::from_samples(&totals),
            first_token: DeltaStats::from_samples(&first_tokens),
        })
        .collect()
}

/// Render summaries in the one-line-per-mode console format.
pub fn render_text(summaries: &[ModeSummary]) -> String {
    let mut output = String::new();

    for summary in summaries {
        let label = summary.mode.to_uppercase();
        match &summary.total {
            Some(s) => {
                let _ = writeln!(
                    output,
                    "{label}  n={}  meanΔ={:.1} ms  medianΔ={:.1} ms  p10={:.1}  p90={:.1}",
                    s.n, s.mean, s.median, s.p10, s.p90
                );
            }
            None => {
                let _ = writeln!(output, "{label}  n=0");
            }
        }
        if let Some(s) = &summary.first_token {
            let _ = writeln!(
                output,
                "{:width$}  first-token n={}  meanΔ={:.1} ms  medianΔ={:.1} ms  p10={:.1}  p90={:.1}",
                "",
                s.n,
                s.mean,
                s.median,
                s.p10,
                s.p90,
                width = label.len()
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_extractor_chain_prefers_newest_field() {
        let record = json!({"delta_total_ms": 5.0, "delta_full_ms": 9.0});
        assert_eq!(extract_first(TOTAL_DELTA, &record), Some(5.0));
    }

    #[test]
    fn test_extractor_chain_falls_back_to_older_names() {
        let record = json!({"target": "lb", "delta_full_ms": -12.5, "delta_fftp_ms": -3.0});
        assert_eq!(extract_first(TOTAL_DELTA, &record), Some(-12.5));
        assert_eq!(extract_first(FIRST_TOKEN_DELTA, &record), Some(-3.0));
        assert_eq!(extract_mode(&record), "lb");
    }

    #[test]
    fn test_extractor_chain_computes_from_raw_timings() {
        let record = json!({"cold_full_ms": 200, "warm_full_ms": 150.5});
        assert_eq!(extract_first(TOTAL_DELTA, &record), Some(-49.5));
        assert_eq!(extract_first(FIRST_TOKEN_DELTA, &record), None);

        let partial = json!({"warm_total_ms": 10.0});
        assert_eq!(extract_first(TOTAL_DELTA, &partial), None);
        assert_eq!(extract_mode(&partial), UNKNOWN_MODE);
    }

    #[test]
    fn test_stats_ten_samples() {
        let samples: Vec<f64> = (1..=10).map(f64::from).collect();
        let stats = DeltaStats::from_samples(&samples).unwrap();
        assert_eq!(stats.n, 10);
        assert!(approx(stats.mean, 5.5));
        assert!(approx(stats.median, 5.5));
        assert!(approx(stats.p10, 1.1));
        assert!(approx(stats.p90, 9.9));
    }

    #[test]
    fn test_stats_small_sample_extrapolates() {
        let stats = DeltaStats::from_samples(&[50.0, 10.0, 30.0, 20.0, 40.0]).unwrap();
        assert!(approx(stats.median, 30.0));
        assert!(approx(stats.p10, 6.0));
        assert!(approx(stats.p90, 54.0));
    }

    #[test]
    fn test_stats_single_and_empty() {
        let stats = DeltaStats::from_samples(&[-7.0]).unwrap();
        assert_eq!((stats.mean, stats.median, stats.p10, stats.p90), (-7.0, -7.0, -7.0, -7.0));
        assert!(DeltaStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_summarize_groups_by_mode() {
        let records = vec![
            json!({"mode": "gw", "delta_total_ms": -10.0, "delta_first_token_ms": -4.0}),
            json!({"mode": "gw", "delta_total_ms": -20.0, "delta_first_token_ms": -6.0}),
            json!({"target": "lb", "delta_full_ms": 3.0}),
            json!({"mode": "lb", "note": "no timings"}),
        ];

        let summaries = summarize(&records);
        assert_eq!(summaries.len(), 2);

        let gw = &summaries[0];
        assert_eq!(gw.mode, "gw");
        assert!(approx(gw.total.as_ref().unwrap().mean, -15.0));
        assert!(approx(gw.first_token.as_ref().unwrap().median, -5.0));

        let lb = &summaries[1];
        assert_eq!(lb.mode, "lb");
        assert_eq!(lb.total.as_ref().unwrap().n, 1);
        assert!(lb.first_token.is_none());
    }

    #[test]
    fn test_render_text_format() {
        let summaries = summarize(&[
            json!({"mode": "gw", "delta_total_ms": -10.0}),
            json!({"mode": "gw", "delta_total_ms": -20.0}),
        ]);
        let text = render_text(&summaries);
        assert!(text.starts_with("GW  n=2  meanΔ=-15.0 ms  medianΔ=-15.0 ms"));
        assert!(!text.contains("first-token"));
    }
}
