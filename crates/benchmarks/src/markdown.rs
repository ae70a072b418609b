//! Markdown output generation for aggregated results.

use crate::aggregate::{DeltaStats, ModeSummary};
use std::fmt::Write;

/// Generate a markdown summary from per-mode aggregates.
pub fn generate_summary(summaries: &[ModeSummary], source: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Cold/Warm Latency Summary");
    let _ = writeln!(output);
    let _ = writeln!(output, "Source: `{source}`");
    let _ = writeln!(output);
    let _ = writeln!(output, "Generated: {}", chrono::Utc::now().to_rfc3339());
    let _ = writeln!(output);

    write_table(&mut output, "Total latency Δ (warm − cold)", summaries, |s| {
        s.total.as_ref()
    });
    write_table(&mut output, "First-token latency Δ (warm − cold)", summaries, |s| {
        s.first_token.as_ref()
    });

    let _ = writeln!(output, "---");
    let records: usize = summaries
        .iter()
        .map(|s| s.total.as_ref().map_or(0, |t| t.n))
        .sum();
    let _ = writeln!(output, "Modes: {}, records with total Δ: {}", summaries.len(), records);

    output
}

fn write_table<F>(output: &mut String, title: &str, summaries: &[ModeSummary], pick: F)
where
    F: Fn(&ModeSummary) -> Option<&DeltaStats>,
{
    let _ = writeln!(output, "## {title}");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Mode | n | Mean (ms) | Median (ms) | p10 (ms) | p90 (ms) |");
    let _ = writeln!(output, "|------|---|-----------|-------------|----------|----------|");

    for summary in summaries {
        match pick(summary) {
            Some(s) => {
                let _ = writeln!(
                    output,
                    "| {} | {} | {:.1} | {:.1} | {:.1} | {:.1} |",
                    summary.mode, s.n, s.mean, s.median, s.p10, s.p90
                );
            }
            None => {
                let _ = writeln!(output, "| {} | 0 | - | - | - | - |", summary.mode);
            }
        }
    }

    let _ = writeln!(output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::summarize;
    use serde_json::json;

    #[test]
    fn test_summary_tables() {
        let summaries = summarize(&[
            json!({"mode": "gw", "delta_total_ms": -12.0, "delta_first_token_ms": -8.0}),
            json!({"mode": "lb", "delta_full_ms": 4.0}),
        ]);
        let md = generate_summary(&summaries, "results.jsonl");

        assert!(md.starts_with("# Cold/Warm Latency Summary"));
        assert!(md.contains("| gw | 1 | -12.0 | -12.0 | -12.0 | -12.0 |"));
        assert!(md.contains("| lb | 0 | - | - | - | - |"));
        assert!(md.contains("Modes: 2, records with total Δ: 2"));
    }
}
