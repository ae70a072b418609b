// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Server-sent event consumption for streamed chat completions.
//!
//! Network reads do not respect line boundaries, so raw bytes are buffered
//! in a [`LineBuffer`] until a full line is available. Each complete line is
//! then fed to a [`StreamAccumulator`], which tracks the first-token mark,
//! the last parsed payload and the `[DONE]` sentinel.
//!
//! The first *parseable* `data:` chunk counts as the first token. On
//! backends that open with a role-only preamble chunk this marks the
//! preamble, not the first generated text.

use crate::timing::{CallLatency, Measurement};
use llm_locality_core::ResponsePayload;
use std::ops::ControlFlow;
use tracing::trace;

/// Marker prefixing every data-bearing line.
pub const DATA_PREFIX: &str = "data:";

/// Payload of the terminating chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Feed a chunk, returning every line it completes.
    ///
    /// Lines are split on `\n`; a trailing `\r` is removed. Bytes are only
    /// decoded once a line is complete, so multi-byte characters split
    /// across chunks survive intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0;
        while let Some(pos) = self.pending[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + pos;
            lines.push(decode_line(&self.pending[consumed..end]));
            consumed = end + 1;
        }
        self.pending.drain(..consumed);
        lines
    }

    /// Take the unterminated tail left at end of stream, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(decode_line(&tail))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Classification of one SSE line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseLine<'a> {
    /// Empty line (event separator).
    Blank,
    /// Comment, `event:`, `id:` or any other non-data field.
    Other,
    /// The `[DONE]` sentinel.
    Done,
    /// A data payload, trimmed.
    Data(&'a str),
}

/// Classify a single line.
pub fn classify(line: &str) -> SseLine<'_> {
    if line.is_empty() {
        return SseLine::Blank;
    }
    match line.strip_prefix(DATA_PREFIX) {
        Some(data) => {
            let data = data.trim();
            if data == DONE_SENTINEL {
                SseLine::Done
            } else {
                SseLine::Data(data)
            }
        }
        None => SseLine::Other,
    }
}

/// Per-stream state folded over incoming lines.
#[derive(Debug)]
pub struct StreamAccumulator {
    measurement: Measurement,
    last: Option<serde_json::Value>,
    parsed: usize,
    malformed: usize,
    other_lines: Vec<String>,
    done: bool,
}

impl StreamAccumulator {
    /// Wrap a measurement started before the request was sent.
    pub fn new(measurement: Measurement) -> Self {
        Self {
            measurement,
            last: None,
            parsed: 0,
            malformed: 0,
            other_lines: Vec::new(),
            done: false,
        }
    }

    /// Process one complete line.
    ///
    /// Returns `Break` once the sentinel has been seen; the caller should
    /// stop reading.
    pub fn on_line(&mut self, line: &str) -> ControlFlow<()> {
        if self.done {
            return ControlFlow::Break(());
        }

        match classify(line) {
            SseLine::Blank => {}
            SseLine::Other => self.other_lines.push(line.to_string()),
            SseLine::Done => {
                self.done = true;
                return ControlFlow::Break(());
            }
            SseLine::Data(data) => match serde_json::from_str::<serde_json::Value>(data) {
                Ok(chunk) => {
                    self.measurement.record_first_token();
                    self.last = Some(chunk);
                    self.parsed += 1;
                }
                Err(err) => {
                    trace!(error = %err, "skipping malformed stream chunk");
                    self.malformed += 1;
                }
            },
        }

        ControlFlow::Continue(())
    }

    /// Whether the sentinel was seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of chunks parsed so far.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    /// Number of data chunks that failed to parse.
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    /// Stop the clock and produce the final outcome.
    ///
    /// With no parsed chunk the payload falls back to the non-data lines
    /// seen, which is where error bodies end up.
    pub fn finish(self, status: u16) -> StreamOutcome {
        let latency = self.measurement.finish();
        let payload = match self.last {
            Some(doc) => ResponsePayload::Structured(doc),
            None => ResponsePayload::Fallback {
                status,
                text: self.other_lines.join("\n"),
            },
        };
        StreamOutcome {
            latency,
            payload,
            chunks: self.parsed,
            completed: self.done,
        }
    }
}

/// Result of consuming a whole stream.
#[derive(Debug)]
pub struct StreamOutcome {
    /// Measured latencies.
    pub latency: CallLatency,
    /// Last parsed chunk, or a fallback.
    pub payload: ResponsePayload,
    /// Chunks parsed.
    pub chunks: usize,
    /// Whether the sentinel terminated the stream.
    pub completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"id\"").is_empty());
        assert_eq!(buffer.push(b":1}\r\n\r\ndata: [DO"), vec!["data: {\"id\":1}", ""]);
        assert_eq!(buffer.push(b"NE]\n"), vec!["data: [DONE]"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_characters() {
        let text = "data: {\"c\":\"Δ\"}\n".as_bytes();
        let split = text.iter().position(|b| *b >= 0x80).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&text[..split]).is_empty());
        assert_eq!(buffer.push(&text[split..]), vec!["data: {\"c\":\"Δ\"}"]);
    }

    #[test]
    fn test_line_buffer_flushes_tail() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"data: {}\ndata: {\"x\":2}");
        assert_eq!(buffer.finish().as_deref(), Some("data: {\"x\":2}"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(""), SseLine::Blank);
        assert_eq!(classify(": keep-alive"), SseLine::Other);
        assert_eq!(classify("event: message"), SseLine::Other);
        assert_eq!(classify("data: [DONE]"), SseLine::Done);
        assert_eq!(classify("data:[DONE]  "), SseLine::Done);
        assert_eq!(classify("data:  {\"a\":1} "), SseLine::Data("{\"a\":1}"));
    }

    #[test]
    fn test_accumulator_keeps_last_chunk_and_first_mark() {
        let mut acc = StreamAccumulator::new(Measurement::start());

        assert!(acc.on_line("data: not-json").is_continue());
        assert_eq!(acc.malformed(), 1);
        assert_eq!(acc.parsed(), 0);

        assert!(acc.on_line("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}").is_continue());
        std::thread::sleep(std::time::Duration::from_millis(3));
        assert!(acc.on_line("").is_continue());
        assert!(acc
            .on_line("data: {\"choices\":[],\"usage\":{\"total_tokens\":9}}")
            .is_continue());
        assert!(acc.on_line("data: [DONE]").is_break());
        assert!(acc.on_line("data: {\"late\":true}").is_break());

        let outcome = acc.finish(200);
        assert_eq!(outcome.chunks, 2);
        assert!(outcome.completed);
        assert!(outcome.latency.first_token < outcome.latency.total);
        assert_eq!(
            outcome.payload,
            ResponsePayload::Structured(json!({"choices":[],"usage":{"total_tokens":9}}))
        );
    }

    #[test]
    fn test_accumulator_without_data_falls_back() {
        let mut acc = StreamAccumulator::new(Measurement::start());
        assert!(acc.on_line("{\"error\":\"model not found\"}").is_continue());
        assert!(acc.on_line("data: {broken").is_continue());

        let outcome = acc.finish(404);
        assert_eq!(outcome.chunks, 0);
        assert!(!outcome.completed);
        assert_eq!(outcome.latency.first_token, outcome.latency.total);
        assert_eq!(
            outcome.payload,
            ResponsePayload::Fallback {
                status: 404,
                text: "{\"error\":\"model not found\"}".into()
            }
        );
    }
}
