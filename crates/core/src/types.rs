// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared domain types.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Serving layer under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain load balancer.
    Lb,
    /// Inference-aware gateway.
    Gw,
}

impl Mode {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Lb => "lb",
            Mode::Gw => "gw",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lb" => Ok(Mode::Lb),
            "gw" => Ok(Mode::Gw),
            other => Err(ConfigurationError::UnsupportedMode(other.to_string())),
        }
    }
}

/// How the response body is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// One buffered JSON document.
    Buffered,
    /// Server-sent events, consumed incrementally.
    Streaming,
}

impl TransportMode {
    /// Whether the request asks for an incremental response.
    pub fn is_streaming(&self) -> bool {
        matches!(self, TransportMode::Streaming)
    }
}

/// Whether the underlying TCP connection may be kept alive between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPolicy {
    /// Send `Connection: close` and never reuse a pooled connection.
    #[serde(rename = "fresh")]
    ForceFresh,
    /// Let the client keep connections alive.
    #[serde(rename = "reuse")]
    AllowReuse,
}

impl ConnectionPolicy {
    /// Policy the harness applies to a mode when none is chosen explicitly.
    ///
    /// Connection stickiness would let a plain load balancer pin both calls
    /// to one backend, so `lb` runs always force a fresh connection.
    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Lb => ConnectionPolicy::ForceFresh,
            Mode::Gw => ConnectionPolicy::AllowReuse,
        }
    }
}

impl fmt::Display for ConnectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPolicy::ForceFresh => f.write_str("fresh"),
            ConnectionPolicy::AllowReuse => f.write_str("reuse"),
        }
    }
}

/// Which call of a test case is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPhase {
    /// Untimed cache-priming call.
    Warmup,
    /// First timed call.
    Cold,
    /// Second timed call.
    Warm,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallPhase::Warmup => f.write_str("warmup"),
            CallPhase::Cold => f.write_str("cold"),
            CallPhase::Warm => f.write_str("warm"),
        }
    }
}

/// Role a prompt plays inside a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    /// Sent first.
    Cold,
    /// Sent second, expected to share a prefix or topic with the cold prompt.
    Warm,
}

/// An opaque prompt body tagged with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Role in the pair.
    pub role: PromptRole,
    /// Text sent as the sole user message.
    pub text: String,
}

impl Prompt {
    /// Create a new prompt.
    pub fn new(role: PromptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A cold/warm prompt pair read from the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    /// Prompt for the cold call.
    pub cold: Prompt,
    /// Prompt for the warm call.
    pub warm: Prompt,
    /// Optional topic label.
    pub topic: Option<String>,
}

impl PromptPair {
    /// Create a pair from raw texts.
    pub fn new(cold: impl Into<String>, warm: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            cold: Prompt::new(PromptRole::Cold, cold),
            warm: Prompt::new(PromptRole::Warm, warm),
            topic,
        }
    }
}

/// Identity of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Serving layer under test.
    pub mode: Mode,
    /// Resolved base URL, without trailing slash.
    pub base_url: String,
    /// 0-based corpus index.
    pub index: usize,
    /// Topic label from the corpus, if any.
    pub topic: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Whether a shared prefix was prepended to both prompts.
    #[serde(rename = "shared_prefix")]
    pub shared_prefix_used: bool,
}

/// Response body of one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    /// Parsed JSON document (or the last parsed stream chunk).
    Structured(serde_json::Value),
    /// Anything that was not parseable JSON.
    Fallback {
        /// HTTP status code.
        status: u16,
        /// Raw body text.
        text: String,
    },
}

impl ResponsePayload {
    /// Token usage block, if the server reported one.
    pub fn usage(&self) -> Option<&serde_json::Value> {
        match self {
            ResponsePayload::Structured(doc) => doc.get("usage").filter(|u| !u.is_null()),
            ResponsePayload::Fallback { .. } => None,
        }
    }

    /// Whether the payload was parsed as JSON.
    pub fn is_structured(&self) -> bool {
        matches!(self, ResponsePayload::Structured(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_parse_and_display() {
        assert_eq!("lb".parse::<Mode>().unwrap(), Mode::Lb);
        assert_eq!("gw".parse::<Mode>().unwrap(), Mode::Gw);
        assert!(matches!(
            "zz".parse::<Mode>(),
            Err(ConfigurationError::UnsupportedMode(m)) if m == "zz"
        ));
        assert_eq!(Mode::Gw.to_string(), "gw");
    }

    #[test]
    fn test_default_connection_policy() {
        assert_eq!(ConnectionPolicy::default_for(Mode::Lb), ConnectionPolicy::ForceFresh);
        assert_eq!(ConnectionPolicy::default_for(Mode::Gw), ConnectionPolicy::AllowReuse);
    }

    #[test]
    fn test_usage_extraction() {
        let payload = ResponsePayload::Structured(json!({
            "choices": [],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }));
        assert_eq!(payload.usage().unwrap()["total_tokens"], 15);

        let null_usage = ResponsePayload::Structured(json!({"usage": null}));
        assert!(null_usage.usage().is_none());

        let fallback = ResponsePayload::Fallback {
            status: 502,
            text: "bad gateway".into(),
        };
        assert!(fallback.usage().is_none());
        assert!(!fallback.is_structured());
    }

    #[test]
    fn test_test_case_serialization() {
        let case = TestCase {
            mode: Mode::Lb,
            base_url: "http://lb".into(),
            index: 4,
            topic: None,
            model: "m".into(),
            shared_prefix_used: true,
        };
        let value = serde_json::to_value(&case).unwrap();
        assert_eq!(value["mode"], "lb");
        assert_eq!(value["shared_prefix"], true);
        assert!(value["topic"].is_null());
    }
}
