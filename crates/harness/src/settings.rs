// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Layered harness settings.
//!
//! Sources are merged in increasing precedence:
//!
//! 1. Built-in defaults
//! 2. An optional settings file (TOML, YAML or JSON, by extension)
//! 3. `LOCALITY_*` environment variables (e.g. `LOCALITY_GW_URL`)
//! 4. Command-line flags, applied by the caller after loading

use crate::executor::{CallOptions, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::prompts::{load_shared_prefix, parse_delimiter, CsvPromptSource, DEFAULT_CORPUS};
use crate::sequencer::{Echo, RunPlan, SequencerOptions, DEFAULT_WARMUP_PROMPT};
use llm_locality_benchmarks::io::DEFAULT_SINK;
use llm_locality_core::endpoint::resolve_for_mode;
use llm_locality_core::{BenchError, ConfigurationError, ConnectionPolicy, Mode, TransportMode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Prefix of environment variables read by [`HarnessSettings::load`].
pub const ENV_PREFIX: &str = "LOCALITY";

/// Connection policy as configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionChoice {
    /// Fresh connections for `lb`, reuse for `gw`.
    #[default]
    Auto,
    /// Always force a fresh connection.
    Fresh,
    /// Always allow connection reuse.
    Reuse,
}

impl ConnectionChoice {
    /// Concrete policy for a mode.
    pub fn resolve(self, mode: Mode) -> ConnectionPolicy {
        match self {
            ConnectionChoice::Auto => ConnectionPolicy::default_for(mode),
            ConnectionChoice::Fresh => ConnectionPolicy::ForceFresh,
            ConnectionChoice::Reuse => ConnectionPolicy::AllowReuse,
        }
    }
}

impl std::str::FromStr for ConnectionChoice {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ConnectionChoice::Auto),
            "fresh" | "force-fresh" => Ok(ConnectionChoice::Fresh),
            "reuse" | "allow-reuse" => Ok(ConnectionChoice::Reuse),
            other => Err(ConfigurationError::InvalidValue {
                key: "connection".into(),
                reason: format!("'{other}' is not one of auto, fresh, reuse"),
            }),
        }
    }
}

/// Effective harness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Target mode (`lb` or `gw`).
    pub mode: Option<String>,
    /// Plain load balancer base URL.
    pub lb_url: Option<String>,
    /// Inference gateway base URL.
    pub gw_url: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Per-call timeout in seconds.
    pub timeout_secs: f64,
    /// Untimed warmup calls before the cold call.
    pub warmup: u32,
    /// Use SSE streaming to capture first-token latency.
    pub stream: bool,
    /// Prompt corpus path.
    pub corpus: PathBuf,
    /// Corpus field delimiter.
    pub delimiter: String,
    /// File whose contents are prepended to both prompts.
    pub shared_prefix_file: Option<PathBuf>,
    /// Result sink path.
    pub sink: PathBuf,
    /// Connection policy.
    pub connection: ConnectionChoice,
    /// Extra request headers as `NAME:VALUE`.
    pub headers: Vec<String>,
    /// Response header naming the serving backend instance.
    pub upstream_header: Option<String>,
    /// `max_tokens` request field.
    pub max_tokens: u32,
    /// `temperature` request field.
    pub temperature: f32,
    /// Pause between the cold and warm calls, in milliseconds.
    pub inter_call_pause_ms: u64,
    /// Prompt sent by warmup calls.
    pub warmup_prompt: String,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            mode: None,
            lb_url: None,
            gw_url: None,
            model: "Qwen/Qwen3-0.6B".to_string(),
            timeout_secs: 90.0,
            warmup: 0,
            stream: false,
            corpus: PathBuf::from(DEFAULT_CORPUS),
            delimiter: ",".to_string(),
            shared_prefix_file: None,
            sink: PathBuf::from(DEFAULT_SINK),
            connection: ConnectionChoice::Auto,
            headers: Vec::new(),
            upstream_header: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            inter_call_pause_ms: 50,
            warmup_prompt: DEFAULT_WARMUP_PROMPT.to_string(),
        }
    }
}

impl HarnessSettings {
    /// Merge defaults, an optional file and the environment.
    ///
    /// A file given explicitly must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "loading settings file");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|err| ConfigurationError::Load(err.to_string()))
    }

    /// Parsed target mode.
    pub fn resolve_mode(&self) -> Result<Mode, ConfigurationError> {
        match self.mode.as_deref().map(str::trim) {
            Some(mode) if !mode.is_empty() => mode.parse(),
            _ => Err(ConfigurationError::InvalidValue {
                key: "mode".into(),
                reason: "a mode is required (lb or gw)".into(),
            }),
        }
    }

    /// Base URL for `mode`.
    pub fn base_url(&self, mode: Mode) -> Result<String, ConfigurationError> {
        resolve_for_mode(mode, self.lb_url.as_deref(), self.gw_url.as_deref())
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Result<Duration, ConfigurationError> {
        if !self.timeout_secs.is_finite() || self.timeout_secs <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                key: "timeout_secs".into(),
                reason: format!("{} is not a positive number of seconds", self.timeout_secs),
            });
        }
        Ok(Duration::from_secs_f64(self.timeout_secs))
    }

    /// Corpus delimiter as a byte.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigurationError> {
        parse_delimiter(&self.delimiter).ok_or_else(|| ConfigurationError::InvalidValue {
            key: "delimiter".into(),
            reason: format!("'{}' is not a single ASCII character", self.delimiter),
        })
    }

    /// Transport mode.
    pub fn transport(&self) -> TransportMode {
        if self.stream {
            TransportMode::Streaming
        } else {
            TransportMode::Buffered
        }
    }

    /// Validated extra request headers.
    pub fn header_map(&self) -> Result<HeaderMap, ConfigurationError> {
        parse_headers(&self.headers)
    }

    /// Call options for `mode`.
    pub fn call_options(&self, mode: Mode) -> Result<CallOptions, ConfigurationError> {
        Ok(CallOptions {
            timeout: self.timeout()?,
            transport: self.transport(),
            connection: self.connection.resolve(mode),
            extra_headers: self.header_map()?,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }

    /// Sequencer tunables.
    pub fn sequencer_options(&self, echo: Echo) -> SequencerOptions {
        SequencerOptions {
            inter_call_pause: Duration::from_millis(self.inter_call_pause_ms),
            warmup_prompt: self.warmup_prompt.clone(),
            upstream_header: self
                .upstream_header
                .as_deref()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string),
            echo,
        }
    }

    /// Prompt source over the configured corpus.
    pub fn prompt_source(&self) -> Result<CsvPromptSource, ConfigurationError> {
        Ok(CsvPromptSource::new(&self.corpus, self.delimiter_byte()?))
    }

    /// Build the plan for corpus `index`.
    ///
    /// Everything is validated here, before any network call.
    pub fn plan(&self, index: usize) -> Result<RunPlan, BenchError> {
        let mode = self.resolve_mode()?;
        let base_url = self.base_url(mode)?;
        let call = self.call_options(mode)?;
        let shared_prefix = load_shared_prefix(self.shared_prefix_file.as_deref())?;

        Ok(RunPlan {
            mode,
            base_url,
            index,
            model: self.model.clone(),
            shared_prefix,
            call,
            warmup: self.warmup,
        })
    }
}

/// Parse `NAME:VALUE` header arguments.
pub fn parse_headers<S: AsRef<str>>(raw: &[S]) -> Result<HeaderMap, ConfigurationError> {
    let mut headers = HeaderMap::new();
    for entry in raw {
        let entry = entry.as_ref();
        let invalid = |reason: &str| ConfigurationError::InvalidHeader {
            header: entry.to_string(),
            reason: reason.to_string(),
        };

        let (name, value) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected NAME:VALUE"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| invalid("invalid header name"))?;
        let value =
            HeaderValue::from_str(value.trim()).map_err(|_| invalid("invalid header value"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = HarnessSettings::default();
        assert_eq!(settings.model, "Qwen/Qwen3-0.6B");
        assert_eq!(settings.timeout().unwrap(), Duration::from_secs(90));
        assert_eq!(settings.warmup, 0);
        assert_eq!(settings.transport(), TransportMode::Buffered);
        assert_eq!(settings.corpus, PathBuf::from("prompts.txt"));
        assert_eq!(settings.sink, PathBuf::from("results.jsonl"));
        assert_eq!(settings.delimiter_byte().unwrap(), b',');
        assert_eq!(settings.warmup_prompt, "warm up");

        let options = settings.sequencer_options(Echo::Compact);
        assert_eq!(options.inter_call_pause, Duration::from_millis(50));
        assert_eq!(options.echo, Echo::Compact);
        assert_eq!(options.upstream_header, None);
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = settings_file(
            ".toml",
            r#"
mode = "gw"
gw_url = "http://gateway:8000/"
timeout_secs = 5.5
warmup = 2
stream = true
delimiter = "|"
connection = "fresh"
headers = ["x-session-affinity: abc"]
upstream_header = "x-upstream-instance"
"#,
        );

        let settings = HarnessSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.model, "Qwen/Qwen3-0.6B");
        assert_eq!(settings.warmup, 2);

        let plan = settings.plan(4).unwrap();
        assert_eq!(plan.mode, Mode::Gw);
        assert_eq!(plan.base_url, "http://gateway:8000");
        assert_eq!(plan.index, 4);
        assert_eq!(plan.warmup, 2);
        assert_eq!(plan.call.timeout, Duration::from_millis(5500));
        assert_eq!(plan.call.transport, TransportMode::Streaming);
        assert_eq!(plan.call.connection, ConnectionPolicy::ForceFresh);
        assert_eq!(plan.call.extra_headers["x-session-affinity"], "abc");
        assert_eq!(settings.delimiter_byte().unwrap(), b'|');
    }

    #[test]
    fn test_missing_settings_file() {
        let err = HarnessSettings::load(Some(Path::new("/nonexistent/locality.toml"))).unwrap_err();
        assert!(matches!(err, ConfigurationError::Load(_)));
    }

    #[test]
    fn test_auto_connection_by_mode() {
        assert_eq!(ConnectionChoice::Auto.resolve(Mode::Lb), ConnectionPolicy::ForceFresh);
        assert_eq!(ConnectionChoice::Auto.resolve(Mode::Gw), ConnectionPolicy::AllowReuse);
        assert_eq!(ConnectionChoice::Reuse.resolve(Mode::Lb), ConnectionPolicy::AllowReuse);
        assert_eq!("force-fresh".parse::<ConnectionChoice>().unwrap(), ConnectionChoice::Fresh);
        assert!("sometimes".parse::<ConnectionChoice>().is_err());
    }

    #[test]
    fn test_plan_requires_mode_and_url() {
        let mut settings = HarnessSettings::default();
        assert!(matches!(
            settings.plan(0),
            Err(BenchError::Configuration(ConfigurationError::InvalidValue { .. }))
        ));

        settings.mode = Some("lb".into());
        settings.gw_url = Some("http://gw".into());
        assert!(matches!(
            settings.plan(0),
            Err(BenchError::Configuration(ConfigurationError::MissingBaseUrl { mode: Mode::Lb }))
        ));

        settings.mode = Some("zz".into());
        assert!(matches!(
            settings.plan(0),
            Err(BenchError::Configuration(ConfigurationError::UnsupportedMode(_)))
        ));
    }

    #[test]
    fn test_plan_loads_shared_prefix() {
        let prefix = settings_file(".txt", "Shared system context.");
        let settings = HarnessSettings {
            mode: Some("lb".into()),
            lb_url: Some("http://lb/".into()),
            shared_prefix_file: Some(prefix.path().to_path_buf()),
            ..HarnessSettings::default()
        };

        let plan = settings.plan(0).unwrap();
        assert_eq!(plan.shared_prefix.as_deref(), Some("Shared system context."));
        assert_eq!(plan.call.connection, ConnectionPolicy::ForceFresh);
    }

    #[test]
    fn test_invalid_values() {
        let settings = HarnessSettings {
            timeout_secs: 0.0,
            delimiter: "||".into(),
            ..HarnessSettings::default()
        };
        assert!(settings.timeout().is_err());
        assert!(settings.delimiter_byte().is_err());
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&["X-Session-Affinity: user-42", "x-trace:a:b"]).unwrap();
        assert_eq!(headers["x-session-affinity"], "user-42");
        assert_eq!(headers["x-trace"], "a:b");

        for bad in ["no-colon", "bad name: v", "x-ok: line\nbreak"] {
            assert!(
                matches!(parse_headers(&[bad]), Err(ConfigurationError::InvalidHeader { .. })),
                "{bad}"
            );
        }
    }
}
