// Copyright 2025 LLM Locality Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chat call executor.
//!
//! Issues one OpenAI-compatible chat-completion request and measures it.
//! Calls are independent: the executor keeps no per-call state, only a
//! pooled HTTP client used when connection reuse is allowed.
//!
//! # Timing
//!
//! The clock starts right before the request is sent.
//!
//! - Buffered transport: one reading after the full body arrives; first-token
//!   and total latency are equal.
//! - Streaming transport: the first parsed `data:` chunk sets the first-token
//!   latency; the total is read when `[DONE]` arrives or the stream ends.

use crate::sse::{LineBuffer, StreamAccumulator};
use crate::timing::Measurement;
use async_trait::async_trait;
use futures::StreamExt;
use llm_locality_benchmarks::CallTiming;
use llm_locality_core::{ConnectionPolicy, ResponsePayload, TransportError, TransportMode};
use reqwest::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Path appended to the base URL.
pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Default bound on generated tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 128;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Transport and sampling settings for one call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Bound on the whole call, body included.
    pub timeout: Duration,
    /// Buffered or streamed response.
    pub transport: TransportMode,
    /// Connection affinity policy.
    pub connection: ConnectionPolicy,
    /// Additional request headers.
    pub extra_headers: HeaderMap,
    /// `max_tokens` sent with the request.
    pub max_tokens: u32,
    /// `temperature` sent with the request.
    pub temperature: f32,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            transport: TransportMode::Buffered,
            connection: ConnectionPolicy::AllowReuse,
            extra_headers: HeaderMap::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl CallOptions {
    /// Same settings with buffered transport.
    pub fn buffered(&self) -> Self {
        Self {
            transport: TransportMode::Buffered,
            ..self.clone()
        }
    }
}

/// One chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatCall {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sole user message.
    pub prompt: String,
    /// Transport and sampling settings.
    pub options: CallOptions,
}

impl ChatCall {
    /// Full endpoint URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn from_call(call: &'a ChatCall) -> Self {
        let stream = call.options.transport.is_streaming();
        Self {
            model: &call.model,
            messages: [ChatMessage {
                role: "user",
                content: &call.prompt,
            }],
            max_tokens: call.options.max_tokens,
            temperature: call.options.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }
}

/// Outcome of one call.
#[derive(Debug)]
pub struct CallResult {
    /// Time to the first parsed response unit.
    pub first_token_latency: Duration,
    /// Time to completion.
    pub total_latency: Duration,
    /// Parsed body, last stream chunk, or fallback.
    pub payload: ResponsePayload,
    /// Response headers.
    pub headers: HeaderMap,
    /// HTTP status code.
    pub status: u16,
    /// Stream chunks parsed (0 for buffered calls).
    pub chunks: usize,
}

impl CallResult {
    /// A response header as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Keep the fields a benchmark record needs.
    pub fn into_timing(self, upstream_header: Option<&str>) -> CallTiming {
        let upstream = upstream_header
            .and_then(|name| self.header(name))
            .map(str::to_string);
        CallTiming {
            first_token: self.first_token_latency,
            total: self.total_latency,
            usage: self.payload.usage().cloned(),
            upstream,
        }
    }
}

/// Anything that can perform a timed chat-completion call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatExecutor: Send + Sync {
    /// Perform one call.
    ///
    /// # Errors
    ///
    /// Network failures and timeouts surface as [`TransportError`]. HTTP
    /// error statuses do not; they produce a (usually fallback) payload.
    async fn execute(&self, call: ChatCall) -> Result<CallResult, TransportError>;
}

/// reqwest-backed executor.
#[derive(Debug, Clone)]
pub struct HttpChatExecutor {
    pooled: Client,
}

impl HttpChatExecutor {
    /// Create an executor with a pooled client for connection reuse.
    pub fn new() -> Result<Self, TransportError> {
        let pooled = Client::builder()
            .tcp_nodelay(true)
            .build()
            .map_err(|err| TransportError::Network {
                source: Box::new(err),
            })?;
        Ok(Self { pooled })
    }

    fn client_for(&self, policy: ConnectionPolicy) -> Result<Client, TransportError> {
        match policy {
            ConnectionPolicy::AllowReuse => Ok(self.pooled.clone()),
            ConnectionPolicy::ForceFresh => Client::builder()
                .pool_max_idle_per_host(0)
                .tcp_nodelay(true)
                .build()
                .map_err(|err| TransportError::Network {
                    source: Box::new(err),
                }),
        }
    }

    fn build_request(&self, call: &ChatCall) -> Result<RequestBuilder, TransportError> {
        let client = self.client_for(call.options.connection)?;

        let mut request = client
            .post(call.url())
            .timeout(call.options.timeout)
            .headers(call.options.extra_headers.clone())
            .json(&ChatCompletionRequest::from_call(call));
        if call.options.connection == ConnectionPolicy::ForceFresh {
            request = request.header(CONNECTION, HeaderValue::from_static("close"));
        }
        Ok(request)
    }

    async fn read_buffered(
        response: Response,
        measurement: Measurement,
        timeout: Duration,
    ) -> Result<CallResult, TransportError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(err, timeout))?;
        let latency = measurement.finish_buffered();

        let text = String::from_utf8_lossy(&body).into_owned();
        let payload = if is_json(&headers) {
            match serde_json::from_str(&text) {
                Ok(doc) => ResponsePayload::Structured(doc),
                Err(err) => {
                    debug!(error = %err, "response declared JSON but did not parse");
                    ResponsePayload::Fallback { status, text }
                }
            }
        } else {
            ResponsePayload::Fallback { status, text }
        };

        Ok(CallResult {
            first_token_latency: latency.first_token,
            total_latency: latency.total,
            payload,
            headers,
            status,
            chunks: 0,
        })
    }

    async fn read_streaming(
        response: Response,
        measurement: Measurement,
        timeout: Duration,
    ) -> Result<CallResult, TransportError> {
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let mut accumulator = StreamAccumulator::new(measurement);
        let mut lines = LineBuffer::default();
        let mut body = response.bytes_stream();

        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| transport_error(err, timeout))?;
            for line in lines.push(&chunk) {
                if accumulator.on_line(&line).is_break() {
                    break 'read;
                }
            }
        }
        if !accumulator.is_done() {
            if let Some(tail) = lines.finish() {
                let _ = accumulator.on_line(&tail);
            }
        }

        if accumulator.malformed() > 0 {
            debug!(skipped = accumulator.malformed(), "skipped malformed stream chunks");
        }
        let outcome = accumulator.finish(status);
        if !outcome.completed {
            debug!(chunks = outcome.chunks, "stream ended without [DONE]");
        }

        Ok(CallResult {
            first_token_latency: outcome.latency.first_token,
            total_latency: outcome.latency.total,
            payload: outcome.payload,
            headers,
            status,
            chunks: outcome.chunks,
        })
    }
}

#[async_trait]
impl ChatExecutor for HttpChatExecutor {
    async fn execute(&self, call: ChatCall) -> Result<CallResult, TransportError> {
        let request = self.build_request(&call)?;
        let timeout = call.options.timeout;

        let measurement = Measurement::start();
        let response = request
            .send()
            .await
            .map_err(|err| transport_error(err, timeout))?;

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), url = %call.url(), "chat call returned error status");
        }

        let result = match call.options.transport {
            TransportMode::Buffered => Self::read_buffered(response, measurement, timeout).await?,
            TransportMode::Streaming => Self::read_streaming(response, measurement, timeout).await?,
        };

        debug!(
            status = result.status,
            first_token_ms = result.first_token_latency.as_secs_f64() * 1000.0,
            total_ms = result.total_latency.as_secs_f64() * 1000.0,
            chunks = result.chunks,
            connection = %call.options.connection,
            "chat call finished"
        );
        Ok(result)
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json"))
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            after: timeout,
            source: Box::new(err),
        }
    } else if err.is_connect() {
        TransportError::Connect {
            source: Box::new(err),
        }
    } else if err.is_body() || err.is_decode() {
        TransportError::Body {
            source: Box::new(err),
        }
    } else {
        TransportError::Network {
            source: Box::new(err),
        }
    }
}
