//! LLM Backend implementations
//!
//! Every backend speaks to one HTTP service and knows how to run a
//! completion either in one shot or token by token into an mpsc channel.
//! The adapter in `adapter.rs` turns any backend into the core
//! `LanguageModel::complete()` stream.
//!
//! - `OllamaBackend` - Local provider, `/api/chat` with NDJSON streaming
//! - `OpenAIBackend` - Cloud provider, OpenAI-compatible chat completions with SSE
//! - `LlamaCppBackend` (see `llamacpp.rs`) - Embedded provider

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use campus_assist_config::LlmSettings;
use campus_assist_core::{FinishReason, GenerateRequest, Message};

use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name/ID
    pub model: String,
    /// Base URL of the service
    pub endpoint: String,
    /// Bearer token (Cloud provider)
    pub api_key: Option<String>,
    /// Default maximum tokens when the request sets none
    pub max_tokens: u32,
    /// Default temperature when the request sets none
    pub temperature: f32,
    pub top_p: f32,
    /// Bound on every HTTP request
    pub timeout: Duration,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry)
    pub initial_backoff: Duration,
    /// How long Ollama keeps the model loaded ("5m", "1h", "-1", "0")
    pub keep_alive: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5:0.5b".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            max_tokens: 150,
            temperature: 0.3,
            top_p: 0.9,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            keep_alive: "5m".to_string(),
        }
    }
}

impl LlmConfig {
    /// Build from the `llm` settings section
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model_or_default(),
            endpoint: settings.endpoint_or_default(),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            keep_alive: settings.keep_alive.clone(),
            ..Default::default()
        }
    }

    pub(crate) fn max_tokens_for(&self, request: &GenerateRequest) -> u32 {
        request.max_tokens.unwrap_or(self.max_tokens)
    }

    pub(crate) fn temperature_for(&self, request: &GenerateRequest) -> f32 {
        request.temperature.unwrap_or(self.temperature)
    }

    pub(crate) fn top_p_for(&self, request: &GenerateRequest) -> f32 {
        request.top_p.unwrap_or(self.top_p)
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Generated text
    pub text: String,
    /// Tokens (or stream deltas) generated
    pub tokens: usize,
    /// Time to first token (ms)
    pub time_to_first_token_ms: u64,
    /// Total generation time (ms)
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

impl GenerationResult {
    fn cancelled(text: String, tokens: usize, start: Instant, first_token: Option<u64>) -> Self {
        Self {
            text,
            tokens,
            time_to_first_token_ms: first_token.unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: FinishReason::Cancelled,
        }
    }
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a full response
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError>;

    /// Generate with streaming; every delta is sent to `tx`.
    ///
    /// A closed channel means the consumer went away: stop reading upstream
    /// and return with `FinishReason::Cancelled`.
    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    /// Check if the service answers
    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;

    /// Estimate tokens (~4 graphemes per token for English)
    fn estimate_tokens(&self, text: &str) -> usize {
        use unicode_segmentation::UnicodeSegmentation;
        text.graphemes(true).count().max(1) / 4
    }
}

/// Build a reqwest client bounded by the configured timeout
pub(crate) fn build_client(config: &LlmConfig) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Check if an error is worth retrying
pub(crate) fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Network(_) | LlmError::Timeout | LlmError::RateLimited)
}

/// Run `op` with exponential backoff on transient failures
pub(crate) async fn with_retry<T, F, Fut>(config: &LlmConfig, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_error = None;
    let mut backoff = config.initial_backoff;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tracing::warn!(
                "LLM request failed, retrying in {:?} (attempt {}/{})",
                backoff,
                attempt,
                config.max_retries
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => last_error = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
}

/// Turn a non-success response into the matching error
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited);
    }
    // 5xx errors are retryable, 4xx are not
    if status.is_server_error() {
        return Err(LlmError::Network(format!("Server error {}: {}", status, body)));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(LlmError::ModelNotFound(body));
    }
    Err(LlmError::Api(format!("HTTP {}: {}", status, body)))
}

/// Splits a byte stream into complete lines
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buffer: String,
}

impl LineBuffer {
    /// Append bytes and drain every complete, non-empty line
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

// =============================================================================
// Ollama (Local)
// =============================================================================

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request(&self, request: &GenerateRequest, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature_for(request)),
                top_p: Some(self.config.top_p_for(request)),
                num_predict: Some(self.config.max_tokens_for(request) as i32),
                stop: request.stop.clone(),
            }),
            keep_alive: Some(self.config.keep_alive.clone()),
        }
    }

    async fn send(&self, request: &OllamaChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(request).send().await?;
        check_status(response).await
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let body = self.build_request(request, false);

        let result: OllamaChatResponse = with_retry(&self.config, || async {
            self.send(&body)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))
        })
        .await?;

        let finish_reason = match result.done_reason.as_deref() {
            Some("length") => FinishReason::Length,
            _ if result.done => FinishReason::Stop,
            _ => FinishReason::Length,
        };

        Ok(GenerationResult {
            text: result.message.content,
            tokens: result.eval_count.unwrap_or(0) as usize,
            time_to_first_token_ms: result.prompt_eval_duration.unwrap_or(0) / 1_000_000,
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let body = self.build_request(request, true);

        // Only establishing the stream is retried; tokens already sent cannot be replayed
        let response = with_retry(&self.config, || self.send(&body)).await?;

        let mut first_token_ms = None;
        let mut total_tokens = 0;
        let mut full_response = String::new();
        let mut finish_reason = FinishReason::Stop;
        let mut done = false;
        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            // Parse each line (NDJSON)
            for line in lines.push(&chunk) {
                let Ok(parsed) = serde_json::from_str::<OllamaStreamChunk>(&line) else {
                    tracing::debug!(line = %line, "Skipping unparseable Ollama stream line");
                    continue;
                };

                if let Some(message) = parsed.message {
                    if !message.content.is_empty() {
                        first_token_ms.get_or_insert(start.elapsed().as_millis() as u64);
                        full_response.push_str(&message.content);
                        total_tokens += 1;

                        if tx.send(message.content).await.is_err() {
                            return Ok(GenerationResult::cancelled(
                                full_response,
                                total_tokens,
                                start,
                                first_token_ms,
                            ));
                        }
                    }
                }

                if parsed.done {
                    if parsed.done_reason.as_deref() == Some("length") {
                        finish_reason = FinishReason::Length;
                    }
                    done = true;
                    break 'outer;
                }
            }
        }

        // Final object without a trailing newline
        if !done {
            if let Some(rest) = lines.finish() {
                if let Ok(parsed) = serde_json::from_str::<OllamaStreamChunk>(&rest) {
                    if let Some(message) = parsed.message.filter(|m| !m.content.is_empty()) {
                        full_response.push_str(&message.content);
                        total_tokens += 1;
                        if tx.send(message.content).await.is_err() {
                            finish_reason = FinishReason::Cancelled;
                        }
                    }
                }
            }
        }

        Ok(GenerationResult {
            text: full_response,
            tokens: total_tokens,
            time_to_first_token_ms: first_token_ms.unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
}

// =============================================================================
// OpenAI-compatible (Cloud)
// =============================================================================

/// OpenAI-compatible backend
///
/// Works with:
/// - Groq (`https://api.groq.com/openai/v1`)
/// - OpenAI
/// - Local servers with OpenAI-compatible APIs (vLLM, llama.cpp `--api`)
pub struct OpenAIBackend {
    config: LlmConfig,
    client: Client,
}

impl OpenAIBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let has_key = config.api_key.as_deref().is_some_and(|k| !k.is_empty());
        let is_local = config.endpoint.starts_with("http://localhost")
            || config.endpoint.starts_with("http://127.0.0.1");
        if !has_key && !is_local {
            return Err(LlmError::Configuration(
                "API key required for remote endpoints".to_string(),
            ));
        }

        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    /// Get the full API URL for chat completions
    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();

        if let Some(ref key) = self.config.api_key {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }

        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        headers
    }

    fn build_request(&self, request: &GenerateRequest, stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.config.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(self.config.max_tokens_for(request)),
            temperature: Some(self.config.temperature_for(request)),
            top_p: Some(self.config.top_p_for(request)),
            stop: request.stop.clone(),
            stream: Some(stream),
        }
    }

    async fn send(&self, body: &OpenAIChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

fn openai_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

#[async_trait]
impl LlmBackend for OpenAIBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let body = self.build_request(request, false);

        let response: OpenAIChatResponse = with_retry(&self.config, || async {
            self.send(&body)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))
        })
        .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

        let total_time_ms = start.elapsed().as_millis() as u64;

        Ok(GenerationResult {
            text: choice.message.content,
            tokens: response.usage.map(|u| u.completion_tokens).unwrap_or(0),
            // Non-streaming, so same as total
            time_to_first_token_ms: total_time_ms,
            total_time_ms,
            finish_reason: openai_finish_reason(choice.finish_reason.as_deref()),
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerateRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let body = self.build_request(request, true);
        let response = with_retry(&self.config, || self.send(&body)).await?;

        let mut first_token_ms = None;
        let mut full_text = String::new();
        let mut token_count = 0;
        let mut finish_reason = FinishReason::Stop;
        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;

            for line in lines.push(&chunk) {
                let Some(json_str) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if json_str == "[DONE]" {
                    break 'outer;
                }

                let Ok(parsed) = serde_json::from_str::<OpenAIStreamChunk>(json_str) else {
                    continue;
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };

                if let Some(content) = choice.delta.and_then(|d| d.content) {
                    if !content.is_empty() {
                        first_token_ms.get_or_insert(start.elapsed().as_millis() as u64);
                        full_text.push_str(&content);
                        token_count += 1;

                        if tx.send(content).await.is_err() {
                            return Ok(GenerationResult::cancelled(
                                full_text,
                                token_count,
                                start,
                                first_token_ms,
                            ));
                        }
                    }
                }

                if choice.finish_reason.is_some() {
                    finish_reason = openai_finish_reason(choice.finish_reason.as_deref());
                }
            }
        }

        let total_time_ms = start.elapsed().as_millis() as u64;

        Ok(GenerationResult {
            text: full_text,
            tokens: token_count,
            time_to_first_token_ms: first_token_ms.unwrap_or(total_time_ms),
            total_time_ms,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.endpoint.trim_end_matches('/'));
        self.client
            .get(&url)
            .headers(self.build_headers())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: Option<OpenAIDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_config_default() {
        let config = LlmConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.keep_alive, "5m");
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings {
            provider: "groq".to_string(),
            api_key: Some("gsk_test".to_string()),
            timeout_secs: 12,
            ..Default::default()
        };
        let config = LlmConfig::from_settings(&settings);
        assert_eq!(config.endpoint, "https://api.groq.com/openai/v1");
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_request_overrides_config() {
        let config = LlmConfig::default();
        let request = GenerateRequest::new("sys")
            .with_max_tokens(300)
            .with_temperature(0.9);
        assert_eq!(config.max_tokens_for(&request), 300);
        assert_eq!(config.temperature_for(&request), 0.9);

        let plain = GenerateRequest::new("sys");
        assert_eq!(config.max_tokens_for(&plain), 150);
    }

    #[test]
    fn test_line_buffer_handles_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        let lines = buffer.push(b"1}\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "data: [DONE]"]);
        assert!(buffer.finish().is_none());

        buffer.push(b"{\"done\":true}");
        assert_eq!(buffer.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn test_ollama_request_serialization() {
        let backend = OllamaBackend::new(LlmConfig::default()).unwrap();
        let request = GenerateRequest::new("You help students").with_user_message("Hi");
        let json = serde_json::to_value(backend.build_request(&request, true)).unwrap();

        assert_eq!(json["model"], "qwen2.5:0.5b");
        assert_eq!(json["stream"], true);
        assert_eq!(json["keep_alive"], "5m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hi");
        assert_eq!(json["options"]["num_predict"], 150);
    }

    #[test]
    fn test_ollama_stream_chunk_parsing() {
        let chunk: OllamaStreamChunk = serde_json::from_str(
            r#"{"model":"m","message":{"role":"assistant","content":"Hel"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(chunk.message.unwrap().content, "Hel");

        let last: OllamaStreamChunk =
            serde_json::from_str(r#"{"model":"m","done":true,"done_reason":"length"}"#).unwrap();
        assert!(last.done);
        assert_eq!(last.done_reason.as_deref(), Some("length"));
    }

    #[test]
    fn test_openai_backend_creation() {
        // Local endpoint works without an API key
        let config = LlmConfig {
            endpoint: "http://localhost:8000/v1".to_string(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(config).is_ok());

        // Remote endpoint requires one
        let config = LlmConfig {
            endpoint: "https://api.groq.com/openai/v1".to_string(),
            ..Default::default()
        };
        assert!(OpenAIBackend::new(config).is_err());

        let config = LlmConfig {
            endpoint: "https://api.groq.com/openai/v1/".to_string(),
            api_key: Some("gsk_test".to_string()),
            ..Default::default()
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.chat_url(), "https://api.groq.com/openai/v1/chat/completions");
        assert!(backend
            .build_headers()
            .get(reqwest::header::AUTHORIZATION)
            .is_some());
    }

    #[test]
    fn test_openai_stream_chunk_parsing() {
        let chunk: OpenAIStreamChunk = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        let choice = &chunk.choices[0];
        assert_eq!(
            choice.delta.as_ref().and_then(|d| d.content.as_deref()),
            Some("Hi")
        );
        assert_eq!(openai_finish_reason(Some("length")), FinishReason::Length);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let config = LlmConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);

        let result: Result<(), LlmError> = with_retry(&config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Network("connection refused".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_client_errors() {
        let config = LlmConfig {
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let attempts = AtomicU32::new(0);

        let result: Result<(), LlmError> = with_retry(&config, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Api("HTTP 400: bad request".to_string()))
        })
        .await;

        assert!(matches!(result, Err(LlmError::Api(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
