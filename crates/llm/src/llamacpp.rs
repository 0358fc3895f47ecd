//! llama.cpp server backend (Embedded provider)
//!
//! Talks to the native `/completion` endpoint of `llama-server`. Chat
//! messages are rendered into a ChatML prompt; streaming uses SSE lines of
//! the form `data: {"content": "...", "stop": false}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use campus_assist_core::{FinishReason, GenerateRequest, Message};

use crate::backend::{
    build_client, check_status, with_retry, GenerationResult, LineBuffer, LlmBackend, LlmConfig,
};
use crate::LlmError;

const IM_START: &str = "<|im_start|>";
const IM_END: &str = "<|im_end|>";

/// Render messages as a ChatML prompt ending with an open assistant turn
pub fn render_chatml(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str(IM_START);
        prompt.push_str(message.role.as_str());
        prompt.push('\n');
        prompt.push_str(message.content.trim());
        prompt.push_str(IM_END);
        prompt.push('\n');
    }
    prompt.push_str(IM_START);
    prompt.push_str("assistant\n");
    prompt
}

/// llama.cpp `llama-server` backend
pub struct LlamaCppBackend {
    client: Client,
    config: LlmConfig,
}

impl LlamaCppBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    fn build_request(&self, request: &GenerateRequest, stream: bool) -> CompletionRequest {
        let mut stop = vec![IM_END.to_string()];
        if let Some(extra) = &request.stop {
            stop.extend(extra.iter().cloned());
        }

        CompletionRequest {
            prompt: render_chatml(&request.messages),
            n_predict: self.config.max_tokens_for(request) as i32,
            temperature: self.config.temperature_for(request),
            top_p: self.config.top_p_for(request),
            stop,
            stream,
            cache_prompt: true,
        }
    }

    async fn send(&self, body: &CompletionRequest) -> Result<reqwest::Response, LlmError> {
        let response = self.client.post(self.url("/completion")).json(body).send().await?;
        check_status(response).await
    }
}

fn finish_reason(chunk: &CompletionChunk) -> FinishReason {
    if chunk.stopped_limit {
        FinishReason::Length
    } else {
        FinishReason::Stop
    }
}

#[async_trait]
impl LlmBackend for LlamaCppBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let start = Instant::now();
        let body = self.build_request(request, false);

        let response: CompletionChunk = with_retry(&self.config, || async {
            self.send(&body)
                .await?
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))
        })
        .await?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        Ok(GenerationResult {
            text: response.content.trim().to_string(),
            tokens: response.tokens_predicted.unwrap_or(0) as usize,
            time_to_first_token_ms: total_time_ms,
            total_time_ms,
            finish_reason: finish_reason(&response),
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
        let mut text = String::new();
        let mut tokens = 0;
        let mut reason = FinishReason::Stop;
        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;

            for line in lines.push(&chunk) {
                let Some(json_str) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                let Ok(parsed) = serde_json::from_str::<CompletionChunk>(json_str) else {
                    tracing::debug!(line = %line, "Skipping unparseable llama.cpp stream line");
                    continue;
                };

                if !parsed.content.is_empty() {
                    first_token_ms.get_or_insert(start.elapsed().as_millis() as u64);
                    text.push_str(&parsed.content);
                    tokens += 1;

                    if tx.send(parsed.content.clone()).await.is_err() {
                        return Ok(GenerationResult {
                            text,
                            tokens,
                            time_to_first_token_ms: first_token_ms.unwrap_or(0),
                            total_time_ms: start.elapsed().as_millis() as u64,
                            finish_reason: FinishReason::Cancelled,
                        });
                    }
                }

                if parsed.stop {
                    reason = finish_reason(&parsed);
                    break 'outer;
                }
            }
        }

        Ok(GenerationResult {
            text,
            tokens,
            time_to_first_token_ms: first_token_ms.unwrap_or(0),
            total_time_ms: start.elapsed().as_millis() as u64,
            finish_reason: reason,
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.url("/health"))
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

#[derive(Debug, Serialize)]
struct CompletionRequest {
    prompt: String,
    n_predict: i32,
    temperature: f32,
    top_p: f32,
    stop: Vec<String>,
    stream: bool,
    cache_prompt: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
    #[serde(default)]
    stopped_limit: bool,
    #[serde(default)]
    tokens_predicted: Option<u64>,
}
