//! Language Model traits

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::{FinishReason, GenerateRequest, GenerateResponse, Result, StreamChunk};

/// Stream of completion deltas, terminated by a chunk with `is_final` set
pub type CompletionStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'a>>;

/// Language Model interface
///
/// Implementations:
/// - `LanguageModelAdapter` over Ollama, OpenAI-compatible and llama.cpp backends
///
/// `complete()` is the single completion contract. Non-streaming backends
/// yield one text chunk followed by the final chunk. Every call starts a
/// fresh stream; no cursor state is shared between calls.
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = LlmFactory::create(&settings.llm)?;
/// let request = GenerateRequest::new("You are a student support assistant")
///     .with_user_message("Where do I collect my ID card?");
/// let response = llm.generate(request).await?;
/// println!("{}", response.text);
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Stream completion deltas
    fn complete<'a>(&'a self, request: GenerateRequest) -> CompletionStream<'a>;

    /// Run a completion to the end and return the full text
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        collect_completion(self.complete(request)).await
    }

    /// Check if model is available
    ///
    /// Returns false if model is not loaded or backend is unavailable.
    async fn is_available(&self) -> bool;

    /// Get model name for logging
    fn model_name(&self) -> &str;

    /// Estimate token count for text
    fn estimate_tokens(&self, text: &str) -> usize {
        // ~4 chars per token for English
        text.chars().count() / 4
    }
}

/// Drain a completion stream into a single response
pub async fn collect_completion(mut stream: CompletionStream<'_>) -> Result<GenerateResponse> {
    let mut text = String::new();
    let mut finish_reason = FinishReason::Stop;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        text.push_str(&chunk.delta);
        if chunk.is_final {
            if let Some(reason) = chunk.finish_reason {
                finish_reason = reason;
            }
            break;
        }
    }

    Ok(GenerateResponse {
        text,
        finish_reason,
    })
}
