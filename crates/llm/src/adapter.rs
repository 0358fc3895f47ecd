//! Language Model adapter
//!
//! Bridges the LlmBackend trait to the core LanguageModel trait, so every
//! backend is consumed through the single `complete()` stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use campus_assist_core::{
    CompletionStream, Error, GenerateRequest, LanguageModel, StreamChunk,
};

use crate::backend::LlmBackend;

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Adapter that wraps an LlmBackend to implement the core LanguageModel trait.
///
/// - `request.stream == false`: one text chunk, then the final chunk
/// - `request.stream == true`: the backend runs in a spawned task feeding an
///   mpsc channel; dropping the returned stream aborts that task
///
/// Either way the whole call is bounded by `timeout`; hitting it yields
/// `Error::ProviderUnavailable`.
///
/// # Example
///
/// ```ignore
/// let backend = OllamaBackend::new(config)?;
/// let llm: Arc<dyn LanguageModel> = Arc::new(
///     LanguageModelAdapter::new(backend, Duration::from_secs(30))
/// );
/// ```
pub struct LanguageModelAdapter {
    backend: Arc<dyn LlmBackend>,
    model_name: String,
    timeout: Duration,
}

impl LanguageModelAdapter {
    pub fn new<B: LlmBackend + 'static>(backend: B, timeout: Duration) -> Self {
        Self::from_arc(Arc::new(backend), timeout)
    }

    pub fn from_arc(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        let model_name = backend.model_name().to_string();
        Self {
            backend,
            model_name,
            timeout,
        }
    }

    fn timeout_error(model: &str, timeout: Duration) -> Error {
        Error::ProviderUnavailable(format!("{} did not answer within {:?}", model, timeout))
    }
}

#[async_trait]
impl LanguageModel for LanguageModelAdapter {
    fn complete<'a>(&'a self, request: GenerateRequest) -> CompletionStream<'a> {
        let backend = self.backend.clone();
        let timeout = self.timeout;
        let model = self.model_name.clone();

        if !request.stream {
            return Box::pin(async_stream::stream! {
                match tokio::time::timeout(timeout, backend.generate(&request)).await {
                    Ok(Ok(result)) => {
                        if !result.text.is_empty() {
                            yield Ok(StreamChunk::text(result.text));
                        }
                        yield Ok(StreamChunk::final_chunk(result.finish_reason));
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(model = %model, error = %e, "Completion failed");
                        yield Err(e.into());
                    }
                    Err(_) => {
                        tracing::warn!(model = %model, ?timeout, "Completion timed out");
                        yield Err(Self::timeout_error(&model, timeout));
                    }
                }
            });
        }

        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::channel::<String>(100);
            let deadline = tokio::time::Instant::now() + timeout;

            let mut task = AbortOnDrop(tokio::spawn(async move {
                backend.generate_stream(&request, tx).await
            }));

            let mut timed_out = false;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(text)) => yield Ok(StreamChunk::text(text)),
                    Ok(None) => break,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }

            if timed_out {
                tracing::warn!(model = %model, ?timeout, "Streaming completion timed out");
                yield Err(Self::timeout_error(&model, timeout));
            } else {
                match (&mut task.0).await {
                    Ok(Ok(result)) => {
                        yield Ok(StreamChunk::final_chunk(result.finish_reason));
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(model = %model, error = %e, "Streaming completion failed");
                        yield Err(e.into());
                    }
                    Err(e) => {
                        yield Err(Error::Internal(format!("Completion task failed: {}", e)));
                    }
                }
            }
        })
    }

    async fn is_available(&self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), self.backend.is_available())
            .await
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.backend.estimate_tokens(text)
    }
}
