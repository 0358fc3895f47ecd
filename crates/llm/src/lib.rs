//! Language model providers for the student assistant
//!
//! Features:
//! - Multiple backend support (Ollama, OpenAI-compatible cloud APIs, llama.cpp)
//! - One streaming `complete()` entry point via [`LanguageModelAdapter`]
//! - Retry with exponential backoff for transient failures
//! - Prompt assembly for grounded short answers

pub mod adapter;
pub mod backend;
pub mod factory;
pub mod llamacpp;
pub mod prompt;

pub use adapter::LanguageModelAdapter;
pub use backend::{GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend};
pub use factory::{LlmFactory, LlmProvider};
pub use llamacpp::LlamaCppBackend;
pub use prompt::PromptBuilder;

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for campus_assist_core::Error {
    fn from(err: LlmError) -> Self {
        use campus_assist_core::Error;
        match err {
            LlmError::Configuration(msg) => Error::Config(msg),
            other => Error::ProviderUnavailable(other.to_string()),
        }
    }
}
