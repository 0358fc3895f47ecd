//! LLM Factory - Provider Abstraction Layer
//!
//! Creates language models from settings.
//!
//! ## Supported Providers
//! - **Cloud**: OpenAI-compatible chat completions (Groq, OpenAI)
//! - **Local**: Ollama
//! - **Embedded**: llama.cpp `llama-server`
//!
//! ## Example
//! ```ignore
//! let llm = LlmFactory::create(&settings.llm)?;
//! let reply = llm.generate(request).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use campus_assist_config::LlmSettings;
use campus_assist_core::LanguageModel;

use crate::{
    adapter::LanguageModelAdapter,
    backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend},
    llamacpp::LlamaCppBackend,
    LlmError,
};

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Hosted OpenAI-compatible API
    Cloud,
    /// Ollama on the local machine
    #[default]
    Local,
    /// llama.cpp server
    Embedded,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cloud" | "groq" | "openai" => Some(LlmProvider::Cloud),
            "local" | "ollama" => Some(LlmProvider::Local),
            "embedded" | "llamacpp" | "llama.cpp" => Some(LlmProvider::Embedded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Cloud => "cloud",
            LlmProvider::Local => "local",
            LlmProvider::Embedded => "embedded",
        }
    }
}

/// Factory for creating LLM backends
pub struct LlmFactory;

impl LlmFactory {
    /// Create a LanguageModel from settings (implements core trait)
    pub fn create(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, LlmError> {
        let backend = Self::create_backend(settings)?;
        let timeout = Duration::from_secs(settings.timeout_secs);

        tracing::info!(
            provider = %settings.provider,
            model = %backend.model_name(),
            timeout_secs = settings.timeout_secs,
            "Language model configured"
        );

        Ok(Arc::new(LanguageModelAdapter::from_arc(backend, timeout)))
    }

    /// Create a raw LlmBackend (for low-level access)
    pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let provider = LlmProvider::from_str(&settings.provider).ok_or_else(|| {
            LlmError::Configuration(format!("Unknown LLM provider: {}", settings.provider))
        })?;
        let config = LlmConfig::from_settings(settings);

        Ok(match provider {
            LlmProvider::Cloud => Arc::new(OpenAIBackend::new(config)?),
            LlmProvider::Local => Arc::new(OllamaBackend::new(config)?),
            LlmProvider::Embedded => Arc::new(LlamaCppBackend::new(config)?),
        })
    }
}
