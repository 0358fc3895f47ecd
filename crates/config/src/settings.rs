//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{dialogue, endpoints, models, rag, timeouts};
use crate::ConfigError;

/// Provider names accepted in `llm.provider`
const KNOWN_PROVIDERS: &[&str] = &[
    "cloud", "groq", "openai", "local", "ollama", "embedded", "llamacpp", "llama.cpp",
];

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// All validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Completion provider
    #[serde(default)]
    pub llm: LlmSettings,

    /// Embedding provider
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Knowledge base and retrieval
    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub dialogue: DialogueConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Path to the domain configuration file (YAML, JSON or TOML).
    /// Built-in defaults are used when the file does not exist.
    #[serde(default = "default_domain_config_path")]
    pub domain_config_path: String,
}

fn default_domain_config_path() -> String {
    "config/domain.yaml".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            llm: LlmSettings::default(),
            embedding: EmbeddingConfig::default(),
            rag: RagConfig::default(),
            dialogue: DialogueConfig::default(),
            observability: ObservabilityConfig::default(),
            domain_config_path: default_domain_config_path(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_embedding()?;
        self.validate_rag()?;
        self.validate_dialogue()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 Any origin will be accepted."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        let provider = llm.provider.trim().to_lowercase();

        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "llm.provider".to_string(),
                message: format!(
                    "Unknown provider '{}', expected one of: {}",
                    llm.provider,
                    KNOWN_PROVIDERS.join(", ")
                ),
            });
        }

        if llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            });
        }

        if llm.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.max_tokens".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        let is_cloud = matches!(provider.as_str(), "cloud" | "groq" | "openai");
        let has_key = llm.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if is_cloud && !has_key {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "llm.api_key".to_string(),
                    message: "API key must be set for the cloud provider".to_string(),
                });
            }
            tracing::warn!("Cloud LLM provider configured without an API key");
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.timeout_secs".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::MissingField("embedding.model".to_string()));
        }

        Ok(())
    }

    fn validate_rag(&self) -> Result<(), ConfigError> {
        let rag = &self.rag;

        if !(0.0..=1.0).contains(&rag.min_score) {
            return Err(ConfigError::InvalidValue {
                field: "rag.min_score".to_string(),
                message: format!("Must be between 0.0 and 1.0, got {}", rag.min_score),
            });
        }

        if rag.default_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.default_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if rag.chat_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rag.chat_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    fn validate_dialogue(&self) -> Result<(), ConfigError> {
        let dialogue = &self.dialogue;

        if dialogue.greeting.trim().is_empty() {
            return Err(ConfigError::MissingField("dialogue.greeting".to_string()));
        }

        if dialogue.turn_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.turn_timeout_secs".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        // The turn must finish (and be stored) before the HTTP layer gives up
        if dialogue.turn_timeout_secs >= self.server.timeout_seconds {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.turn_timeout_secs".to_string(),
                message: format!(
                    "Must be below server.timeout_seconds ({}), got {}",
                    self.server.timeout_seconds, dialogue.turn_timeout_secs
                ),
            });
        }

        if dialogue.lock_sweep_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dialogue.lock_sweep_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_timeout() -> u64 {
    timeouts::HTTP_REQUEST_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

/// Completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// `cloud` (OpenAI-compatible), `local` (Ollama) or `embedded` (llama.cpp)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Base URL; a per-provider default applies when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name; a per-provider default applies when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Bearer token for the cloud provider
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// How long Ollama keeps the model loaded
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_llm_provider() -> String {
    "local".to_string()
}
fn default_provider_timeout() -> u64 {
    timeouts::PROVIDER_SECS
}
fn default_llm_max_tokens() -> u32 {
    dialogue::ANSWER_MAX_TOKENS
}
fn default_llm_temperature() -> f32 {
    dialogue::ANSWER_TEMPERATURE
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    100
}
fn default_keep_alive() -> String {
    "5m".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: None,
            model: None,
            api_key: None,
            timeout_secs: default_provider_timeout(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            keep_alive: default_keep_alive(),
        }
    }
}

impl LlmSettings {
    /// Configured endpoint, or the default for the provider
    pub fn endpoint_or_default(&self) -> String {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            return endpoint.trim_end_matches('/').to_string();
        }
        match self.provider.trim().to_lowercase().as_str() {
            "cloud" | "groq" => endpoints::GROQ_DEFAULT.to_string(),
            "openai" => endpoints::OPENAI_DEFAULT.to_string(),
            "embedded" | "llamacpp" | "llama.cpp" => endpoints::LLAMACPP_DEFAULT.to_string(),
            _ => endpoints::OLLAMA_DEFAULT.to_string(),
        }
    }

    /// Configured model, or the default for the provider
    pub fn model_or_default(&self) -> String {
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return model.to_string();
        }
        match self.provider.trim().to_lowercase().as_str() {
            "cloud" | "groq" | "openai" => models::CLOUD_CHAT.to_string(),
            _ => models::LOCAL_CHAT.to_string(),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    models::EMBEDDING.to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Knowledge base and retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Directory of knowledge files (one per category)
    #[serde(default = "default_knowledge_dir")]
    pub knowledge_dir: String,

    /// Embedded corpus cache file
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// Results scoring at or below this are dropped
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Limit used by the search endpoint when the request has none
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Results retrieved to ground a chat answer
    #[serde(default = "default_chat_limit")]
    pub chat_limit: usize,

    /// Run ingestion at startup when no cache file exists
    #[serde(default)]
    pub ingest_on_start: bool,
}

fn default_knowledge_dir() -> String {
    "knowledge".to_string()
}
fn default_cache_path() -> String {
    "data/embeddings-cache.json".to_string()
}
fn default_min_score() -> f32 {
    rag::MIN_SCORE
}
fn default_limit() -> usize {
    rag::DEFAULT_LIMIT
}
fn default_chat_limit() -> usize {
    rag::CHAT_LIMIT
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            knowledge_dir: default_knowledge_dir(),
            cache_path: default_cache_path(),
            min_score: default_min_score(),
            default_limit: default_limit(),
            chat_limit: default_chat_limit(),
            ingest_on_start: false,
        }
    }
}

/// Dialogue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// First assistant message of every session
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Conversation turns included in the answer prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// A grounded answer must be longer than this to ask for confirmation
    #[serde(default = "default_confirm_min_chars")]
    pub confirm_min_response_chars: usize,

    /// Deadline for the provider calls of one turn; past it the turn
    /// degrades instead of waiting
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,

    /// Interval of the idle session-lock sweep
    #[serde(default = "default_lock_sweep")]
    pub lock_sweep_secs: u64,
}

fn default_greeting() -> String {
    "Hi there! I'm the Student Assistant. How can I help you today?".to_string()
}
fn default_history_window() -> usize {
    dialogue::HISTORY_WINDOW
}
fn default_confirm_min_chars() -> usize {
    dialogue::CONFIRM_MIN_RESPONSE_CHARS
}
fn default_turn_timeout() -> u64 {
    dialogue::TURN_TIMEOUT_SECS
}
fn default_lock_sweep() -> u64 {
    dialogue::LOCK_SWEEP_SECS
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            history_window: default_history_window(),
            confirm_min_response_chars: default_confirm_min_chars(),
            turn_timeout_secs: default_turn_timeout(),
            lock_sweep_secs: default_lock_sweep(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CAMPUS_ASSIST__ prefix, e.g. `CAMPUS_ASSIST__LLM__PROVIDER=cloud`)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
/// 4. Built-in defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CAMPUS_ASSIST")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.llm.timeout_secs, 30);
        assert_eq!(settings.rag.min_score, 0.3);
        assert_eq!(settings.embedding.model, "nomic-embed-text");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_rag_min_score_validation() {
        let mut settings = Settings::default();
        settings.rag.min_score = 1.5;
        assert!(settings.validate().is_err());

        settings.rag.min_score = 0.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut settings = Settings::default();
        settings.llm.provider = "carrier-pigeon".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("llm.provider"));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut settings = Settings::default();
        settings.llm.timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_turn_deadline_must_fit_request_timeout() {
        let mut settings = Settings::default();
        assert!(settings.dialogue.turn_timeout_secs < settings.server.timeout_seconds);

        settings.server.timeout_seconds = settings.dialogue.turn_timeout_secs;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("dialogue.turn_timeout_secs"));

        settings.server.timeout_seconds = 120;
        settings.dialogue.turn_timeout_secs = 90;
        assert!(settings.validate().is_ok());

        settings.dialogue.turn_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_cloud_without_key() {
        let mut settings = Settings::default();
        settings.llm.provider = "cloud".to_string();
        assert!(settings.validate().is_ok());

        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());

        settings.llm.api_key = Some("gsk_test".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_provider_defaults() {
        let mut llm = LlmSettings::default();
        assert_eq!(llm.endpoint_or_default(), "http://localhost:11434");
        assert_eq!(llm.model_or_default(), "qwen2.5:0.5b");

        llm.provider = "embedded".to_string();
        assert_eq!(llm.endpoint_or_default(), "http://localhost:8080");

        llm.provider = "groq".to_string();
        assert_eq!(llm.endpoint_or_default(), "https://api.groq.com/openai/v1");

        llm.endpoint = Some("http://gpu-box:9000/".to_string());
        assert_eq!(llm.endpoint_or_default(), "http://gpu-box:9000");
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = "llm:\n  provider: embedded\nrag:\n  ingest_on_start: true\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.llm.provider, "embedded");
        assert!(settings.rag.ingest_on_start);
        assert_eq!(settings.rag.chat_limit, 3);
        assert_eq!(settings.dialogue.history_window, 4);
    }
}
