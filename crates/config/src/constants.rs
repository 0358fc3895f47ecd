//! Centralized constants for the student support assistant
//!
//! Single source of truth for default values shared between the settings
//! layer and the crates that consume them. Settings fields default to these;
//! code that needs a fixed value (boost caps, prompt sizes) reads them
//! directly.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama server (Local provider and embeddings)
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// llama.cpp server (Embedded provider)
    pub const LLAMACPP_DEFAULT: &str = "http://localhost:8080";

    /// OpenAI-compatible endpoint used by the Cloud provider
    pub const GROQ_DEFAULT: &str = "https://api.groq.com/openai/v1";

    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
}

/// Model names
pub mod models {
    pub const LOCAL_CHAT: &str = "qwen2.5:0.5b";
    pub const CLOUD_CHAT: &str = "llama-3.1-8b-instant";
    pub const EMBEDDING: &str = "nomic-embed-text";
}

/// Timeouts
pub mod timeouts {
    /// Completion / embedding request bound (seconds)
    pub const PROVIDER_SECS: u64 = 30;

    /// Availability check bound (seconds)
    pub const CHECK_SECS: u64 = 5;

    /// HTTP request bound (seconds)
    pub const HTTP_REQUEST_SECS: u64 = 60;
}

/// Retrieval defaults
pub mod rag {
    /// Results at or below this score are dropped
    pub const MIN_SCORE: f32 = 0.3;

    /// Boost for a query matching a synonym cluster
    pub const CATEGORY_BOOST: f32 = 0.25;

    /// Boost per matched query token
    pub const TOKEN_BOOST: f32 = 0.05;

    /// Cap on the summed per-token boost
    pub const TOKEN_BOOST_CAP: f32 = 0.25;

    /// Cap on the total keyword boost
    pub const TOTAL_BOOST_CAP: f32 = 0.5;

    /// Query tokens must be longer than this to count
    pub const MIN_TOKEN_CHARS: usize = 2;

    /// Default number of results for the search endpoint
    pub const DEFAULT_LIMIT: usize = 5;

    /// Results fetched to ground a chat answer
    pub const CHAT_LIMIT: usize = 3;

    /// Context assembly: minimum score, result count, content length
    pub const CONTEXT_MIN_SCORE: f32 = 0.2;
    pub const CONTEXT_RESULTS: usize = 2;
    pub const CONTEXT_MAX_CHARS: usize = 300;

    /// Cache file format version
    pub const CACHE_VERSION: u32 = 1;
}

/// Dialogue defaults
pub mod dialogue {
    /// Conversation turns included in the answer prompt
    pub const HISTORY_WINDOW: usize = 4;

    /// History lines passed to the classifier
    pub const CLASSIFIER_HISTORY: usize = 3;

    /// A grounded answer must be longer than this to move to confirmation
    pub const CONFIRM_MIN_RESPONSE_CHARS: usize = 50;

    /// Completion settings for chat answers
    pub const ANSWER_TEMPERATURE: f32 = 0.3;
    pub const ANSWER_MAX_TOKENS: u32 = 150;

    /// Completion settings for classification
    pub const CLASSIFIER_TEMPERATURE: f32 = 0.3;
    pub const CLASSIFIER_MAX_TOKENS: u32 = 300;

    /// Budget for all provider calls of one turn (seconds); must stay
    /// below the HTTP request bound so the turn is always persisted
    pub const TURN_TIMEOUT_SECS: u64 = 50;

    /// How often idle per-session locks are swept (seconds)
    pub const LOCK_SWEEP_SECS: u64 = 300;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_caps_consistent() {
        assert!(rag::TOKEN_BOOST_CAP <= rag::TOTAL_BOOST_CAP);
        assert!(rag::CATEGORY_BOOST + rag::TOKEN_BOOST_CAP <= rag::TOTAL_BOOST_CAP);
    }

    #[test]
    fn test_score_floors_valid() {
        assert!((0.0..=1.0).contains(&rag::MIN_SCORE));
        assert!(rag::CONTEXT_MIN_SCORE < rag::MIN_SCORE);
    }
}
