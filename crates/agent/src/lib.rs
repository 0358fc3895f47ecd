//! Student support agent
//!
//! Features:
//! - Problem classification (LLM JSON path with keyword fallback)
//! - 5W1H email drafting
//! - Department contact directory
//! - In-memory session store with per-session locks
//! - Dialogue state machine driving a support conversation

pub mod classifier;
pub mod contacts;
pub mod dialogue;
pub mod drafter;
pub mod store;

pub use classifier::{fallback_classification, ProblemClassifier};
pub use contacts::{ContactDirectory, QuickContact};
pub use dialogue::{
    ActionType, AnswerStream, BotMessage, ChatRequest, ChatResponse, ConfirmationOption, DialogueEngine,
    ResponseState, SourceRef,
};
pub use drafter::{detect_template_type, TemplateEmailDrafter};
pub use store::{InMemorySessionStore, SessionLockMap};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Drafting error: {0}")]
    Drafting(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),
}

impl From<campus_assist_llm::LlmError> for AgentError {
    fn from(err: campus_assist_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<campus_assist_rag::RagError> for AgentError {
    fn from(err: campus_assist_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}

impl From<AgentError> for campus_assist_core::Error {
    fn from(err: AgentError) -> Self {
        use campus_assist_core::Error;
        match err {
            AgentError::InvalidAction(msg) => Error::InvalidRequest(msg),
            AgentError::Session(msg) => Error::Storage(msg),
            AgentError::Classification(msg) => Error::MalformedModelOutput(msg),
            AgentError::Drafting(msg) => Error::Internal(msg),
            AgentError::Llm(msg) | AgentError::Retrieval(msg) => Error::ProviderUnavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_assist_core::Error;

    #[test]
    fn test_error_mapping() {
        let err: Error = AgentError::InvalidAction("confirmation without answer".into()).into();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err: Error = AgentError::Llm("timeout".into()).into();
        assert!(err.is_recoverable());
    }
}
