//! Error taxonomy shared by every crate
//!
//! Collaborator failures are expected to be caught at the boundary of the
//! component that calls them and turned into a degraded result. The
//! variants here are what crosses crate boundaries when that is not
//! possible.

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Network error or timeout talking to the embedding/completion service
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Model returned output that could not be interpreted
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    /// No embedded corpus is loaded
    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Embedding vector lengths differ
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller is expected to degrade instead of failing the request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable(_)
                | Error::MalformedModelOutput(_)
                | Error::CorpusUnavailable(_)
                | Error::SessionNotFound(_)
                | Error::DimensionMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_variants() {
        assert!(Error::ProviderUnavailable("timeout".into()).is_recoverable());
        assert!(Error::DimensionMismatch { expected: 768, actual: 384 }.is_recoverable());
        assert!(!Error::Internal("boom".into()).is_recoverable());
        assert!(!Error::InvalidRequest("missing field".into()).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::DimensionMismatch { expected: 3, actual: 2 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
