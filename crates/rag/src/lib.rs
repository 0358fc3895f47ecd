//! Retrieval over the student knowledge base
//!
//! Features:
//! - Knowledge files (JSON/YAML, one per category) with deterministic ids
//! - Ingestion through an embedding provider into a versioned cache file
//! - In-memory corpus with atomic snapshot reload
//! - Cosine similarity plus a keyword boost for short factual documents
//! - Prompt context assembly from ranked results
//! - Core Retriever trait implementation

pub mod context;
pub mod corpus;
pub mod domain_boost;
pub mod ingest;
pub mod knowledge_loader;
pub mod ollama_embeddings;
pub mod retriever;

pub use context::build_context;
pub use corpus::{CacheFile, Corpus, CorpusSnapshot};
pub use domain_boost::{BoostCluster, KeywordBooster};
pub use ingest::{ingest_directory, IngestReport};
pub use knowledge_loader::{KnowledgeDocument, KnowledgeFile, KnowledgeLoader};
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use retriever::{cosine_similarity, score_documents, KnowledgeRetriever, RetrieverConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corpus not loaded: {0}")]
    CorpusUnavailable(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RagError> for campus_assist_core::Error {
    fn from(err: RagError) -> Self {
        use campus_assist_core::Error;
        match err {
            RagError::Embedding(msg) | RagError::Connection(msg) => Error::ProviderUnavailable(msg),
            RagError::DimensionMismatch { expected, actual } => {
                Error::DimensionMismatch { expected, actual }
            }
            RagError::CorpusUnavailable(msg) => Error::CorpusUnavailable(msg),
            RagError::Index(msg) | RagError::Cache(msg) => Error::Storage(msg),
        }
    }
}
