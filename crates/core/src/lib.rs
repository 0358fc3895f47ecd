//! Core traits and types for the student support assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Knowledge documents and search results
//! - Conversation phases, turns and the per-session state aggregate
//! - Problem classification types
//! - LLM request/response types
//! - Traits for pluggable collaborators (language model, embedder,
//!   retriever, session store, email drafter)
//! - The shared error taxonomy

pub mod classification;
pub mod conversation;
pub mod error;
pub mod knowledge;
pub mod llm_types;
pub mod session;
pub mod traits;

pub use classification::{ProblemClassification, UrgencyLevel};
pub use conversation::{ConversationTurn, Phase, TurnRole};
pub use error::{Error, Result};
pub use knowledge::{Document, EmbeddedDocument, SearchResult};
pub use llm_types::{
    CompletionOptions, FinishReason, GenerateRequest, GenerateResponse, Message, Role,
    StreamChunk,
};
pub use session::{SessionState, SessionSummary, StudentInfo};

pub use traits::{
    collect_completion, CompletionStream, EmailDraft, EmailDrafter, EmailRequest, Embedder,
    FiveWOneH, LanguageModel, Retriever, SessionStore, TemplateType,
};
