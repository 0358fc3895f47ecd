//! Traits for pluggable collaborators
//!
//! The dialogue engine and classifier depend only on these interfaces;
//! concrete implementations are chosen once at startup.

mod drafter;
mod embedder;
mod llm;
mod retriever;
mod session_store;

pub use drafter::{EmailDraft, EmailDrafter, EmailRequest, FiveWOneH, TemplateType};
pub use embedder::Embedder;
pub use llm::{collect_completion, CompletionStream, LanguageModel};
pub use retriever::Retriever;
pub use session_store::SessionStore;
