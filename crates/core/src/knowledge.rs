//! Knowledge base document types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A knowledge base document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier
    pub id: String,
    pub title: String,
    pub content: String,
    /// Link to the authoritative page
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "General".to_string()
}

impl Document {
    /// Text used when embedding the document
    pub fn searchable_text(&self) -> String {
        format!(
            "{}\n{}\nKeywords: {}",
            self.title,
            self.content,
            self.keywords.join(", ")
        )
    }
}

/// A document with its embedding, as stored in the corpus cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl EmbeddedDocument {
    pub fn new(document: Document, embedding: Vec<f32>) -> Self {
        Self {
            document,
            embedding,
            created_at: Utc::now(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A ranked retrieval hit
///
/// Recomputed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    /// Combined relevance in [0, 1]
    pub score: f32,
    pub category: String,
}
