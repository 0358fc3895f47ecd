//! Knowledge Base Loader
//!
//! Loads knowledge documents from JSON/YAML files, one file per category:
//!
//! ```json
//! {
//!   "category": "Accommodation",
//!   "lastUpdated": "2025-01-10",
//!   "source": "https://www.example.ac.uk/accommodation",
//!   "documents": [
//!     { "id": "acc-001", "title": "...", "content": "...", "url": "...", "keywords": ["halls"] }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use campus_assist_core::Document;

use crate::RagError;

/// Knowledge document format for YAML/JSON files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Stable id; derived from category, title and content when absent
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Overrides the file-level category
    #[serde(default)]
    pub category: Option<String>,
}

/// Knowledge base file format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub documents: Vec<KnowledgeDocument>,
}

fn default_category() -> String {
    "General".to_string()
}

impl KnowledgeFile {
    /// Flatten into core documents, filling category and id
    pub fn into_documents(self) -> Vec<Document> {
        let file_category = self.category;
        self.documents
            .into_iter()
            .filter(|doc| !doc.title.trim().is_empty() || !doc.content.trim().is_empty())
            .map(|doc| {
                let category = doc
                    .category
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| file_category.clone());
                let id = doc
                    .id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| derive_id(&category, &doc.title, &doc.content));
                Document {
                    id,
                    title: doc.title,
                    content: doc.content,
                    url: doc.url,
                    keywords: doc.keywords,
                    category,
                }
            })
            .collect()
    }
}

/// Deterministic id for documents that ship without one
pub fn derive_id(category: &str, title: &str, content: &str) -> String {
    let name = format!("{}/{}/{}", category, title, content);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Knowledge loader
pub struct KnowledgeLoader;

impl KnowledgeLoader {
    /// Load every knowledge file in a directory
    ///
    /// Files are read in name order so document order (and therefore tie
    /// order in retrieval) is stable. A file that fails to parse is logged
    /// and skipped. A missing directory yields no documents.
    pub fn load_directory(knowledge_dir: &Path) -> Result<Vec<Document>, RagError> {
        if !knowledge_dir.exists() {
            tracing::warn!(
                path = %knowledge_dir.display(),
                "Knowledge directory does not exist"
            );
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(knowledge_dir)
            .map_err(|e| RagError::Index(format!("Failed to read directory: {}", e)))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json" | "yaml" | "yml")
                )
            })
            .collect();
        paths.sort();

        let mut documents = Vec::new();
        for path in paths {
            match Self::load_file(&path) {
                Ok(file) => {
                    let docs = file.into_documents();
                    tracing::info!(
                        file = %path.display(),
                        documents = docs.len(),
                        "Loaded knowledge file"
                    );
                    documents.extend(docs);
                },
                Err(e) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %e,
                        "Failed to load knowledge file"
                    );
                },
            }
        }

        tracing::info!(
            directory = %knowledge_dir.display(),
            total_documents = documents.len(),
            "Knowledge base loading complete"
        );

        Ok(documents)
    }

    /// Load a single knowledge file
    pub fn load_file(path: &Path) -> Result<KnowledgeFile, RagError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Index(format!("Failed to read file: {}", e)))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "json" => serde_json::from_str(&content)
                .map_err(|e| RagError::Index(format!("JSON parse error: {}", e))),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| RagError::Index(format!("YAML parse error: {}", e))),
            _ => Err(RagError::Index(format!(
                "Unsupported file type: {}",
                extension
            ))),
        }
    }
}
