//! Embedded corpus and its cache file
//!
//! The cache file is the durable output of ingestion. The in-memory
//! [`Corpus`] holds one immutable snapshot at a time; readers clone the
//! `Arc` and never observe a half-loaded corpus.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use campus_assist_config::constants::rag::CACHE_VERSION;
use campus_assist_core::EmbeddedDocument;

use crate::RagError;

/// On-disk cache format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheFile {
    pub version: u32,
    /// Embedding model that produced the vectors
    pub model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<EmbeddedDocument>,
}

/// Older caches are a bare array of documents
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCache {
    Versioned(CacheFile),
    Legacy(Vec<EmbeddedDocument>),
}

impl CacheFile {
    pub fn new(model: impl Into<String>, documents: Vec<EmbeddedDocument>) -> Result<Self, RagError> {
        let dimension = uniform_dimension(&documents)?;
        Ok(Self {
            version: CACHE_VERSION,
            model: model.into(),
            dimension,
            created_at: Utc::now(),
            documents,
        })
    }

    /// Reject caches this build cannot score against
    pub fn validate(&self) -> Result<(), RagError> {
        if self.version > CACHE_VERSION {
            return Err(RagError::Cache(format!(
                "Unsupported cache version {} (max {})",
                self.version, CACHE_VERSION
            )));
        }
        let dimension = uniform_dimension(&self.documents)?;
        if !self.documents.is_empty() && dimension != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: dimension,
            });
        }
        Ok(())
    }

    /// Parse and validate a cache file
    pub async fn read(path: &Path) -> Result<Self, RagError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::Cache(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, RagError> {
        let stored: StoredCache = serde_json::from_slice(bytes)
            .map_err(|e| RagError::Cache(format!("Invalid cache file: {}", e)))?;

        let cache = match stored {
            StoredCache::Versioned(cache) => cache,
            StoredCache::Legacy(documents) => {
                let mut cache = CacheFile::new("unknown", documents)?;
                cache.version = 0;
                cache
            },
        };
        cache.validate()?;
        Ok(cache)
    }

    /// Write to a sibling temp file, then rename over `path`
    pub async fn write_atomic(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RagError::Cache(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_vec(self)
            .map_err(|e| RagError::Cache(format!("Failed to serialize cache: {}", e)))?;
        let tmp = path.with_extension("json.tmp");

        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RagError::Cache(format!("Failed to write {}: {}", tmp.display(), e)));
        }
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| RagError::Cache(format!("Failed to replace {}: {}", path.display(), e)))?;

        tracing::info!(
            path = %path.display(),
            documents = self.documents.len(),
            dimension = self.dimension,
            "Corpus cache written"
        );
        Ok(())
    }
}

fn uniform_dimension(documents: &[EmbeddedDocument]) -> Result<usize, RagError> {
    let Some(first) = documents.first() else {
        return Ok(0);
    };
    let expected = first.dimension();
    if expected == 0 {
        return Err(RagError::Cache(format!(
            "Document {} has an empty embedding",
            first.document.id
        )));
    }
    match documents.iter().find(|d| d.dimension() != expected) {
        Some(odd) => Err(RagError::DimensionMismatch {
            expected,
            actual: odd.dimension(),
        }),
        None => Ok(expected),
    }
}

/// One immutable loaded corpus
#[derive(Debug)]
pub struct CorpusSnapshot {
    pub model: String,
    pub dimension: usize,
    pub loaded_at: DateTime<Utc>,
    pub documents: Vec<EmbeddedDocument>,
}

impl From<CacheFile> for CorpusSnapshot {
    fn from(cache: CacheFile) -> Self {
        Self {
            model: cache.model,
            dimension: cache.dimension,
            loaded_at: Utc::now(),
            documents: cache.documents,
        }
    }
}

/// Shared, atomically replaceable corpus
#[derive(Debug, Default)]
pub struct Corpus {
    snapshot: RwLock<Option<Arc<CorpusSnapshot>>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cache(cache: CacheFile) -> Self {
        let corpus = Self::new();
        corpus.replace(cache);
        corpus
    }

    /// Current snapshot, if any corpus has been loaded
    pub fn snapshot(&self) -> Option<Arc<CorpusSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_some()
    }

    pub fn len(&self) -> usize {
        self.snapshot
            .read()
            .as_ref()
            .map(|s| s.documents.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new snapshot
    pub fn replace(&self, cache: CacheFile) {
        let snapshot = Arc::new(CorpusSnapshot::from(cache));
        *self.snapshot.write() = Some(snapshot);
    }

    /// Load a cache file and swap it in
    ///
    /// The file is parsed and validated before the swap; on any error the
    /// current snapshot stays in place.
    pub async fn reload_from_file(&self, path: &Path) -> Result<usize, RagError> {
        let cache = CacheFile::read(path).await?;
        let count = cache.documents.len();
        self.replace(cache);
        tracing::info!(path = %path.display(), documents = count, "Corpus reloaded");
        Ok(count)
    }

    /// Distinct categories in corpus order
    pub fn categories(&self) -> Vec<String> {
        let Some(snapshot) = self.snapshot() else {
            return Vec::new();
        };
        let mut categories: Vec<String> = Vec::new();
        for doc in &snapshot.documents {
            if !categories.contains(&doc.document.category) {
                categories.push(doc.document.category.clone());
            }
        }
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_assist_core::Document;
    use tempfile::tempdir;

    fn doc(id: &str, category: &str, embedding: Vec<f32>) -> EmbeddedDocument {
        EmbeddedDocument::new(
            Document {
                id: id.to_string(),
                title: format!("Title {}", id),
                content: "content".to_string(),
                url: String::new(),
                keywords: Vec::new(),
                category: category.to_string(),
            },
            embedding,
        )
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let result = CacheFile::new(
            "nomic-embed-text",
            vec![doc("a", "Fees", vec![1.0, 0.0]), doc("b", "Fees", vec![1.0, 0.0, 0.0])],
        );
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("cache.json");
        let cache = CacheFile::new("nomic-embed-text", vec![doc("a", "Fees", vec![0.5, 0.5])]).unwrap();

        cache.write_atomic(&path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = CacheFile::read(&path).await.unwrap();
        assert_eq!(loaded.version, CACHE_VERSION);
        assert_eq!(loaded.dimension, 2);
        assert_eq!(loaded.documents, cache.documents);
    }

    #[test]
    fn test_legacy_array_accepted() {
        let docs = vec![doc("a", "Fees", vec![0.1, 0.2, 0.3])];
        let bytes = serde_json::to_vec(&docs).unwrap();
        let cache = CacheFile::from_slice(&bytes).unwrap();
        assert_eq!(cache.version, 0);
        assert_eq!(cache.dimension, 3);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_old_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let corpus = Corpus::from_cache(
            CacheFile::new("m", vec![doc("a", "Fees", vec![1.0, 0.0])]).unwrap(),
        );
        let before = corpus.snapshot().unwrap();

        std::fs::write(&path, b"{ truncated").unwrap();
        assert!(corpus.reload_from_file(&path).await.is_err());
        assert!(Arc::ptr_eq(&before, &corpus.snapshot().unwrap()));

        let mut bad = CacheFile::new("m", vec![doc("a", "Fees", vec![1.0, 0.0])]).unwrap();
        bad.documents.push(doc("b", "Fees", vec![1.0]));
        std::fs::write(&path, serde_json::to_vec(&bad).unwrap()).unwrap();
        assert!(corpus.reload_from_file(&path).await.is_err());
        assert_eq!(corpus.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_swaps_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let corpus = Corpus::new();
        assert!(!corpus.is_loaded());

        CacheFile::new(
            "m",
            vec![
                doc("a", "Fees", vec![1.0, 0.0]),
                doc("b", "Accommodation", vec![0.0, 1.0]),
                doc("c", "Fees", vec![1.0, 1.0]),
            ],
        )
        .unwrap()
        .write_atomic(&path)
        .await
        .unwrap();

        let held = corpus.snapshot();
        assert_eq!(corpus.reload_from_file(&path).await.unwrap(), 3);
        assert!(held.is_none());
        assert_eq!(corpus.categories(), vec!["Fees", "Accommodation"]);
    }
}
