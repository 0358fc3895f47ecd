//! Knowledge ingestion
//!
//! Loads the knowledge directory, embeds each document's searchable text,
//! writes the cache file and optionally swaps the result into a live corpus.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use campus_assist_core::{EmbeddedDocument, Embedder};

use crate::corpus::{CacheFile, Corpus};
use crate::knowledge_loader::KnowledgeLoader;
use crate::RagError;

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub documents: usize,
    pub dimension: usize,
    pub model: String,
    pub cache_path: String,
    pub elapsed_ms: u64,
}

/// Embed every document under `knowledge_dir` and write `cache_path`
///
/// Any embedding failure aborts the run; the existing cache file and the
/// live corpus are left untouched.
pub async fn ingest_directory(
    knowledge_dir: &Path,
    embedder: &dyn Embedder,
    cache_path: &Path,
    corpus: Option<&Corpus>,
) -> Result<IngestReport, RagError> {
    let start = Instant::now();
    let documents = KnowledgeLoader::load_directory(knowledge_dir)?;
    let total = documents.len();

    tracing::info!(
        documents = total,
        model = %embedder.model_name(),
        "Generating embeddings"
    );

    let mut embedded = Vec::with_capacity(total);
    for (i, doc) in documents.into_iter().enumerate() {
        let embedding = embedder
            .embed(&doc.searchable_text())
            .await
            .map_err(|e| RagError::Embedding(format!("{} ({}): {}", doc.id, doc.title, e)))?;
        tracing::debug!(n = i + 1, total, title = %doc.title, "Embedded document");
        embedded.push(EmbeddedDocument::new(doc, embedding));
    }

    let cache = CacheFile::new(embedder.model_name(), embedded)?;
    cache.write_atomic(cache_path).await?;

    let report = IngestReport {
        documents: cache.documents.len(),
        dimension: cache.dimension,
        model: cache.model.clone(),
        cache_path: cache_path.display().to_string(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    if let Some(corpus) = corpus {
        corpus.replace(cache);
    }

    tracing::info!(
        documents = report.documents,
        dimension = report.dimension,
        elapsed_ms = report.elapsed_ms,
        "Ingestion complete"
    );
    Ok(report)
}
