//! Retrieval traits

use async_trait::async_trait;

use crate::{Result, SearchResult};

/// Retriever interface
///
/// Implementations:
/// - `KnowledgeRetriever` - cosine similarity blended with keyword boosts
///
/// # Example
///
/// ```ignore
/// let retriever: Arc<dyn Retriever> = Arc::new(KnowledgeRetriever::new(embedder, corpus, config));
/// for hit in retriever.search("lost student id card", 3).await? {
///     println!("{:.2} {}", hit.score, hit.document.title);
/// }
/// ```
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    /// Ranked results, best first, at most `limit` long
    ///
    /// Fails with `CorpusUnavailable` when nothing is loaded and with
    /// `ProviderUnavailable` when the query cannot be embedded.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Whether a corpus is loaded
    fn is_ready(&self) -> bool;
}
