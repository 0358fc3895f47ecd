//! Knowledge Retriever
//!
//! Scores every corpus document against the query embedding, adds the
//! keyword boost, drops weak matches and returns the top results.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use campus_assist_config::{constants::rag, RagConfig};
use campus_assist_core::{EmbeddedDocument, Embedder, Result, Retriever, SearchResult};

use crate::corpus::Corpus;
use crate::domain_boost::{KeywordBooster, PreparedQuery};
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Results scoring at or below this are dropped
    pub min_score: f32,
    /// Limit used when a caller passes zero
    pub default_limit: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            min_score: rag::MIN_SCORE,
            default_limit: rag::DEFAULT_LIMIT,
        }
    }
}

impl From<&RagConfig> for RetrieverConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            min_score: config.min_score,
            default_limit: config.default_limit,
        }
    }
}

/// Cosine similarity of two equal-length vectors
///
/// Vectors of different lengths are an error, not a zero score. A zero
/// vector scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> std::result::Result<f32, RagError> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Rank documents for a query
///
/// Ties keep corpus order. Documents whose embedding length differs from
/// the query's are skipped with a warning.
pub fn score_documents(
    query: &str,
    query_embedding: &[f32],
    documents: &[EmbeddedDocument],
    booster: &KeywordBooster,
    min_score: f32,
    limit: usize,
) -> Vec<SearchResult> {
    let prepared = PreparedQuery::new(query);

    let mut scored: Vec<(f32, &EmbeddedDocument)> = documents
        .iter()
        .filter_map(|doc| match cosine_similarity(query_embedding, &doc.embedding) {
            Ok(semantic) => {
                let boost = booster.boost(&prepared, &doc.document);
                Some(((semantic + boost).min(1.0), doc))
            },
            Err(e) => {
                tracing::warn!(doc_id = %doc.document.id, error = %e, "Skipping document");
                None
            },
        })
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .filter(|(score, _)| *score > min_score)
        .take(limit)
        .map(|(score, doc)| SearchResult {
            document: doc.document.clone(),
            score,
            category: doc.document.category.clone(),
        })
        .collect()
}

/// Semantic + keyword retriever over the loaded corpus
pub struct KnowledgeRetriever {
    embedder: Arc<dyn Embedder>,
    corpus: Arc<Corpus>,
    booster: KeywordBooster,
    config: RetrieverConfig,
}

impl KnowledgeRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, corpus: Arc<Corpus>, config: RetrieverConfig) -> Self {
        Self {
            embedder,
            corpus,
            booster: KeywordBooster::default(),
            config,
        }
    }

    pub fn with_booster(mut self, booster: KeywordBooster) -> Self {
        self.booster = booster;
        self
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }
}

#[async_trait]
impl Retriever for KnowledgeRetriever {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let snapshot = self.corpus.snapshot().ok_or_else(|| {
            RagError::CorpusUnavailable("no embedded corpus loaded; run ingestion".to_string())
        })?;

        if snapshot.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        if query_embedding.len() != snapshot.dimension {
            tracing::warn!(
                query_dimension = query_embedding.len(),
                corpus_dimension = snapshot.dimension,
                model = %self.embedder.model_name(),
                "Query embedding does not match corpus; was the corpus built with another model?"
            );
        }

        let limit = if limit == 0 { self.config.default_limit } else { limit };
        let results = score_documents(
            query,
            &query_embedding,
            &snapshot.documents,
            &self.booster,
            self.config.min_score,
            limit,
        );

        metrics::histogram!("campus_assist_retrieval_seconds").record(start.elapsed().as_secs_f64());
        tracing::debug!(
            results = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            "Retrieval complete"
        );

        Ok(results)
    }

    fn is_ready(&self) -> bool {
        self.corpus.is_loaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CacheFile;
    use campus_assist_core::{Document, Error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str, title: &str, content: &str, keywords: &[&str], embedding: Vec<f32>) -> EmbeddedDocument {
        EmbeddedDocument::new(
            Document {
                id: id.to_string(),
                title: title.to_string(),
                content: content.to_string(),
                url: format!("https://www.example.ac.uk/{}", id),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                category: "General".to_string(),
            },
            embedding,
        )
    }

    /// Returns a fixed vector and counts calls
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::ProviderUnavailable("connection refused".to_string()))
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    fn retriever(embedder: Arc<dyn Embedder>, docs: Vec<EmbeddedDocument>) -> KnowledgeRetriever {
        let corpus = Arc::new(Corpus::from_cache(CacheFile::new("test", docs).unwrap()));
        KnowledgeRetriever::new(embedder, corpus, RetrieverConfig::default())
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert!(matches!(
            cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_id_card_ranks_first() {
        let docs = vec![
            doc("halls", "Applying for Halls", "Apply after accepting your offer.", &["halls"], vec![0.6, 0.8]),
            doc(
                "id-card",
                "Student ID Card",
                "Collect your student card from the Student Hub.",
                &["id card", "student card"],
                vec![0.5, 0.866],
            ),
        ];
        // semantic: halls 0.6, id-card 0.5; id-card gains 0.2 from "student" and "card"
        let r = retriever(Arc::new(FixedEmbedder::new(vec![1.0, 0.0])), docs);

        let results = r.search("How do I get my student ID card?", 3).await.unwrap();
        assert_eq!(results[0].document.id, "id-card");
        assert!(results[0].score > results[1].score);
        assert!(results.iter().all(|res| res.score <= 1.0));
    }

    #[test]
    fn test_lost_student_id_ranks_replacement_first() {
        let docs = vec![
            doc(
                "library",
                "Library Opening Hours",
                "The library is open to every student during term.",
                &["library", "hours"],
                vec![0.48, 0.877],
            ),
            doc(
                "id-replacement",
                "Student ID Card Replacement",
                "Order a new card online and collect it from the Hub.",
                &["id", "card", "replacement"],
                vec![0.45, 0.893],
            ),
        ];
        let booster = KeywordBooster::default();

        // "i", "my" and "id" are too short to count
        let prepared = PreparedQuery::new("I lost my student ID");
        assert_eq!(prepared.tokens(), &["lost", "student"]);
        // "student" is in the title: counted twice, no cluster matches
        assert!((booster.boost(&prepared, &docs[1].document) - 0.1).abs() < 1e-5);
        // content only: counted once
        assert!((booster.boost(&prepared, &docs[0].document) - 0.05).abs() < 1e-5);

        let results = score_documents("I lost my student ID", &[1.0, 0.0], &docs, &booster, rag::MIN_SCORE, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.id, "id-replacement");
        assert!(results[0].score > 0.5);
        assert!((results[0].score - 0.55).abs() < 1e-3);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_score_floor_excludes_weak_matches() {
        let docs = vec![
            doc("a", "Parking Permits", "Permits for staff.", &[], vec![0.3, 0.954]),
            doc("b", "Graduation", "Ceremonies in July.", &[], vec![1.0, 0.0]),
        ];
        // "b" is orthogonal to the query and shares no words with it
        let results = score_documents(
            "wifi",
            &[0.0, 1.0],
            &docs,
            &KeywordBooster::default(),
            rag::MIN_SCORE,
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "a");
    }

    #[test]
    fn test_exact_floor_is_dropped() {
        let docs = vec![doc("a", "x", "y", &[], vec![0.3, (1.0f32 - 0.09).sqrt()])];
        let semantic = cosine_similarity(&[1.0, 0.0], &docs[0].embedding).unwrap();
        let results = score_documents("q", &[1.0, 0.0], &docs, &KeywordBooster::default(), semantic, 10);
        assert!(results.is_empty());
    }

    #[test]
    fn test_mismatched_document_skipped() {
        let docs = vec![
            doc("short", "Fees", "Pay online.", &[], vec![1.0]),
            doc("ok", "Fees", "Pay online.", &[], vec![1.0, 0.0]),
        ];
        let results = score_documents("fees", &[1.0, 0.0], &docs, &KeywordBooster::default(), 0.3, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.id, "ok");
    }

    #[test]
    fn test_ties_keep_corpus_order_and_limit() {
        let docs: Vec<_> = (0..5)
            .map(|i| doc(&format!("d{}", i), "Same", "Same", &[], vec![1.0, 0.0]))
            .collect();

        let first = score_documents("anything", &[1.0, 0.0], &docs, &KeywordBooster::default(), 0.3, 3);
        let second = score_documents("anything", &[1.0, 0.0], &docs, &KeywordBooster::default(), 0.3, 3);

        let ids: Vec<_> = first.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["d0", "d1", "d2"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let r = retriever(embedder.clone(), Vec::new());

        assert!(r.is_ready());
        assert!(r.search("fees", 5).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unloaded_corpus_is_unavailable() {
        let r = KnowledgeRetriever::new(
            Arc::new(FixedEmbedder::new(vec![1.0])),
            Arc::new(Corpus::new()),
            RetrieverConfig::default(),
        );
        assert!(!r.is_ready());
        assert!(matches!(
            r.search("fees", 5).await,
            Err(Error::CorpusUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let r = retriever(
            Arc::new(DownEmbedder),
            vec![doc("a", "Fees", "Pay online.", &[], vec![1.0, 0.0])],
        );
        assert!(matches!(
            r.search("fees", 5).await,
            Err(Error::ProviderUnavailable(_))
        ));
    }
}
