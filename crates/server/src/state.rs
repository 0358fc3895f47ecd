//! Application State
//!
//! Shared state across all handlers.

use std::path::Path;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

use campus_assist_agent::{DialogueEngine, InMemorySessionStore};
use campus_assist_config::{load_settings, DomainConfig, Settings};
use campus_assist_core::{Embedder, LanguageModel, SessionStore};
use campus_assist_llm::LlmFactory;
use campus_assist_rag::{
    ingest_directory, Corpus, IngestReport, KnowledgeRetriever, OllamaEmbedder, RetrieverConfig,
};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings behind a lock for hot reload
    pub config: Arc<RwLock<Settings>>,
    pub domain: Arc<DomainConfig>,
    pub engine: Arc<DialogueEngine>,
    pub corpus: Arc<Corpus>,
    pub embedder: Arc<dyn Embedder>,
    metrics: Option<PrometheusHandle>,
    /// One ingestion at a time
    ingest_lock: Arc<tokio::sync::Mutex<()>>,
    /// Environment name for config reload
    env: Option<String>,
}

impl AppState {
    /// Build providers and the dialogue engine from settings
    pub fn build(settings: Settings) -> Result<Self, ServerError> {
        let domain = DomainConfig::load_or_default(&settings.domain_config_path)?;
        let llm = LlmFactory::create(&settings.llm)?;
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new((&settings.embedding).into())?);

        Ok(Self::from_parts(
            settings,
            Arc::new(domain),
            llm,
            embedder,
            Arc::new(InMemorySessionStore::new()),
        ))
    }

    /// Assemble state from ready-made collaborators
    pub fn from_parts(
        settings: Settings,
        domain: Arc<DomainConfig>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let corpus = Arc::new(Corpus::new());
        let retriever = KnowledgeRetriever::new(
            embedder.clone(),
            corpus.clone(),
            RetrieverConfig::from(&settings.rag),
        );
        let engine = DialogueEngine::new(
            llm,
            Arc::new(retriever),
            store,
            domain.clone(),
            settings.dialogue.clone(),
        )
        .with_chat_limit(settings.rag.chat_limit);

        Self {
            config: Arc::new(RwLock::new(settings)),
            domain,
            engine: Arc::new(engine),
            corpus,
            embedder,
            metrics: None,
            ingest_lock: Arc::new(tokio::sync::Mutex::new(())),
            env: None,
        }
    }

    /// Environment name used when reloading config
    pub fn with_env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub fn metrics(&self) -> Option<&PrometheusHandle> {
        self.metrics.as_ref()
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Reload settings from files and environment
    ///
    /// Providers, CORS and the dialogue engine keep the values they were
    /// built with; paths and limits read per request pick up the change.
    pub fn reload_config(&self) -> Result<(), ServerError> {
        let settings = load_settings(self.env.as_deref())?;
        *self.config.write() = settings;
        tracing::info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Swap in the corpus cache from disk
    pub async fn reload_corpus(&self) -> Result<usize, ServerError> {
        let cache_path = self.get_config().rag.cache_path.clone();
        Ok(self.corpus.reload_from_file(Path::new(&cache_path)).await?)
    }

    /// Re-embed the knowledge directory and swap in the result
    pub async fn ingest(&self) -> Result<IngestReport, ServerError> {
        let _guard = self
            .ingest_lock
            .try_lock()
            .map_err(|_| ServerError::Unavailable("ingestion already running".to_string()))?;

        let (knowledge_dir, cache_path) = {
            let config = self.get_config();
            (config.rag.knowledge_dir.clone(), config.rag.cache_path.clone())
        };
        Ok(ingest_directory(
            Path::new(&knowledge_dir),
            self.embedder.as_ref(),
            Path::new(&cache_path),
            Some(self.corpus.as_ref()),
        )
        .await?)
    }

    /// Load the corpus cache, or ingest when configured to
    ///
    /// Never fails: without a corpus the assistant still answers, with
    /// "no info found" guidance.
    pub async fn load_corpus_on_start(&self) {
        let (cache_path, ingest_on_start) = {
            let config = self.get_config();
            (config.rag.cache_path.clone(), config.rag.ingest_on_start)
        };

        if Path::new(&cache_path).exists() {
            match self.reload_corpus().await {
                Ok(count) => {
                    tracing::info!(documents = count, path = %cache_path, "Corpus loaded");
                    return;
                },
                Err(e) => tracing::warn!(error = %e, path = %cache_path, "Corpus cache unusable"),
            }
        }

        if ingest_on_start {
            match self.ingest().await {
                Ok(report) => tracing::info!(documents = report.documents, "Corpus ingested at startup"),
                Err(e) => tracing::warn!(error = %e, "Startup ingestion failed"),
            }
        } else {
            tracing::warn!(
                path = %cache_path,
                "No corpus loaded; run POST /admin/ingest to build one"
            );
        }
    }
}
