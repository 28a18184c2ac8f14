//! Core RAG service: ingestion, answering, and store deletion

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::generation::AnswerChain;
use crate::ingestion::IngestPipeline;
use crate::providers::{build_providers, FragmentStream, ProviderSet};
use crate::retrieval::MultiQueryRetriever;
use crate::storage::{location_for, StoreHandle, StoreRegistry, VectorStore};
use crate::types::{Document, ScoredChunk};

/// Provider health as reported by [`RagService::health_check`]
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub embedder: String,
    pub embedder_ok: bool,
    pub generator: String,
    pub generator_ok: bool,
}

/// Entry point tying ingestion, retrieval, and generation together
pub struct RagService {
    config: RagConfig,
    providers: ProviderSet,
    pipeline: IngestPipeline,
    chain: AnswerChain,
    registry: Arc<StoreRegistry>,
}

impl RagService {
    /// Build providers from configuration with a fresh handle registry
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let providers = build_providers(&config.llm)?;
        Ok(Self::with_providers(config, providers, Arc::new(StoreRegistry::new())))
    }

    /// Use explicit providers and a shared registry
    pub fn with_providers(config: RagConfig, providers: ProviderSet, registry: Arc<StoreRegistry>) -> Self {
        let pipeline = IngestPipeline::from_config(&config, Arc::clone(&providers.embedder));
        let retriever = Arc::new(MultiQueryRetriever::from_config(
            &config.retrieval,
            Arc::clone(&providers.embedder),
            Arc::clone(&providers.generator),
        ));
        let chain = AnswerChain::from_config(&config.retrieval, retriever, Arc::clone(&providers.generator));

        tracing::info!("RAG service ready (stores under {})", config.storage.root.display());

        Self {
            config,
            providers,
            pipeline,
            chain,
            registry,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Shared handle registry
    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Store directory for a document name
    pub fn location_for(&self, name: &str) -> Result<PathBuf> {
        location_for(self.pipeline.store_root(), name)
    }

    /// Ingest with the configured overlap ratio
    pub async fn ingest(&self, path: &Path, name: &str, chunk_size: usize) -> Result<Document> {
        self.ingest_with_overlap(path, name, chunk_size, self.config.chunking.overlap_ratio)
            .await
    }

    /// Ingest with an explicit overlap ratio
    pub async fn ingest_with_overlap(
        &self,
        path: &Path,
        name: &str,
        chunk_size: usize,
        overlap_ratio: f32,
    ) -> Result<Document> {
        let document = self.pipeline.ingest(path, name, chunk_size, overlap_ratio).await?;
        // Next query opens the fresh store; holders of the old handle finish undisturbed
        self.registry.evict(&document.persist_path);
        Ok(document)
    }

    /// Opened handle for a store, shared through the registry
    pub async fn open(&self, location: &Path) -> Result<Arc<StoreHandle>> {
        self.registry.get_or_open(location).await
    }

    /// Stream an answer to `question` from the store at `location`
    pub async fn answer(&self, question: &str, location: &Path) -> Result<FragmentStream> {
        let handle = self.open(location).await?;
        self.chain.answer(question, &handle).await
    }

    /// Merged multi-query retrieval without generation of an answer
    pub async fn retrieve(&self, question: &str, location: &Path) -> Result<Vec<ScoredChunk>> {
        let handle = self.open(location).await?;
        self.chain.retriever().retrieve(question, &handle).await
    }

    /// Remove a store directory; succeeds when it is already gone
    pub async fn delete_store(&self, location: &Path) -> Result<bool> {
        self.registry.evict(location);
        let location = location.to_path_buf();
        tokio::task::spawn_blocking(move || VectorStore::remove(&location)).await?
    }

    /// Manifests of every store under the configured root
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let root = self.pipeline.store_root().to_path_buf();
        tokio::task::spawn_blocking(move || VectorStore::list(&root)).await?
    }

    /// Probe both providers
    pub async fn health_check(&self) -> ProviderHealth {
        let (embedder_ok, generator_ok) = tokio::join!(
            self.providers.embedder.health_check(),
            self.providers.generator.health_check()
        );

        ProviderHealth {
            embedder: format!("{} ({})", self.providers.embedder.name(), self.providers.embedder.model()),
            embedder_ok: embedder_ok.unwrap_or(false),
            generator: format!("{} ({})", self.providers.generator.name(), self.providers.generator.model()),
            generator_ok: generator_ok.unwrap_or(false),
        }
    }
}
