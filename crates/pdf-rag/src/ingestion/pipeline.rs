//! Ingestion pipeline orchestration

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use crate::config::{validate_chunking, RagConfig};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::storage::{document_name, store_location, VectorStore};
use crate::types::{Chunk, Document};

use super::chunker::TextChunker;
use super::parser::PdfExtractor;

/// PDF -> text -> chunks -> embeddings -> store directory
pub struct IngestPipeline {
    /// Embedding provider; its model is pinned into every store written
    embedder: Arc<dyn EmbeddingProvider>,
    /// Directory holding one store per document
    store_root: PathBuf,
    /// Chunks per embedding request
    batch_size: usize,
    /// Serializes ingestion per document name
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store_root: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            store_root: store_root.into(),
            batch_size: 32,
            locks: DashMap::new(),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(embedder, config.storage.root.clone()).with_batch_size(config.embeddings.batch_size)
    }

    /// Set the number of chunks per embedding request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Directory holding the stores
    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    /// Ingest a PDF into the store for `requested_name`.
    ///
    /// Re-ingesting a name replaces its store. On any failure the previous
    /// store (if any) is left as it was.
    pub async fn ingest(
        &self,
        source_path: &Path,
        requested_name: &str,
        chunk_size: usize,
        overlap_ratio: f32,
    ) -> Result<Document> {
        let start = Instant::now();
        validate_chunking(chunk_size, overlap_ratio)?;
        let name = document_name(requested_name)?;

        match tokio::fs::try_exists(source_path).await {
            Ok(true) => {}
            Ok(false) => return Err(Error::not_found(source_path)),
            Err(e) => return Err(e.into()),
        }

        let lock = self
            .locks
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.ingest_locked(source_path, &name, chunk_size, overlap_ratio).await
        };
        drop(lock);
        // Only the map holds the lock once nobody else is queued on this name
        self.locks.remove_if(&name, |_, lock| Arc::strong_count(lock) == 1);

        let document = result?;
        tracing::info!(
            "Ingested {} into {} in {:.1}s",
            name,
            document.persist_path.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(document)
    }

    async fn ingest_locked(
        &self,
        source_path: &Path,
        name: &str,
        chunk_size: usize,
        overlap_ratio: f32,
    ) -> Result<Document> {
        let location = store_location(&self.store_root, name);

        let data = match tokio::fs::read(source_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::not_found(source_path)),
            Err(e) => return Err(e.into()),
        };

        let filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        tracing::info!("Processing file: {} ({} bytes)", filename, data.len());

        let extracted = tokio::task::spawn_blocking(move || PdfExtractor::extract(&filename, &data)).await??;

        let chunker = TextChunker::new(chunk_size, overlap_ratio)?;
        let mut chunks = chunker.chunk(name, &extracted.content);
        tracing::info!(
            "Extracted {} pages, {} chars -> {} chunks (size {}, overlap {})",
            extracted.total_pages.unwrap_or(0),
            extracted.content.chars().count(),
            chunks.len(),
            chunker.chunk_size(),
            chunker.overlap()
        );

        let dimensions = self.embed_chunks(&mut chunks).await?;

        let document = Document {
            name: name.to_string(),
            source_path: source_path.to_path_buf(),
            persist_path: location.clone(),
            chunk_size,
            overlap_ratio,
            embedding_model: self.embedder.model().to_string(),
            dimensions,
            total_chunks: chunks.len() as u32,
            total_pages: extracted.total_pages,
            content_hash: extracted.content_hash,
            ingested_at: chrono::Utc::now(),
        };

        let manifest = document.clone();
        tokio::task::spawn_blocking(move || VectorStore::replace(&location, &manifest, &chunks)).await??;

        Ok(document)
    }

    /// Embed every chunk in batches; returns the vector dimensionality
    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<usize> {
        let model = self.embedder.model().to_string();
        let mut dimensions: Option<usize> = None;

        for batch in chunks.chunks_mut(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(Error::embedding_unavailable(
                    &model,
                    format!("Expected {} embeddings, received {}", batch.len(), vectors.len()),
                ));
            }

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                if vector.is_empty() {
                    return Err(Error::embedding_unavailable(&model, "provider returned an empty vector"));
                }
                let expected = *dimensions.get_or_insert(vector.len());
                if vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        found: vector.len(),
                    });
                }
                chunk.embedding = vector;
            }

            tracing::debug!("Embedded batch of {} chunks", batch.len());
        }

        dimensions.ok_or_else(|| Error::internal("no chunks to embed"))
    }
}
