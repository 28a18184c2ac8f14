//! Document, chunk, and retrieval result types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// One ingested PDF; persisted as the manifest of its store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Sanitized document name, also the store directory name
    pub name: String,
    /// PDF the store was built from
    pub source_path: PathBuf,
    /// Store directory (one per document)
    pub persist_path: PathBuf,
    /// Chunk size used at ingestion
    pub chunk_size: usize,
    /// Overlap ratio used at ingestion
    pub overlap_ratio: f32,
    /// Embedding model the store is pinned to
    pub embedding_model: String,
    /// Vector dimensionality of the pinned model
    pub dimensions: usize,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// Total number of pages
    pub total_pages: Option<u32>,
    /// SHA-256 of the source PDF bytes
    pub content_hash: String,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
}

/// A contiguous span of extracted document text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Name of the parent document
    pub document: String,
    /// Text content
    pub content: String,
    /// Sequence position within the document
    pub position: u32,
    /// Character offsets in the extracted text
    pub char_start: usize,
    pub char_end: usize,
    /// Embedding vector, empty until embedded
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create a new chunk without an embedding
    pub fn new(
        document: impl Into<String>,
        content: String,
        position: u32,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: document.into(),
            content,
            position,
            char_start,
            char_end,
            embedding: Vec::new(),
        }
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.char_end - self.char_start
    }
}

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The matched chunk
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more similar)
    pub similarity: f32,
}
