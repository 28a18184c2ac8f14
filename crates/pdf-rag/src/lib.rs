//! pdf-rag: chat with a PDF through retrieval-augmented generation
//!
//! Each ingested PDF gets its own on-disk vector store. Questions are expanded
//! into paraphrases by the generation model, matched against the document's
//! store, and answered from the merged context as a stream of text fragments.
//! Embedding and generation backends (Ollama, OpenAI-compatible APIs) are
//! chosen by configuration.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod library;
pub mod providers;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, ErrorKind, Result};
pub use generation::{collect_answer, AnswerChain};
pub use ingestion::IngestPipeline;
pub use library::{DocumentLibrary, InMemoryMetadataStore, MetadataStore, Principal};
pub use providers::{EmbeddingProvider, FragmentStream, GenerationProvider, ProviderSet};
pub use retrieval::MultiQueryRetriever;
pub use service::{ProviderHealth, RagService};
pub use storage::{HandleState, StoreHandle, StoreRegistry};
pub use types::{Chunk, Document, ScoredChunk};
