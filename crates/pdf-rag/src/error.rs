//! Error types for the PDF RAG core

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG core errors
#[derive(Debug, Error)]
pub enum Error {
    /// Source file missing
    #[error("Source file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Persistence location missing
    #[error("Vector store not found at {}", location.display())]
    StoreNotFound { location: PathBuf },

    /// PDF could not be parsed (corrupt, encrypted, image-only)
    #[error("Failed to extract text from '{filename}': {message}")]
    Extraction { filename: String, message: String },

    /// Embedding provider unreachable or rejected the request
    #[error("Embedding provider unavailable (model '{model}'): {message}")]
    EmbeddingUnavailable { model: String, message: String },

    /// Generation provider unreachable before the first fragment
    #[error("Generation provider unavailable (model '{model}'): {message}")]
    GenerationUnavailable { model: String, message: String },

    /// Generation provider failed after streaming had started
    #[error("Generation interrupted (model '{model}'): {message}")]
    GenerationInterrupted { model: String, message: String },

    /// Empty or whitespace-only question
    #[error("Invalid question: {question:?} (question cannot be empty)")]
    InvalidQuestion { question: String },

    /// Query issued against a handle that was never opened
    #[error("Chain not initialized: no store opened for {}", location.display())]
    ChainNotInitialized { location: PathBuf },

    /// Operation on a released handle
    #[error("Store handle for {} has been closed", location.display())]
    HandleClosed { location: PathBuf },

    /// Document name unusable as a path segment
    #[error("Invalid document name: {name:?}")]
    InvalidDocumentName { name: String },

    /// Chunking parameters out of range
    #[error("Invalid chunking parameters: chunk_size={chunk_size}, overlap_ratio={overlap_ratio}")]
    InvalidChunking { chunk_size: usize, overlap_ratio: f32 },

    /// Store was indexed with another embedding model
    #[error(
        "Store at {} was indexed with embedding model '{found}', but '{expected}' is configured",
        location.display()
    )]
    EmbeddingModelMismatch {
        location: PathBuf,
        expected: String,
        found: String,
    },

    /// Vector dimensionality disagrees with the store
    #[error("Embedding dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// On-disk store error
    #[error("Vector store error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document name already registered
    #[error("Document already uploaded: {name}")]
    DocumentExists { name: String },

    /// Document record missing or not owned by the caller
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classification used by front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ExtractionError,
    EmbeddingUnavailable,
    GenerationUnavailable,
    InvalidQuestion,
    ChainNotInitialized,
    HandleClosed,
    InvalidInput,
    Conflict,
    Internal,
}

impl Error {
    /// Create a source-file-missing error
    pub fn not_found(path: impl AsRef<Path>) -> Self {
        Self::NotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a store-missing error
    pub fn store_not_found(location: impl AsRef<Path>) -> Self {
        Self::StoreNotFound {
            location: location.as_ref().to_path_buf(),
        }
    }

    /// Create an extraction error
    pub fn extraction(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding-provider error
    pub fn embedding_unavailable(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a generation-provider error
    pub fn generation_unavailable(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationUnavailable {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a mid-stream generation error
    pub fn generation_interrupted(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GenerationInterrupted {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } | Error::StoreNotFound { .. } | Error::DocumentNotFound { .. } => {
                ErrorKind::NotFound
            }
            Error::Extraction { .. } => ErrorKind::ExtractionError,
            Error::EmbeddingUnavailable { .. } => ErrorKind::EmbeddingUnavailable,
            Error::GenerationUnavailable { .. } | Error::GenerationInterrupted { .. } => {
                ErrorKind::GenerationUnavailable
            }
            Error::InvalidQuestion { .. } => ErrorKind::InvalidQuestion,
            Error::ChainNotInitialized { .. } => ErrorKind::ChainNotInitialized,
            Error::HandleClosed { .. } => ErrorKind::HandleClosed,
            Error::InvalidDocumentName { .. }
            | Error::InvalidChunking { .. }
            | Error::Config(_) => ErrorKind::InvalidInput,
            Error::EmbeddingModelMismatch { .. }
            | Error::DimensionMismatch { .. }
            | Error::DocumentExists { .. } => ErrorKind::Conflict,
            Error::Storage(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}
