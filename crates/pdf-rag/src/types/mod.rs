//! Core types for the RAG pipeline

pub mod document;

pub use document::{Chunk, Document, ScoredChunk};
