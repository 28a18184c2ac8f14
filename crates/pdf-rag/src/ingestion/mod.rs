//! Document ingestion: PDF text extraction, chunking, embedding, persistence

mod chunker;
mod parser;
mod pipeline;

pub use chunker::TextChunker;
pub use parser::{ExtractedText, PdfExtractor};
pub use pipeline::IngestPipeline;
