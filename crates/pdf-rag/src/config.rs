//! Configuration for the PDF RAG core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Model provider configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Multi-query retrieval configuration
    pub retrieval: RetrievalConfig,
    /// On-disk store configuration
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Parse configuration from a TOML string; missing sections take defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RagConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.retrieval.num_variants == 0 {
            return Err(Error::Config("retrieval.num_variants must be at least 1".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embeddings.batch_size must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Which provider family backs the embedding and generation capabilities
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Any OpenAI-compatible HTTP API
    OpenAi,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider family
    pub backend: ProviderBackend,
    /// Base URL; backend default when unset
    pub base_url: Option<String>,
    /// API key (OpenAI backend); falls back to `OPENAI_API_KEY`
    pub api_key: Option<String>,
    /// Embedding model name
    pub embed_model: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Timeout for non-streaming requests in seconds
    pub timeout_secs: u64,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Pull models before first use (Ollama only)
    pub pull_models: bool,
}

impl LlmConfig {
    /// Base URL with the backend default applied
    pub fn base_url(&self) -> String {
        let url = match (&self.base_url, self.backend) {
            (Some(url), _) => url.clone(),
            (None, ProviderBackend::Ollama) => "http://localhost:11434".to_string(),
            (None, ProviderBackend::OpenAi) => "https://api.openai.com/v1".to_string(),
        };
        url.trim_end_matches('/').to_string()
    }

    /// API key from config or environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::Ollama,
            base_url: None,
            api_key: None,
            embed_model: "nomic-embed-text".to_string(),
            generate_model: "mistral:latest".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            pull_models: false,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Number of chunks sent per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { batch_size: 32 }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunk size in characters
    pub chunk_size: usize,
    /// Fraction of `chunk_size` shared by consecutive chunks
    pub overlap_ratio: f32,
}

impl ChunkingConfig {
    /// Overlap in characters, rounded down
    pub fn overlap(&self) -> usize {
        overlap_chars(self.chunk_size, self.overlap_ratio)
    }

    fn validate(&self) -> Result<()> {
        validate_chunking(self.chunk_size, self.overlap_ratio)
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap_ratio: 0.2,
        }
    }
}

/// Overlap in characters for a chunk size and ratio
pub fn overlap_chars(chunk_size: usize, overlap_ratio: f32) -> usize {
    (chunk_size as f64 * overlap_ratio as f64).floor() as usize
}

/// Chunk size must be positive and the window must advance
pub fn validate_chunking(chunk_size: usize, overlap_ratio: f32) -> Result<()> {
    let ratio_ok = overlap_ratio.is_finite() && (0.0..1.0).contains(&overlap_ratio);
    if chunk_size == 0 || !ratio_ok || overlap_chars(chunk_size, overlap_ratio) >= chunk_size {
        return Err(Error::InvalidChunking {
            chunk_size,
            overlap_ratio,
        });
    }
    Ok(())
}

/// Multi-query retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Paraphrased variants requested from the generation model
    pub num_variants: usize,
    /// Chunks retrieved per variant
    pub top_k: usize,
    /// Also search with the question as asked
    pub include_original: bool,
    /// Override for the paraphrase instruction (`{question}`, `{count}`)
    pub query_template: Option<String>,
    /// Override for the answer prompt (`{context}`, `{question}`)
    pub answer_template: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            num_variants: 5,
            top_k: 4,
            include_original: true,
            query_template: None,
            answer_template: None,
        }
    }
}

/// On-disk store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one store directory per document
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let root = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("pdf-rag")
            .join("db");

        Self { root }
    }
}
