//! Provider abstractions for embeddings and text generation
//!
//! Ingestion and query code depend only on the two capability traits;
//! the concrete backend is chosen from [`LlmConfig`](crate::config::LlmConfig).

pub mod embedding;
pub mod llm;
pub mod ollama;
pub mod openai;
mod stream;

use std::sync::Arc;

use crate::config::{LlmConfig, ProviderBackend};
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use llm::{FragmentStream, GenerationProvider};

/// The embedding and generation capabilities used by one pipeline
#[derive(Clone)]
pub struct ProviderSet {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
}

/// Build the providers selected by configuration
pub fn build_providers(config: &LlmConfig) -> Result<ProviderSet> {
    match config.backend {
        ProviderBackend::Ollama => {
            tracing::info!(
                "Using Ollama at {} (embed: {}, generate: {})",
                config.base_url(),
                config.embed_model,
                config.generate_model
            );
            let (embedder, generator) = ollama::OllamaProvider::new(config)?.split();
            Ok(ProviderSet {
                embedder: Arc::new(embedder),
                generator: Arc::new(generator),
            })
        }
        ProviderBackend::OpenAi => {
            tracing::info!(
                "Using OpenAI-compatible API at {} (embed: {}, generate: {})",
                config.base_url(),
                config.embed_model,
                config.generate_model
            );
            let client = Arc::new(openai::OpenAiClient::new(config)?);
            Ok(ProviderSet {
                embedder: Arc::new(openai::OpenAiEmbedder::from_client(
                    Arc::clone(&client),
                    config.embed_model.clone(),
                )),
                generator: Arc::new(openai::OpenAiLlm::from_client(
                    client,
                    config.generate_model.clone(),
                    config.temperature,
                )),
            })
        }
    }
}
