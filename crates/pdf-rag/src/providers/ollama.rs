//! Ollama-based providers for embeddings and generation
//!
//! One `OllamaClient` speaks the HTTP API; `OllamaEmbedder` and `OllamaLlm`
//! bind it to a model and implement the provider traits.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{FragmentStream, GenerationProvider};
use super::stream::{decode_lines, LineEvent};

/// Ollama API client
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    /// Server base URL
    base_url: String,
    /// Timeout applied to non-streaming requests
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).timeout(self.timeout).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Names of the models available locally
    pub async fn list_models(&self) -> std::result::Result<Vec<String>, String> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Ollama is not running or not accessible: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Listing models failed: HTTP {}", response.status()));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse model list: {}", e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pull a model unless it is already present
    pub async fn pull_model(&self, model: &str) -> std::result::Result<(), String> {
        let available = self.list_models().await?;
        if available.iter().any(|name| name == model) {
            tracing::debug!("Model {} already available", model);
            return Ok(());
        }

        tracing::info!("Pulling model: {}", model);
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PullRequest { model, stream: false })
            .send()
            .await
            .map_err(|e| format!("Pull request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Pull failed: HTTP {} - {}", status, body));
        }

        Ok(())
    }

    /// Embed a batch of texts
    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&EmbedRequest { model, input: texts })
            .send()
            .await
            .map_err(|e| Error::embedding_unavailable(model, format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding_unavailable(
                model,
                format!("Embedding failed: HTTP {} - {}", status, body),
            ));
        }

        let embed_response: EmbedResponse = response.json().await.map_err(|e| {
            Error::embedding_unavailable(model, format!("Failed to parse embedding response: {}", e))
        })?;

        if embed_response.embeddings.len() != texts.len() {
            return Err(Error::embedding_unavailable(
                model,
                format!(
                    "Expected {} embeddings, received {}",
                    texts.len(),
                    embed_response.embeddings.len()
                ),
            ));
        }

        Ok(embed_response.embeddings)
    }

    /// Generate a complete response
    pub async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation_unavailable(model, format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation_unavailable(
                model,
                format!("Generation failed: HTTP {} - {}", status, body),
            ));
        }

        let generate_response: GenerateResponse = response.json().await.map_err(|e| {
            Error::generation_interrupted(model, format!("Failed to parse generation response: {}", e))
        })?;

        Ok(generate_response.response)
    }

    /// Generate a streaming response (NDJSON, one object per line)
    pub async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<FragmentStream> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            stream: true,
            options: GenerateOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation_unavailable(model, format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation_unavailable(
                model,
                format!("Stream failed: HTTP {} - {}", status, body),
            ));
        }

        Ok(decode_lines(model, response.bytes_stream(), parse_ndjson_line))
    }
}

/// Interpret one line of Ollama's streaming output
fn parse_ndjson_line(line: &str) -> LineEvent {
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(StreamChunk { error: Some(message), .. }) => LineEvent::Failed(message),
        Ok(chunk) if chunk.done => {
            // The final object may still carry text
            if chunk.response.is_empty() {
                LineEvent::Done
            } else {
                LineEvent::Fragment(chunk.response)
            }
        }
        Ok(chunk) => LineEvent::Fragment(chunk.response),
        Err(e) => LineEvent::Failed(format!("Malformed stream line: {}", e)),
    }
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Arc<OllamaClient>,
    model: String,
    pull: bool,
    ready: OnceCell<()>,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(
            Arc::new(OllamaClient::new(config)?),
            config.embed_model.clone(),
            config.pull_models,
        ))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, model: String, pull: bool) -> Self {
        Self {
            client,
            model,
            pull,
            ready: OnceCell::new(),
        }
    }

    /// Pull the model once per process when provisioning is enabled
    async fn ensure_model(&self) -> Result<()> {
        if !self.pull {
            return Ok(());
        }
        self.ready
            .get_or_try_init(|| async {
                self.client
                    .pull_model(&self.model)
                    .await
                    .map_err(|message| Error::embedding_unavailable(&self.model, message))
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_model().await?;
        self.client.embed(&self.model, texts).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for paraphrasing and answer generation
pub struct OllamaLlm {
    client: Arc<OllamaClient>,
    model: String,
    temperature: f32,
    pull: bool,
    ready: OnceCell<()>,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self::from_client(
            Arc::new(OllamaClient::new(config)?),
            config.generate_model.clone(),
            config.temperature,
            config.pull_models,
        ))
    }

    /// Create from existing OllamaClient
    pub fn from_client(client: Arc<OllamaClient>, model: String, temperature: f32, pull: bool) -> Self {
        Self {
            client,
            model,
            temperature,
            pull,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_model(&self) -> Result<()> {
        if !self.pull {
            return Ok(());
        }
        self.ready
            .get_or_try_init(|| async {
                self.client
                    .pull_model(&self.model)
                    .await
                    .map_err(|message| Error::generation_unavailable(&self.model, message))
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for OllamaLlm {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.ensure_model().await?;
        self.client
            .generate_stream(&self.model, prompt, self.temperature)
            .await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.ensure_model().await?;
        self.client.generate(&self.model, prompt, self.temperature).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Combined Ollama provider that shares a single client for both capabilities
pub struct OllamaProvider {
    embedder: OllamaEmbedder,
    llm: OllamaLlm,
}

impl OllamaProvider {
    /// Create a new combined Ollama provider
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Arc::new(OllamaClient::new(config)?);
        Ok(Self {
            embedder: OllamaEmbedder::from_client(
                Arc::clone(&client),
                config.embed_model.clone(),
                config.pull_models,
            ),
            llm: OllamaLlm::from_client(
                client,
                config.generate_model.clone(),
                config.temperature,
                config.pull_models,
            ),
        })
    }

    /// Split into separate providers
    pub fn split(self) -> (OllamaEmbedder, OllamaLlm) {
        (self.embedder, self.llm)
    }
}
