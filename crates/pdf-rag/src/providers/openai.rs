//! OpenAI-compatible providers (`/embeddings`, `/chat/completions`)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{FragmentStream, GenerationProvider};
use super::stream::{decode_lines, LineEvent};

/// HTTP client for an OpenAI-compatible API
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<ChatContent>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

impl OpenAiClient {
    /// Create a new client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!("No API key configured for {}", config.base_url());
        }

        Ok(Self {
            client,
            base_url: config.base_url(),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Check if the API answers
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        match self
            .authorized(self.client.get(&url))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Embed a batch of texts
    pub async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .timeout(self.timeout)
            .json(&EmbeddingRequest { model, input: texts })
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

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            Error::embedding_unavailable(model, format!("Failed to parse embedding response: {}", e))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(Error::embedding_unavailable(
                model,
                format!("Expected {} embeddings, received {}", texts.len(), parsed.data.len()),
            ));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn chat_request<'a>(&self, model: &'a str, prompt: &'a str, temperature: f32, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            stream,
        }
    }

    /// Generate a complete response
    pub async fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .timeout(self.timeout)
            .json(&self.chat_request(model, prompt, temperature, false))
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

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            Error::generation_interrupted(model, format!("Failed to parse generation response: {}", e))
        })?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    /// Generate a streaming response (server-sent events)
    pub async fn generate_stream(&self, model: &str, prompt: &str, temperature: f32) -> Result<FragmentStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .json(&self.chat_request(model, prompt, temperature, true))
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

        Ok(decode_lines(model, response.bytes_stream(), parse_sse_line))
    }
}

/// Interpret one server-sent-event line
fn parse_sse_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:") else {
        // event:, id:, retry: and comments carry no text
        return LineEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent { error: Some(err), .. }) => LineEvent::Failed(err.message),
        Ok(event) => {
            let text: String = event
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.and_then(|d| d.content))
                .collect();
            if text.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Fragment(text)
            }
        }
        Err(e) => LineEvent::Failed(format!("Malformed stream event: {}", e)),
    }
}

/// Embedding provider for OpenAI-compatible APIs
pub struct OpenAiEmbedder {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiEmbedder {
    /// Create from an existing client
    pub fn from_client(client: Arc<OpenAiClient>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.client.embed(&self.model, texts).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Generation provider for OpenAI-compatible APIs
pub struct OpenAiLlm {
    client: Arc<OpenAiClient>,
    model: String,
    temperature: f32,
}

impl OpenAiLlm {
    /// Create from an existing client
    pub fn from_client(client: Arc<OpenAiClient>, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiLlm {
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.client
            .generate_stream(&self.model, prompt, self.temperature)
            .await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client.generate(&self.model, prompt, self.temperature).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        self.client.health_check().await
    }

    fn name(&self) -> &str {
        "openai"
    }
}
