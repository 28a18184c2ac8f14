//! Generation provider trait for streamed text completion

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::Result;

/// Single-pass stream of generated text fragments.
///
/// Yields fragments in production order. An `Err` item means the provider
/// failed mid-stream and is always the last item; normal exhaustion is `None`.
/// Dropping the stream releases the underlying provider connection.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Trait for prompt-driven text generation
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (mistral, llama3, phi3, ...)
/// - `OpenAiLlm`: OpenAI-compatible `/chat/completions` endpoint
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Start generating; fails with `GenerationUnavailable` when the
    /// provider cannot be reached
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentStream>;

    /// Generate the complete response
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut stream = self.generate_stream(prompt).await?;
        let mut output = String::new();
        while let Some(fragment) = stream.next().await {
            output.push_str(&fragment?);
        }
        Ok(output)
    }

    /// Get the model being used
    fn model(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
