//! Retrieval-augmented answer chain

use futures::{future, StreamExt};
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::providers::{FragmentStream, GenerationProvider};
use crate::retrieval::MultiQueryRetriever;
use crate::storage::StoreHandle;

use super::prompt::{PromptBuilder, DEFAULT_ANSWER_TEMPLATE};

/// Retrieves context for a question and streams the generated answer
pub struct AnswerChain {
    retriever: Arc<MultiQueryRetriever>,
    generator: Arc<dyn GenerationProvider>,
    answer_template: String,
}

impl AnswerChain {
    /// Create with the default answer template
    pub fn new(retriever: Arc<MultiQueryRetriever>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            retriever,
            generator,
            answer_template: DEFAULT_ANSWER_TEMPLATE.to_string(),
        }
    }

    /// Create from configuration
    pub fn from_config(
        config: &RetrievalConfig,
        retriever: Arc<MultiQueryRetriever>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let chain = Self::new(retriever, generator);
        match &config.answer_template {
            Some(template) => chain.with_answer_template(template.clone()),
            None => chain,
        }
    }

    /// Replace the answer template (`{context}`, `{question}`)
    pub fn with_answer_template(mut self, template: impl Into<String>) -> Self {
        self.answer_template = template.into();
        self
    }

    /// The retriever feeding this chain
    pub fn retriever(&self) -> &MultiQueryRetriever {
        &self.retriever
    }

    /// Answer `question` from the store behind `handle`.
    ///
    /// Each call runs retrieval and generation afresh. The returned stream
    /// yields fragments as the provider produces them; a provider failure
    /// after the first fragment arrives as a final `Err` item. Dropping the
    /// stream early cancels generation and leaves the handle untouched.
    pub async fn answer(&self, question: &str, handle: &StoreHandle) -> Result<FragmentStream> {
        handle.index()?;

        let results = self.retriever.retrieve(question, handle).await?;
        let context = PromptBuilder::build_context(&results);
        let prompt = PromptBuilder::build_answer_prompt(&self.answer_template, &context, question.trim());

        tracing::info!(
            "Generating answer from {} chunks ({} context chars) with {}",
            results.len(),
            context.chars().count(),
            self.generator.model()
        );

        let stream = self.generator.generate_stream(&prompt).await?;
        Ok(end_after_error(stream))
    }
}

/// Guarantee nothing follows an `Err` item, whatever the provider does
fn end_after_error(stream: FragmentStream) -> FragmentStream {
    stream
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        })
        .boxed()
}

/// Drain an answer stream into one string; the first error wins
pub async fn collect_answer(mut stream: FragmentStream) -> Result<String> {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment?);
    }
    Ok(answer)
}
