//! Prompt templates for query expansion and answering

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::types::ScoredChunk;

/// Instruction asking the generation model for paraphrased questions
pub const DEFAULT_QUERY_TEMPLATE: &str = "You are an AI assistant. Generate {count} different versions of the user question \
to retrieve relevant documents from a vector database. Provide these alternative questions separated by newlines.\n\
Original question: {question}";

/// Answer prompt; the model is told to stay within the retrieved context
pub const DEFAULT_ANSWER_TEMPLATE: &str = "Answer the question based ONLY on the following context:\n{context}\n\nQuestion: {question}";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("Invalid regex"));

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Substitute `{name}` placeholders in one pass.
    ///
    /// Substituted values are never rescanned, so a context containing
    /// `{question}` is left alone. Unknown placeholders are kept verbatim.
    pub fn render(template: &str, values: &[(&str, &str)]) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let key = &caps[1];
                values
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Build the paraphrase instruction
    pub fn build_query_prompt(template: &str, question: &str, count: usize) -> String {
        Self::render(
            template,
            &[("question", question), ("count", &number_word(count))],
        )
    }

    /// Concatenate retrieved chunk text, best match first
    pub fn build_context(results: &[ScoredChunk]) -> String {
        results
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the answer prompt
    pub fn build_answer_prompt(template: &str, context: &str, question: &str) -> String {
        Self::render(template, &[("context", context), ("question", question)])
    }
}

fn number_word(n: usize) -> String {
    const WORDS: [&str; 11] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    ];
    WORDS.get(n).map(|w| w.to_string()).unwrap_or_else(|| n.to_string())
}
