//! Prompt construction and streamed answer generation

mod chain;
mod prompt;

pub use chain::{collect_answer, AnswerChain};
pub use prompt::{PromptBuilder, DEFAULT_ANSWER_TEMPLATE, DEFAULT_QUERY_TEMPLATE};
