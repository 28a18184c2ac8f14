//! Paraphrase expansion, per-variant search, and rank-preserving merge

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generation::{PromptBuilder, DEFAULT_QUERY_TEMPLATE};
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::storage::StoreHandle;
use crate::types::ScoredChunk;

// "1.", "2)", "(3)", "-", "*", "•" list markers the model tends to add
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*\u{2022}]+\s+|\(?\d{1,2}[.):]\)?\s*)").expect("Invalid regex"));

/// Expands a question into paraphrases and merges their search results
pub struct MultiQueryRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    /// Paraphrases requested per question
    num_variants: usize,
    /// Chunks retrieved per query
    top_k: usize,
    /// Also search with the question as asked
    include_original: bool,
    query_template: String,
}

impl MultiQueryRetriever {
    /// Create with default settings (5 variants, top 4, original included)
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            embedder,
            generator,
            num_variants: 5,
            top_k: 4,
            include_original: true,
            query_template: DEFAULT_QUERY_TEMPLATE.to_string(),
        }
    }

    /// Create from configuration
    pub fn from_config(
        config: &RetrievalConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let retriever = Self::new(embedder, generator)
            .with_num_variants(config.num_variants)
            .with_top_k(config.top_k)
            .with_include_original(config.include_original);

        match &config.query_template {
            Some(template) => retriever.with_query_template(template.clone()),
            None => retriever,
        }
    }

    pub fn with_num_variants(mut self, num_variants: usize) -> Self {
        self.num_variants = num_variants.max(1);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_include_original(mut self, include_original: bool) -> Self {
        self.include_original = include_original;
        self
    }

    /// Replace the paraphrase instruction (`{question}`, `{count}`)
    pub fn with_query_template(mut self, template: impl Into<String>) -> Self {
        self.query_template = template.into();
        self
    }

    /// Ask the generation model for up to `num_variants` paraphrases
    pub async fn generate_queries(&self, question: &str) -> Result<Vec<String>> {
        let prompt = PromptBuilder::build_query_prompt(&self.query_template, question, self.num_variants);
        let raw = self.generator.generate(&prompt).await?;
        let variants = parse_variants(&raw, self.num_variants);

        if variants.len() < self.num_variants {
            tracing::warn!(
                "Generation model returned {} of {} requested query variants",
                variants.len(),
                self.num_variants
            );
        }

        Ok(variants)
    }

    /// Retrieve chunks relevant to `question`, most relevant first, each chunk once
    pub async fn retrieve(&self, question: &str, handle: &StoreHandle) -> Result<Vec<ScoredChunk>> {
        let raw_question = question;
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidQuestion {
                question: raw_question.to_string(),
            });
        }

        let index = handle.index()?;
        let pinned = &index.document().embedding_model;
        if pinned != self.embedder.model() {
            return Err(Error::EmbeddingModelMismatch {
                location: handle.location().to_path_buf(),
                expected: self.embedder.model().to_string(),
                found: pinned.clone(),
            });
        }

        let variants = self.generate_queries(question).await?;

        let mut queries: Vec<String> = Vec::with_capacity(variants.len() + 1);
        if self.include_original || variants.is_empty() {
            queries.push(question.to_string());
        }
        queries.extend(variants);

        let mut seen = HashSet::new();
        queries.retain(|q| seen.insert(q.to_lowercase()));

        let vectors = self.embedder.embed(&queries).await?;
        if vectors.len() != queries.len() {
            return Err(Error::embedding_unavailable(
                self.embedder.model(),
                format!("Expected {} embeddings, received {}", queries.len(), vectors.len()),
            ));
        }

        let mut lists = Vec::with_capacity(queries.len());
        for (query, vector) in queries.iter().zip(&vectors) {
            let hits = index.search(vector, self.top_k)?;
            tracing::debug!("Query {:?} matched {} chunks", query, hits.len());
            lists.push(hits);
        }

        let merged = merge_results(lists);
        tracing::info!(
            "Retrieved {} unique chunks for {} queries",
            merged.len(),
            queries.len()
        );

        Ok(merged)
    }
}

/// Extract paraphrased questions from raw model output, one per line.
///
/// Strips list markers and surrounding quotes, and drops blank lines and
/// preambles such as "Here are five versions:".
pub fn parse_variants(raw: &str, limit: usize) -> Vec<String> {
    raw.lines()
        .map(|line| {
            let line = LIST_MARKER.replace(line, "");
            line.trim()
                .trim_matches(|c: char| matches!(c, '"' | '\u{201C}' | '\u{201D}'))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .take(limit)
        .collect()
}

/// Union per-query result lists, keeping each chunk once.
///
/// A chunk keeps the best rank it reached in any list and its highest
/// similarity. The result is ordered by rank, then similarity, then the
/// order in which chunks were first seen.
pub fn merge_results(lists: Vec<Vec<ScoredChunk>>) -> Vec<ScoredChunk> {
    struct Merged {
        hit: ScoredChunk,
        rank: usize,
        first_seen: usize,
    }

    let mut by_id: HashMap<Uuid, usize> = HashMap::new();
    let mut merged: Vec<Merged> = Vec::new();

    for list in lists {
        for (rank, hit) in list.into_iter().enumerate() {
            match by_id.get(&hit.chunk.id) {
                Some(&i) => {
                    let entry = &mut merged[i];
                    entry.rank = entry.rank.min(rank);
                    if hit.similarity > entry.hit.similarity {
                        entry.hit.similarity = hit.similarity;
                    }
                }
                None => {
                    let first_seen = merged.len();
                    by_id.insert(hit.chunk.id, first_seen);
                    merged.push(Merged {
                        hit,
                        rank,
                        first_seen,
                    });
                }
            }
        }
    }

    merged.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| b.hit.similarity.total_cmp(&a.hit.similarity))
            .then_with(|| a.first_seen.cmp(&b.first_seen))
    });

    merged.into_iter().map(|m| m.hit).collect()
}
