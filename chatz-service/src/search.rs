//! Retrieval and answer composition for ready documents.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{AnswerMode, QueryConfig};
use crate::db::{Chunk, Database};
use crate::embeddings::{Embedder, tokenize};
use crate::error::{ServiceResult, format_error_chain};
use crate::ollama::{ChatMessage, OllamaClient};

const ANSWER_SYSTEM_PROMPT: &str = "You answer questions about a single document. \
Use only the provided excerpts. If the excerpts do not contain the answer, say so briefly.";

/// Words too common to count as evidence for a sentence
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from", "how",
    "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "were", "what",
    "when", "where", "which", "who", "why", "with",
];

/// Answer to a question with the snippets it was drawn from
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// A retrieved chunk and its similarity to the question
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub similarity: f32,
}

impl SearchResult {
    /// Format for LLM context
    pub fn format_for_context(&self) -> String {
        let mut parts = Vec::new();

        if let Some(page) = self.chunk.page_number {
            parts.push(format!("Page: {}", page));
        }

        parts.push(format!("Relevance: {:.2}", self.similarity));
        parts.push(format!("Content:\n{}", self.chunk.content));

        parts.join("\n")
    }
}

/// Search service for question answering over embedded chunks
pub struct SearchService {
    db: Arc<Database>,
    embedder: Arc<Embedder>,
    ollama: Arc<OllamaClient>,
    config: QueryConfig,
}

impl SearchService {
    pub fn new(
        db: Arc<Database>,
        embedder: Arc<Embedder>,
        ollama: Arc<OllamaClient>,
        config: QueryConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            ollama,
            config,
        }
    }

    /// The `top_k` chunks of a document closest to `question`
    pub async fn search(&self, document_id: &str, question: &str) -> ServiceResult<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(question).await?;

        let results: Vec<SearchResult> = self
            .db
            .search_chunks(document_id, &query_embedding, self.config.top_k)?
            .into_iter()
            .map(|(chunk, similarity)| SearchResult { chunk, similarity })
            .collect();

        debug!(
            doc_id = %document_id,
            results = results.len(),
            top = results.first().map(|r| r.similarity).unwrap_or(0.0),
            "Retrieved chunks"
        );

        Ok(results)
    }

    /// Retrieve supporting chunks and compose an answer from them
    pub async fn answer(&self, document_id: &str, question: &str) -> ServiceResult<QueryAnswer> {
        let results = self.search(document_id, question).await?;

        let sources = results
            .iter()
            .map(|r| truncate_chars(&r.chunk.content, self.config.snippet_chars))
            .collect();

        let extractive = || compose_extractive(question, &results, self.config.max_answer_sentences);

        let answer = match self.config.answer_mode {
            AnswerMode::Extractive => extractive(),
            AnswerMode::Ollama => match self.generate(question, &results).await {
                Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
                Ok(_) => {
                    warn!(doc_id = %document_id, "Empty model reply, using extractive answer");
                    extractive()
                }
                Err(e) => {
                    warn!(
                        doc_id = %document_id,
                        error = %format_error_chain(&e),
                        "Answer generation failed, using extractive answer"
                    );
                    extractive()
                }
            },
        };

        Ok(QueryAnswer { answer, sources })
    }

    async fn generate(&self, question: &str, results: &[SearchResult]) -> ServiceResult<String> {
        let mut context = String::new();
        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!("--- Excerpt {} ---\n", i + 1));
            context.push_str(&result.format_for_context());
            context.push_str("\n\n");
        }

        let messages = vec![
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}Question: {}", context, question)),
        ];

        self.ollama.chat(messages).await
    }
}

/// Pick the sentences of `results` sharing the most terms with `question`.
///
/// At most `max_sentences` are returned, joined in reading order. When no
/// sentence shares a term, the opening sentence of the best chunk stands in.
pub fn compose_extractive(question: &str, results: &[SearchResult], max_sentences: usize) -> String {
    let terms: HashSet<String> = tokenize(question)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect();

    // (chunk_index, position in chunk, score, sentence)
    let mut scored: Vec<(i32, usize, usize, &str)> = Vec::new();
    let mut seen = HashSet::new();

    for result in results {
        for (position, sentence) in split_sentences(&result.chunk.content).into_iter().enumerate() {
            if !seen.insert(sentence) {
                continue;
            }
            let sentence_terms: HashSet<String> = tokenize(sentence).collect();
            let score = terms.intersection(&sentence_terms).count();
            if score > 0 {
                scored.push((result.chunk.chunk_index, position, score, sentence));
            }
        }
    }

    if scored.is_empty() {
        return results
            .first()
            .and_then(|r| split_sentences(&r.chunk.content).into_iter().next())
            .unwrap_or_default()
            .to_string();
    }

    scored.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)));
    scored.truncate(max_sentences.max(1));
    scored.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    scored
        .iter()
        .map(|(_, _, _, sentence)| *sentence)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split on `.`, `!` and `?` followed by whitespace or end of text
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}
