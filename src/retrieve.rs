//! Context retrieval for generation requests.
//!
//! Builds a metadata filter from the request's curriculum placement, embeds
//! the free-text query (topic + chapter — topics are often absent from chunk
//! metadata, so topic is query augmentation rather than a hard filter), and
//! concatenates the top hits into a single context block under a token
//! budget.

use std::sync::Arc;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::RetrievalConfig;
use crate::ingest::chunker::TokenCounter;
use crate::providers::retry::{RetryPolicy, with_retry};
use crate::providers::{EmbeddingProvider, ProviderError};
use crate::question::GenerationRequest;
use crate::stores::{ChunkFilter, StoreError, VectorStore};

/// Concatenated retrieved chunk text handed to the generator.
///
/// Fixed for the lifetime of one workflow run; retries reuse it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBlock {
    pub text: String,
    pub chunk_count: usize,
    pub token_count: usize,
}

impl ContextBlock {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }
}

/// Retrieval failures. The orchestrator treats these as a degraded-context
/// condition, not a run failure.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    #[diagnostic(code(papersmith::retrieve::embed))]
    Embed(#[from] ProviderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Fetches and assembles syllabus context for a request.
pub struct ContextRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    counter: TokenCounter,
    top_k: usize,
    max_context_tokens: usize,
    retry: RetryPolicy,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        counter: TokenCounter,
        config: &RetrievalConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            counter,
            top_k: config.top_k.max(1),
            max_context_tokens: config.max_context_tokens,
            retry,
        }
    }

    /// Retrieves the top-k chunks for `request` and concatenates them in
    /// similarity order. When concatenation would exceed the token budget,
    /// lowest-similarity chunks are dropped first (i.e. assembly stops).
    #[instrument(skip(self, request), fields(subject = %request.subject, chapter = %request.chapter))]
    pub async fn retrieve(&self, request: &GenerationRequest) -> Result<ContextBlock, RetrievalError> {
        let query_text = format!("{} {}", request.topic, request.chapter);
        let query = vec![query_text];
        let mut vectors = with_retry(&self.retry, || self.embedder.embed_batch(&query)).await?;
        let vector = vectors.pop().ok_or(ProviderError::BatchMismatch {
            expected: 1,
            got: 0,
        })?;

        let filter = ChunkFilter::default()
            .class_level(request.class_level.clone())
            .subject(request.subject.clone())
            .chapter(request.chapter.clone());

        let hits = with_retry(&self.retry, || {
            self.store.query(&vector, &filter, self.top_k)
        })
        .await?;

        let mut text = String::new();
        let mut token_count = 0usize;
        let mut chunk_count = 0usize;
        for hit in &hits {
            let chunk_tokens = self.counter.count(&hit.chunk.text);
            if chunk_count > 0 && token_count + chunk_tokens > self.max_context_tokens {
                tracing::debug!(
                    dropped = hits.len() - chunk_count,
                    budget = self.max_context_tokens,
                    "context budget reached, dropping lowest-similarity chunks"
                );
                break;
            }
            if chunk_count > 0 {
                text.push_str("\n\n");
            }
            text.push_str(&hit.chunk.text);
            token_count += chunk_tokens;
            chunk_count += 1;
        }

        tracing::info!(chunks = chunk_count, tokens = token_count, "context assembled");
        Ok(ContextBlock {
            text,
            chunk_count,
            token_count,
        })
    }
}
