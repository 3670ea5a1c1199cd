//! Batched embedding of document chunks.
//!
//! The batcher groups chunks into fixed-size batches and embeds them with
//! bounded concurrency. Completion order is preserved, so the consumer can
//! upsert each finished batch immediately and a mid-stream failure leaves a
//! well-defined resume point: everything before the failing batch is already
//! persisted, and the error names the document and chunk range that failed.

use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use miette::Diagnostic;
use thiserror::Error;

use super::chunker::DocumentChunk;
use crate::config::EmbeddingConfig;
use crate::providers::retry::{RetryPolicy, with_retry};
use crate::providers::{EmbeddingProvider, ProviderError};
use crate::stores::EmbeddedChunk;

/// Embedding failures, raised after the per-batch retry budget is spent.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    #[error(
        "embedding failed for document '{document_id}' chunks {}..={}: {source}",
        .chunk_range.0, .chunk_range.1
    )]
    #[diagnostic(
        code(papersmith::embed::batch_failed),
        help("Chunks before this range are already upserted; re-run ingestion to resume.")
    )]
    BatchFailed {
        document_id: String,
        chunk_range: (usize, usize),
        #[source]
        source: ProviderError,
    },

    #[error(
        "embedding service returned {got} vectors for {expected} chunks of document '{document_id}'"
    )]
    #[diagnostic(code(papersmith::embed::batch_mismatch))]
    BatchMismatch {
        document_id: String,
        expected: usize,
        got: usize,
    },
}

/// Groups chunks into batches and embeds them via the configured provider.
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    concurrency: usize,
    retry: RetryPolicy,
}

impl EmbeddingBatcher {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        config: &EmbeddingConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            retry,
        }
    }

    /// Lazily embeds `chunks` batch by batch.
    ///
    /// The stream is restartable: it holds no state beyond the chunk
    /// sequence it was derived from, so calling this again with the same
    /// chunks re-derives the same batches. Up to `concurrency` batches are
    /// in flight at once, but items are yielded in batch order.
    pub fn embed_stream(
        &self,
        chunks: Vec<DocumentChunk>,
    ) -> impl Stream<Item = Result<Vec<EmbeddedChunk>, EmbeddingError>> + '_ {
        let batches = into_batches(chunks, self.batch_size);
        stream::iter(batches)
            .map(move |batch| self.embed_batch(batch))
            .buffered(self.concurrency)
    }

    async fn embed_batch(
        &self,
        batch: Vec<DocumentChunk>,
    ) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
        let document_id = batch
            .first()
            .map(|chunk| chunk.metadata.source_document_id.clone())
            .unwrap_or_default();
        let chunk_range = (
            batch.first().map(|c| c.metadata.chunk_index).unwrap_or(0),
            batch.last().map(|c| c.metadata.chunk_index).unwrap_or(0),
        );
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

        let vectors = with_retry(&self.retry, || self.provider.embed_batch(&texts))
            .await
            .map_err(|source| EmbeddingError::BatchFailed {
                document_id: document_id.clone(),
                chunk_range,
                source,
            })?;

        if vectors.len() != batch.len() {
            return Err(EmbeddingError::BatchMismatch {
                document_id,
                expected: batch.len(),
                got: vectors.len(),
            });
        }

        Ok(batch
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk {
                id: EmbeddedChunk::id_for(
                    &chunk.metadata.source_document_id,
                    chunk.metadata.chunk_index,
                ),
                vector,
                chunk,
            })
            .collect())
    }
}

fn into_batches(chunks: Vec<DocumentChunk>, batch_size: usize) -> Vec<Vec<DocumentChunk>> {
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size.min(chunks.len()));
    for chunk in chunks {
        current.push(chunk);
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
