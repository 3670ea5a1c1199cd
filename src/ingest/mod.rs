//! Document ingestion pipeline.
//!
//! ```text
//! RawDocument ──► extract::TextExtractor ──► chunker::TokenChunker
//!                                                     │
//!                                     ordered DocumentChunk sequence
//!                                                     │
//!                                                     ▼
//!                                       embedder::EmbeddingBatcher
//!                                                     │
//!                                  batches of EmbeddedChunk, in order
//!                                                     │
//!                                                     ▼
//!                                     stores::VectorStore::upsert
//! ```
//!
//! Ingestion runs independently of generation. Each completed batch is
//! upserted before the next is awaited, so a failure part-way through leaves
//! everything before the failing batch persisted; because chunk ids are
//! deterministic, re-running the same document resumes idempotently.

pub mod chunker;
pub mod embedder;
pub mod extract;

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::providers::retry::{RetryPolicy, with_retry};
use crate::stores::{StoreError, VectorStore};
pub use chunker::{ChunkMetadata, DocumentChunk, DocumentDescriptor, TokenChunker};
pub use embedder::{EmbeddingBatcher, EmbeddingError};
pub use extract::{ExtractionError, PlainTextExtractor, RawDocument, TextExtractor};

/// Outcome of one document ingestion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_count: usize,
    pub batch_count: usize,
    pub vectors_upserted: usize,
    pub duration_ms: u64,
}

/// Ingestion failures, per document, with enough context to resume.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Extract → chunk → embed → upsert, wired once and reused per document.
pub struct IngestionPipeline {
    chunker: TokenChunker,
    batcher: EmbeddingBatcher,
    store: Arc<dyn VectorStore>,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        chunker: TokenChunker,
        batcher: EmbeddingBatcher,
        store: Arc<dyn VectorStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            chunker,
            batcher,
            store,
            retry,
        }
    }

    /// Ingests one document into the knowledge store.
    ///
    /// Partial progress is never discarded: every batch embedded before a
    /// failure has already been upserted when the error is returned, and the
    /// error names the failing chunk range.
    #[instrument(skip(self, extractor, document), fields(document = %document.name))]
    pub async fn ingest(
        &self,
        extractor: &dyn TextExtractor,
        document: &RawDocument,
        descriptor: &DocumentDescriptor,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let text = extractor.extract(document).await?;
        let chunks = self.chunker.chunk(&text, descriptor)?;
        let chunk_count = chunks.len();

        let stream = self.batcher.embed_stream(chunks);
        futures_util::pin_mut!(stream);

        let mut batch_count = 0usize;
        let mut vectors_upserted = 0usize;
        while let Some(batch) = stream.next().await {
            let embedded = batch?;
            let len = embedded.len();
            with_retry(&self.retry, || self.store.upsert(embedded.clone())).await?;
            batch_count += 1;
            vectors_upserted += len;
            tracing::debug!(
                document = %descriptor.document_id,
                batch = batch_count,
                vectors = vectors_upserted,
                "upserted embedding batch"
            );
        }

        let report = IngestReport {
            document_id: descriptor.document_id.clone(),
            chunk_count,
            batch_count,
            vectors_upserted,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            document = %report.document_id,
            chunks = report.chunk_count,
            vectors = report.vectors_upserted,
            duration_ms = report.duration_ms,
            "document ingested"
        );
        Ok(report)
    }
}
