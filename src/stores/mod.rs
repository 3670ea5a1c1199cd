//! Vector store adapter.
//!
//! The knowledge store is an external capability: the core depends on the
//! [`VectorStore`] trait but does not implement the similarity search itself.
//! [`memory::InMemoryVectorStore`] provides a cosine-similarity backend for
//! tests and local runs; network-backed adapters implement the same trait.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::chunker::{ChunkMetadata, DocumentChunk};
use crate::providers::retry::RetryClass;

/// A chunk paired with its embedding vector, ready for persistence.
///
/// The id is deterministic over `(source_document_id, chunk_index)`, so
/// re-ingesting the same document overwrites rather than duplicates. Once
/// upserted the store owns the data; the application holds no further
/// reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: DocumentChunk,
}

impl EmbeddedChunk {
    /// Deterministic id for a chunk of a document.
    pub fn id_for(document_id: &str, chunk_index: usize) -> String {
        format!("{document_id}::{chunk_index}")
    }
}

/// Metadata filter for queries and deletes. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFilter {
    pub class_level: Option<String>,
    pub subject: Option<String>,
    pub chapter: Option<String>,
    pub source_document_id: Option<String>,
}

impl ChunkFilter {
    #[must_use]
    pub fn class_level(mut self, value: impl Into<String>) -> Self {
        self.class_level = Some(value.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, value: impl Into<String>) -> Self {
        self.subject = Some(value.into());
        self
    }

    #[must_use]
    pub fn chapter(mut self, value: impl Into<String>) -> Self {
        self.chapter = Some(value.into());
        self
    }

    #[must_use]
    pub fn document(mut self, value: impl Into<String>) -> Self {
        self.source_document_id = Some(value.into());
        self
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        fn ok(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().is_none_or(|wanted| wanted == value)
        }
        ok(&self.class_level, &metadata.class_level)
            && ok(&self.subject, &metadata.subject)
            && ok(&self.chapter, &metadata.chapter)
            && ok(&self.source_document_id, &metadata.source_document_id)
    }
}

/// A retrieval hit: a stored chunk with its similarity to the query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Store occupancy counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub vector_count: usize,
    pub document_count: usize,
}

/// Store failures. Backend and timeout failures are transient and retried
/// with backoff; a dimension mismatch is a caller bug and is not.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    #[diagnostic(
        code(papersmith::store::dimension_mismatch),
        help("Query and stored vectors must come from the same embedding model.")
    )]
    DimensionMismatch { expected: usize, got: usize },

    #[error("store backend error: {0}")]
    #[diagnostic(code(papersmith::store::backend))]
    Backend(String),

    #[error("store call timed out after {after:?}")]
    #[diagnostic(code(papersmith::store::timeout))]
    Timeout { after: Duration },
}

impl RetryClass for StoreError {
    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Timeout { .. })
    }

    fn timed_out(after: Duration) -> Self {
        StoreError::Timeout { after }
    }
}

/// Nearest-neighbour store for embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces chunks, keyed by their deterministic id.
    async fn upsert(&self, chunks: Vec<EmbeddedChunk>) -> Result<(), StoreError>;

    /// Returns up to `top_k` chunks matching `filter`, ordered by decreasing
    /// similarity to `vector`.
    async fn query(
        &self,
        vector: &[f32],
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Removes every chunk matching `filter`; returns how many were removed.
    async fn delete(&self, filter: &ChunkFilter) -> Result<usize, StoreError>;

    /// Current vector and distinct-document counts.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
