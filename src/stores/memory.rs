//! In-memory cosine-similarity store.
//!
//! Backs the test suite and local runs. Not a persistence layer: contents
//! live and die with the process.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{ChunkFilter, EmbeddedChunk, ScoredChunk, StoreError, StoreStats, VectorStore};

/// Vector store keyed by chunk id with brute-force cosine search.
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: RwLock<FxHashMap<String, EmbeddedChunk>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(FxHashMap::default()),
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: Vec<EmbeddedChunk>) -> Result<(), StoreError> {
        for chunk in &chunks {
            if chunk.vector.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    got: chunk.vector.len(),
                });
            }
        }
        let mut entries = self.entries.write();
        for chunk in chunks {
            entries.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let entries = self.entries.read();
        let mut hits: Vec<ScoredChunk> = entries
            .values()
            .filter(|entry| filter.matches(&entry.chunk.metadata))
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine(vector, &entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, filter: &ChunkFilter) -> Result<usize, StoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !filter.matches(&entry.chunk.metadata));
        Ok(before - entries.len())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let entries = self.entries.read();
        let documents: FxHashSet<&str> = entries
            .values()
            .map(|entry| entry.chunk.metadata.source_document_id.as_str())
            .collect();
        Ok(StoreStats {
            vector_count: entries.len(),
            document_count: documents.len(),
        })
    }
}
