//! Deterministic provider implementations for tests and offline runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CompletionProvider, EmbeddingProvider, ProviderError};

/// Embedding provider that derives a stable pseudo-random unit vector from
/// the input text. Identical texts always map to identical vectors, distinct
/// texts to distinct vectors, which is enough to exercise similarity ranking
/// and idempotent-ingestion paths without a network.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        // FNV-1a seed, then an LCG fills the vector.
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in text.as_bytes() {
            seed ^= u64::from(*byte);
            seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
        }
        let mut state = seed | 1;
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let value = ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
            vector.push(value);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(crate::config::EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Completion provider that replays a queue of scripted responses.
///
/// Each `complete` call pops the next response; an empty queue is a decode
/// error so tests fail loudly instead of hanging on a silent default.
#[derive(Debug, Default)]
pub struct ScriptedCompletions {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedCompletions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: impl Into<String>) {
        self.responses.lock().push_back(response.into());
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletions {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| ProviderError::Decode("no scripted completion remaining".to_string()))
    }
}
