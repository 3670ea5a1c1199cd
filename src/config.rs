//! Engine configuration.
//!
//! All tunables live in one [`EngineConfig`] resolved once at process start
//! and handed by reference into the long-lived [`crate::engine::PaperEngine`].
//! Environment overrides (prefixed `PAPERSMITH_`) are loaded through
//! `dotenvy`, so a local `.env` file works the same as real environment
//! variables.

use std::time::Duration;

use crate::providers::retry::RetryPolicy;

/// Dimension of the embedding vectors produced and stored by the pipeline.
///
/// Query embeddings must use the same model family and dimension as the
/// stored vectors; the in-memory store rejects mismatched upserts.
pub const EMBEDDING_DIM: usize = 1536;

/// Token-level chunking parameters for document ingestion.
#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks. Must be < `chunk_size`.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Batched embedding parameters.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Chunks per embedding request.
    pub batch_size: usize,
    /// Batches in flight at once. Order of completion is preserved so the
    /// resume point after a failure stays well-defined.
    pub concurrency: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            concurrency: 2,
        }
    }
}

/// Context retrieval parameters.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Nearest neighbours fetched per request.
    pub top_k: usize,
    /// Token budget for the concatenated context block; lowest-similarity
    /// chunks are dropped first when the budget would be exceeded.
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_tokens: 3000,
        }
    }
}

/// Retry-loop policy for the generation workflow.
#[derive(Clone, Debug)]
pub struct WorkflowPolicy {
    /// Upper bound on generation attempts within one run.
    pub max_attempts: u32,
    /// An attempt whose pass rate falls below this triggers a retry
    /// (quality gate — a quantity shortfall alone never retries).
    pub retry_pass_rate: f32,
    /// Concurrent validator calls per attempt. Verdict order in the report
    /// always matches generation order regardless of scheduling.
    pub validation_concurrency: usize,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_pass_rate: 0.5,
            validation_concurrency: 4,
        }
    }
}

/// Top-level configuration for a [`crate::engine::PaperEngine`].
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub workflow: WorkflowPolicy,
    /// Shared retry/backoff/timeout policy for external calls.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Resolves configuration from the environment, falling back to defaults.
    ///
    /// Recognised variables: `PAPERSMITH_CHUNK_SIZE`,
    /// `PAPERSMITH_CHUNK_OVERLAP`, `PAPERSMITH_EMBED_BATCH_SIZE`,
    /// `PAPERSMITH_TOP_K`, `PAPERSMITH_MAX_CONTEXT_TOKENS`,
    /// `PAPERSMITH_MAX_ATTEMPTS`, `PAPERSMITH_CALL_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(value) = env_usize("PAPERSMITH_CHUNK_SIZE") {
            config.chunking.chunk_size = value;
        }
        if let Some(value) = env_usize("PAPERSMITH_CHUNK_OVERLAP") {
            config.chunking.chunk_overlap = value;
        }
        if let Some(value) = env_usize("PAPERSMITH_EMBED_BATCH_SIZE") {
            config.embedding.batch_size = value;
        }
        if let Some(value) = env_usize("PAPERSMITH_TOP_K") {
            config.retrieval.top_k = value;
        }
        if let Some(value) = env_usize("PAPERSMITH_MAX_CONTEXT_TOKENS") {
            config.retrieval.max_context_tokens = value;
        }
        if let Some(value) = env_usize("PAPERSMITH_MAX_ATTEMPTS") {
            config.workflow.max_attempts = value as u32;
        }
        if let Some(value) = env_usize("PAPERSMITH_CALL_TIMEOUT_SECS") {
            config.retry.call_timeout = Duration::from_secs(value as u64);
        }
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}
