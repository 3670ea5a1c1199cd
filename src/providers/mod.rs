//! External model capability seams.
//!
//! The core never talks to a model service directly; it goes through
//! [`EmbeddingProvider`] and [`CompletionProvider`] trait objects. Production
//! code wires in the OpenAI-compatible HTTP clients from [`openai`]; tests
//! and offline runs use the deterministic implementations in [`mock`].
//!
//! Retries, exponential backoff, and per-call timeouts are applied by the
//! callers through [`retry::with_retry`] rather than inside each client, so
//! every external call site shares one policy.

pub mod mock;
pub mod openai;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::config::EMBEDDING_DIM;
use self::retry::RetryClass;

/// Converts a batch of texts into fixed-dimension embedding vectors.
///
/// The same provider instance must serve both ingestion and query embedding
/// so stored and query vectors share a model and dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds every text in `texts`, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Single request/response text generation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends a system + user prompt pair and returns the raw model text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// Failures raised by model providers.
///
/// Transient transport problems, rate limits, server errors, and timeouts
/// are retryable; malformed payloads are not.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    #[diagnostic(code(papersmith::provider::transport))]
    Transport(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    #[diagnostic(code(papersmith::provider::status))]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    #[diagnostic(
        code(papersmith::provider::decode),
        help("The model endpoint answered with a payload this client cannot interpret.")
    )]
    Decode(String),

    #[error("provider returned {got} results for {expected} inputs")]
    #[diagnostic(code(papersmith::provider::batch_mismatch))]
    BatchMismatch { expected: usize, got: usize },

    #[error("call timed out after {after:?}")]
    #[diagnostic(code(papersmith::provider::timeout))]
    Timeout { after: Duration },
}

impl RetryClass for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Timeout { .. } => true,
            ProviderError::Decode(_) | ProviderError::BatchMismatch { .. } => false,
        }
    }

    fn timed_out(after: Duration) -> Self {
        ProviderError::Timeout { after }
    }
}
