//! Long-lived engine context.
//!
//! [`PaperEngine`] is constructed once at process start — providers
//! connected, tokenizer loaded, pipelines wired — and then shared by
//! reference into request handlers. Each `generate` call runs a fully
//! independent workflow; the only state shared between concurrent requests
//! is the knowledge store behind its trait object.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::ingest::chunker::ChunkerError;
use crate::ingest::{
    DocumentDescriptor, EmbeddingBatcher, IngestError, IngestReport, IngestionPipeline,
    RawDocument, TextExtractor, TokenChunker,
};
use crate::providers::{CompletionProvider, EmbeddingProvider};
use crate::question::GenerationRequest;
use crate::retrieve::ContextRetriever;
use crate::stores::{ChunkFilter, StoreError, StoreStats, VectorStore};
use crate::workflow::orchestrator::{CancelToken, GenerationOutcome, Orchestrator, WorkflowError};
use crate::workflow::{LlmGenerator, LlmValidator};

/// Shared application context: connect once, reuse for every request.
pub struct PaperEngine {
    config: EngineConfig,
    store: Arc<dyn VectorStore>,
    ingestion: IngestionPipeline,
    orchestrator: Orchestrator,
}

impl PaperEngine {
    /// Wires the ingestion pipeline and workflow orchestrator against the
    /// given providers and store. Fails only if the tokenizer cannot load or
    /// the chunking configuration is inconsistent.
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        completions: Arc<dyn CompletionProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, ChunkerError> {
        let chunker = TokenChunker::new(&config.chunking)?;
        let counter = chunker.counter();

        let batcher = EmbeddingBatcher::new(
            embedder.clone(),
            &config.embedding,
            config.retry.clone(),
        );
        let ingestion =
            IngestionPipeline::new(chunker, batcher, store.clone(), config.retry.clone());

        let retriever = ContextRetriever::new(
            embedder,
            store.clone(),
            counter,
            &config.retrieval,
            config.retry.clone(),
        );
        let generator = LlmGenerator::new(completions.clone(), config.retry.clone());
        let validator = LlmValidator::new(completions, config.retry.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(retriever),
            Arc::new(generator),
            Arc::new(validator),
            config.workflow.clone(),
        );

        Ok(Self {
            config,
            store,
            ingestion,
            orchestrator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingests one document into the knowledge store.
    pub async fn ingest(
        &self,
        extractor: &dyn TextExtractor,
        document: &RawDocument,
        descriptor: &DocumentDescriptor,
    ) -> Result<IngestReport, IngestError> {
        self.ingestion.ingest(extractor, document, descriptor).await
    }

    /// Generates a validated question set for `request`.
    pub async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationOutcome, WorkflowError> {
        self.orchestrator.run(request).await
    }

    /// Like [`generate`](Self::generate), honouring `cancel` between attempts.
    pub async fn generate_cancellable(
        &self,
        request: GenerationRequest,
        cancel: CancelToken,
    ) -> Result<GenerationOutcome, WorkflowError> {
        self.orchestrator.run_cancellable(request, cancel).await
    }

    /// Occupancy of the knowledge store.
    pub async fn knowledge_stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }

    /// Removes ingested chunks matching `filter`; returns how many were
    /// removed.
    pub async fn forget(&self, filter: &ChunkFilter) -> Result<usize, StoreError> {
        self.store.delete(filter).await
    }
}
