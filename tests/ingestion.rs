//! Ingestion pipeline integration tests: idempotency, bounded retry, and
//! partial-failure resumability.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use papersmith::config::{ChunkingConfig, EmbeddingConfig};
use papersmith::ingest::chunker::{ChunkMetadata, DocumentChunk, DocumentDescriptor, TokenChunker};
use papersmith::ingest::{
    EmbeddingBatcher, EmbeddingError, IngestionPipeline, PlainTextExtractor, RawDocument,
};
use papersmith::providers::mock::MockEmbeddingProvider;
use papersmith::providers::retry::RetryPolicy;
use papersmith::providers::{EmbeddingProvider, ProviderError};
use papersmith::stores::memory::InMemoryVectorStore;
use papersmith::stores::{ChunkFilter, VectorStore};

const DIM: usize = 16;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        call_timeout: Duration::from_secs(5),
    }
}

fn descriptor() -> DocumentDescriptor {
    DocumentDescriptor::new("doc-1", "Class 10", "Math", "Algebra")
}

fn syllabus_text() -> String {
    (0..12)
        .map(|i| {
            format!(
                "Section {i} discusses quadratic equations and their roots. \
                 The discriminant determines how many real solutions exist."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn pipeline(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> IngestionPipeline {
    let chunker = TokenChunker::new(&ChunkingConfig {
        chunk_size: 40,
        chunk_overlap: 8,
    })
    .unwrap();
    let batcher = EmbeddingBatcher::new(
        provider,
        &EmbeddingConfig {
            batch_size: 3,
            concurrency: 2,
        },
        fast_retry(),
    );
    IngestionPipeline::new(chunker, batcher, store, fast_retry())
}

#[tokio::test]
async fn reingesting_a_document_is_idempotent() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let pipeline = pipeline(Arc::new(MockEmbeddingProvider::new(DIM)), store.clone());
    let document = RawDocument::new("algebra.txt", syllabus_text().into_bytes());

    let first = pipeline
        .ingest(&PlainTextExtractor, &document, &descriptor())
        .await
        .unwrap();
    let count_after_first = store.stats().await.unwrap().vector_count;
    assert_eq!(first.vectors_upserted, count_after_first);
    assert!(count_after_first > 1);

    let second = pipeline
        .ingest(&PlainTextExtractor, &document, &descriptor())
        .await
        .unwrap();
    let count_after_second = store.stats().await.unwrap().vector_count;

    assert_eq!(second.chunk_count, first.chunk_count);
    assert_eq!(count_after_second, count_after_first, "re-ingest must not duplicate");
    assert_eq!(store.stats().await.unwrap().document_count, 1);
}

#[tokio::test]
async fn image_only_documents_surface_extraction_errors() {
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let pipeline = pipeline(Arc::new(MockEmbeddingProvider::new(DIM)), store.clone());
    let document = RawDocument::new("scanned.pdf", b"   \n\n  ".to_vec());

    let err = pipeline
        .ingest(&PlainTextExtractor, &document, &descriptor())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no extractable text"));
    assert_eq!(store.stats().await.unwrap().vector_count, 0);
}

/// Provider that fails with a retryable error a fixed number of times before
/// delegating to the deterministic mock.
struct FlakyEmbedder {
    inner: MockEmbeddingProvider,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyEmbedder {
    fn new(failures: u32) -> Self {
        Self {
            inner: MockEmbeddingProvider::new(DIM),
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::Status {
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

#[tokio::test]
async fn transient_batch_failures_are_retried_with_backoff() {
    let provider = Arc::new(FlakyEmbedder::new(2));
    let store = Arc::new(InMemoryVectorStore::new(DIM));
    let pipeline = pipeline(provider.clone(), store.clone());
    let document = RawDocument::new("algebra.txt", "One short paragraph.".as_bytes().to_vec());

    let report = pipeline
        .ingest(&PlainTextExtractor, &document, &descriptor())
        .await
        .unwrap();

    assert_eq!(report.batch_count, 1);
    // Two rate-limited calls plus the one that succeeded.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.stats().await.unwrap().vector_count, report.chunk_count);
}

/// Provider that fails permanently on any batch containing the marker.
struct PoisonEmbedder {
    inner: MockEmbeddingProvider,
    marker: &'static str,
}

#[async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.iter().any(|text| text.contains(self.marker)) {
            return Err(ProviderError::Decode("poisoned batch".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

fn hand_chunk(index: usize, text: &str) -> DocumentChunk {
    DocumentChunk {
        text: text.to_string(),
        token_count: 4,
        overlap_len: 0,
        metadata: ChunkMetadata {
            class_level: "Class 10".into(),
            subject: "Math".into(),
            chapter: "Algebra".into(),
            source_document_id: "doc-1".into(),
            chunk_index: index,
        },
    }
}

#[tokio::test]
async fn partial_progress_survives_a_failing_batch() {
    // Batches of 2 over 5 chunks: [0,1], [2,3], [4]. The last batch fails
    // permanently; the first two must already be upserted when the error
    // surfaces, and the error names the failing chunk range.
    let provider = Arc::new(PoisonEmbedder {
        inner: MockEmbeddingProvider::new(DIM),
        marker: "poison",
    });
    let batcher = EmbeddingBatcher::new(
        provider,
        &EmbeddingConfig {
            batch_size: 2,
            concurrency: 2,
        },
        fast_retry(),
    );
    let store = InMemoryVectorStore::new(DIM);

    let chunks: Vec<DocumentChunk> = vec![
        hand_chunk(0, "roots of a quadratic"),
        hand_chunk(1, "the discriminant"),
        hand_chunk(2, "completing the square"),
        hand_chunk(3, "vertex form"),
        hand_chunk(4, "poison marker chunk"),
    ];

    let stream = batcher.embed_stream(chunks);
    futures_util::pin_mut!(stream);

    let mut failure = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(batch) => store.upsert(batch).await.unwrap(),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    let err = failure.expect("the poisoned batch must fail");
    match err {
        EmbeddingError::BatchFailed {
            document_id,
            chunk_range,
            ..
        } => {
            assert_eq!(document_id, "doc-1");
            assert_eq!(chunk_range, (4, 4));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Everything before the failing batch is persisted: the resume point.
    assert_eq!(store.stats().await.unwrap().vector_count, 4);
    let remaining = store
        .query(&vec![0.0; DIM], &ChunkFilter::default().document("doc-1"), 10)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 4);
}
