//! HTTP provider tests against a mock OpenAI-compatible server.

use httpmock::prelude::*;
use serde_json::json;

use papersmith::providers::openai::{OpenAiCompletions, OpenAiConfig, OpenAiEmbeddings};
use papersmith::providers::retry::RetryClass;
use papersmith::providers::{CompletionProvider, EmbeddingProvider, ProviderError};

fn config(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        api_key: "test-key".to_string(),
        base_url: server.base_url(),
        dimensions: Some(2),
        ..OpenAiConfig::default()
    }
}

#[tokio::test]
async fn embeddings_round_trip_and_reorder_by_index() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/embeddings")
                .header("authorization", "Bearer test-key");
            // Entries deliberately out of order; the client sorts by index.
            then.status(200).json_body(json!({
                "data": [
                    {"embedding": [0.3, 0.4], "index": 1},
                    {"embedding": [0.1, 0.2], "index": 0}
                ]
            }));
        })
        .await;

    let client = OpenAiEmbeddings::new(&config(&server)).unwrap();
    let vectors = client
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    assert_eq!(client.dimension(), 2);
    mock.assert_async().await;
}

#[tokio::test]
async fn empty_input_skips_the_network() {
    let server = MockServer::start_async().await;
    let client = OpenAiEmbeddings::new(&config(&server)).unwrap();
    let vectors = client.embed_batch(&[]).await.unwrap();
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn mismatched_batch_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(200)
                .json_body(json!({"data": [{"embedding": [0.1, 0.2], "index": 0}]}));
        })
        .await;

    let client = OpenAiEmbeddings::new(&config(&server)).unwrap();
    let err = client
        .embed_batch(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::BatchMismatch { expected: 2, got: 1 }
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn rate_limits_and_server_errors_are_retryable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(429).body("slow down");
        })
        .await;

    let client = OpenAiEmbeddings::new(&config(&server)).unwrap();
    let err = client.embed_batch(&["a".to_string()]).await.unwrap_err();
    match &err {
        ProviderError::Status { status, body } => {
            assert_eq!(*status, 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_errors_are_not_retryable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/embeddings");
            then.status(400).body("bad request");
        })
        .await;

    let client = OpenAiEmbeddings::new(&config(&server)).unwrap();
    let err = client.embed_batch(&["a".to_string()]).await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn completions_extract_the_first_choice() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "[{\"question\": \"ok\"}]"}}
                ]
            }));
        })
        .await;

    let client = OpenAiCompletions::new(&config(&server)).unwrap();
    let content = client.complete("system prompt", "user prompt").await.unwrap();
    assert_eq!(content, "[{\"question\": \"ok\"}]");
    mock.assert_async().await;
}

#[tokio::test]
async fn choiceless_completion_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        })
        .await;

    let client = OpenAiCompletions::new(&config(&server)).unwrap();
    let err = client.complete("s", "u").await.unwrap_err();
    assert!(matches!(err, ProviderError::Decode(_)));
}
