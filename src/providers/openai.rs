//! OpenAI-compatible HTTP clients for embeddings and chat completions.
//!
//! Both clients are plain request/response wrappers: retries and timeouts are
//! applied by callers through [`crate::providers::retry::with_retry`], which
//! keeps the transient-failure policy in one place.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{CompletionProvider, EmbeddingProvider, ProviderError};
use crate::config::EMBEDDING_DIM;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub completion_model: String,
    /// Requested embedding dimension; omitted from the payload when `None`.
    pub dimensions: Option<usize>,
    pub temperature: f32,
    /// Transport-level timeout for the HTTP client. The logical per-call
    /// timeout in [`crate::providers::retry::RetryPolicy`] is the one that
    /// classifies slow calls as retryable.
    pub request_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
            dimensions: Some(EMBEDDING_DIM),
            temperature: 0.7,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiConfig {
    /// Reads `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`) from the
    /// environment, `.env` included.
    pub fn from_env() -> Result<Self, ProviderError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Decode("OPENAI_API_KEY is not set".to_string()))?;
        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }
}

fn build_client(config: &OpenAiConfig) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", config.api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth)
            .map_err(|_| ProviderError::Decode("API key contains invalid header bytes".into()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout)
        .default_headers(headers)
        .build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Embeddings client for `POST {base_url}/embeddings`.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbeddings {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!("{}/embeddings", config.base_url.trim_end_matches('/')),
            model: config.embedding_model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let response = check_status(response).await?;
        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(ProviderError::BatchMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimensions.unwrap_or(EMBEDDING_DIM)
    }
}

/// Chat-completions client for `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiCompletions {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompletions {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.completion_model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.temperature,
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("completion response has no choices".to_string()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
