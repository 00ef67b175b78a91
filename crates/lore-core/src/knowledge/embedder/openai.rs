use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider};

/// OpenAI-compatible embeddings client.
///
/// Works with any provider that implements the OpenAI `/embeddings` API:
/// - OpenAI
/// - Ollama (http://localhost:11434/v1)
/// - vLLM
/// - llama.cpp
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    model_id: String,
    dimension: AtomicUsize,
    client: Client,
}

impl OpenAiEmbedder {
    /// Creates a new OpenAI-compatible embedder.
    ///
    /// # Arguments
    /// * `base_url` - The API base URL (e.g., "https://api.openai.com/v1")
    /// * `api_key` - The API key (can be empty for local providers like Ollama)
    /// * `model` - The model name (e.g., "text-embedding-3-small", "nomic-embed-text")
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let model = model.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: format!("openai/{}", model),
            dimension: AtomicUsize::new(known_dimension(&model).unwrap_or(0)),
            model,
            client,
        })
    }

    /// Pin the dimension for models not in the built-in table.
    pub fn with_dimension(self, dimension: usize) -> Self {
        self.dimension.store(dimension, Ordering::Relaxed);
        self
    }

    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let url = format!("{}/embeddings", self.base_url);

        let mut req = self.client.post(&url).header("content-type", "application/json");

        // Only add authorization if api_key is not empty
        if !self.api_key.is_empty() {
            req = req.header("authorization", format!("Bearer {}", self.api_key));
        }

        let response = req.json(&request).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                EmbeddingError::ConnectionFailed(format!("{}: {}", url, e))
            } else {
                EmbeddingError::ApiError {
                    status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                    body: e.to_string(),
                }
            }
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(EmbeddingError::RateLimited { retry_after });
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(EmbeddingError::InvalidApiKey);
        }

        if status == StatusCode::NOT_FOUND {
            return Err(EmbeddingError::ModelNotFound(self.model.clone()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Output dimensions of commonly served embedding models.
fn known_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" => Some(1024),
        "all-minilm" => Some(384),
        _ => None,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.send_request(texts).await?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "requested {} embeddings, received {}",
                texts.len(),
                vectors.len()
            )));
        }

        if let Some(first) = vectors.first() {
            // Learn the dimension from the first response for unknown models
            let _ = self
                .dimension
                .compare_exchange(0, first.len(), Ordering::Relaxed, Ordering::Relaxed);
        }

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dimensions() {
        let embedder = OpenAiEmbedder::new(
            "http://localhost:11434/v1/",
            "",
            "nomic-embed-text",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(embedder.model_id(), "openai/nomic-embed-text");
        assert_eq!(embedder.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_unknown_model_dimension_can_be_pinned() {
        let embedder = OpenAiEmbedder::new("http://localhost", "", "custom", Duration::from_secs(5))
            .unwrap()
            .with_dimension(42);
        assert_eq!(embedder.dimension(), 42);
    }

    #[test]
    fn test_response_reordered_by_index() {
        let json = r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(json).unwrap();
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        assert_eq!(data[0].embedding, vec![1.0]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_failure() {
        let embedder = OpenAiEmbedder::new("http://127.0.0.1:9", "", "custom", Duration::from_secs(2)).unwrap();
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ConnectionFailed(_)));
    }
}
