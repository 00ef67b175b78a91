//! Embedding generation for semantic search.
//!
//! The engine only depends on the [`EmbeddingProvider`] call contract.
//! Two backends ship with the crate:
//!
//! - [`FastEmbedder`]: local ONNX model via fastembed, run on the blocking pool
//! - [`OpenAiEmbedder`]: any OpenAI-compatible `/embeddings` endpoint
//!   (OpenAI, Ollama's `/v1`, vLLM, llama.cpp)
//!
//! [`EmbeddingBackend::from_config`] picks one from [`EmbeddingConfig`].

mod local;
mod openai;

pub use local::FastEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Categorized embedding failures.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Could not reach embedding endpoint: {0}")]
    ConnectionFailed(String),

    #[error("Embedding model not found: {0}")]
    ModelNotFound(String),

    #[error("Embedding API returned error: {status} - {body}")]
    ApiError { status: u16, body: String },

    #[error("Embedding API rejected the API key")]
    InvalidApiKey,

    #[error("Rate limited by embedding API{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("Local embedding inference failed: {0}")]
    Inference(String),

    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

/// Trait for embedding generation.
///
/// Implementations must return exactly one vector per input text, in input
/// order, each of length [`dimension`](EmbeddingProvider::dimension).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of text.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding batch".to_string()))
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Stable identifier of the model, used to fingerprint persisted indices.
    fn model_id(&self) -> &str;

    /// Round-trip a short text to check the provider is reachable and
    /// produces vectors of the advertised dimension.
    async fn validate(&self) -> Result<(), EmbeddingError> {
        let sample = self.embed_query("lore embedding check").await?;
        if sample.len() != self.dimension() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected dimension {}, got {}",
                self.dimension(),
                sample.len()
            )));
        }
        Ok(())
    }
}

/// Embedding backend selection.
#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    /// Local fastembed model.
    FastEmbed {
        model: String,
        cache_dir: std::path::PathBuf,
    },
    /// OpenAI-compatible endpoint (OpenAI, Ollama, vLLM).
    OpenAi {
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    },
}

impl EmbeddingBackend {
    /// Creates a backend description from EmbeddingConfig.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        match config.provider.as_str() {
            "openai" | "openai-compatible" | "ollama" => EmbeddingBackend::OpenAi {
                base_url: config.base_url_or_default(),
                api_key: config.api_key_or_env().unwrap_or_default(),
                model: config.model_or_default(),
                timeout: Duration::from_secs(config.timeout_secs),
            },
            _ => EmbeddingBackend::FastEmbed {
                model: config.model_or_default(),
                cache_dir: config.cache_dir_or_default(),
            },
        }
    }

    /// Instantiate the provider. Loading a local model blocks; call from a
    /// blocking context or before the runtime starts serving.
    pub fn build(self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        match self {
            EmbeddingBackend::FastEmbed { model, cache_dir } => {
                Ok(Arc::new(FastEmbedder::with_model_name(&model, cache_dir)?))
            }
            EmbeddingBackend::OpenAi {
                base_url,
                api_key,
                model,
                timeout,
            } => Ok(Arc::new(OpenAiEmbedder::new(base_url, api_key, model, timeout)?)),
        }
    }
}

/// Batching knobs for [`embed_in_waves`].
#[derive(Debug, Clone, Copy)]
pub struct WaveOptions {
    /// Texts per request.
    pub batch_size: usize,
    /// Requests joined concurrently per wave.
    pub wave_size: usize,
    /// Pause between consecutive waves.
    pub delay: Duration,
}

impl WaveOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            wave_size: config.wave_size.max(1),
            delay: config.batch_delay(),
        }
    }
}

/// Embed `texts` in waves of concurrent batch requests.
///
/// Output order matches input order. `progress` receives the number of texts
/// embedded so far after each wave.
pub async fn embed_in_waves(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    options: WaveOptions,
    mut progress: impl FnMut(usize),
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let batches: Vec<&[String]> = texts.chunks(options.batch_size.max(1)).collect();
    let mut out = Vec::with_capacity(texts.len());

    for (wave_no, wave) in batches.chunks(options.wave_size.max(1)).enumerate() {
        if wave_no > 0 && !options.delay.is_zero() {
            tokio::time::sleep(options.delay).await;
        }

        let results = futures::future::join_all(wave.iter().map(|batch| provider.embed(batch))).await;

        for (batch, result) in wave.iter().zip(results) {
            let vectors = result?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            out.extend(vectors);
        }

        tracing::debug!(embedded = out.len(), total = texts.len(), "embedding wave complete");
        progress(out.len());
    }

    Ok(out)
}
