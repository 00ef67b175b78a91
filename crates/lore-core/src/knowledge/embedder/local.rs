//! Local embedding backend using fastembed.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbeddingError, EmbeddingProvider};

/// FastEmbed-based embedder. Inference runs on tokio's blocking pool.
pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
    model_id: String,
}

impl FastEmbedder {
    /// Create an embedder from a configured model name such as
    /// `BGESmallENV15` or `BAAI/bge-small-en-v1.5`.
    pub fn with_model_name(name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model = parse_model(name).ok_or_else(|| EmbeddingError::ModelNotFound(name.to_string()))?;
        Self::with_model_and_cache(model, cache_dir)
    }

    /// Create a new FastEmbed embedder with a specific model and cache directory.
    pub fn with_model_and_cache(
        model: EmbeddingModel,
        cache_dir: PathBuf,
    ) -> Result<Self, EmbeddingError> {
        let model_id = format!("fastembed/{:?}", model);

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::Inference(format!("Failed to create cache directory: {}", e))
        })?;

        let text_embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelNotFound(e.to_string()))?;

        // Get dimension from a test embedding
        let sample = text_embedding
            .embed(vec!["dimension check"], None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InvalidResponse("model returned no vector for the dimension check".into()))?;

        tracing::info!(model = %model_id, dimension, "loaded local embedding model");

        Ok(Self {
            model: Arc::new(text_embedding),
            dimension,
            model_id,
        })
    }
}

fn parse_model(name: &str) -> Option<EmbeddingModel> {
    match name.trim().to_ascii_lowercase().as_str() {
        "bgesmallenv15" | "baai/bge-small-en-v1.5" | "bge-small-en-v1.5" => {
            Some(EmbeddingModel::BGESmallENV15)
        }
        "bgebaseenv15" | "baai/bge-base-en-v1.5" | "bge-base-en-v1.5" => {
            Some(EmbeddingModel::BGEBaseENV15)
        }
        "allminilml6v2" | "sentence-transformers/all-minilm-l6-v2" | "all-minilm-l6-v2" => {
            Some(EmbeddingModel::AllMiniLML6V2)
        }
        "nomicembedtextv15" | "nomic-ai/nomic-embed-text-v1.5" | "nomic-embed-text-v1.5" => {
            Some(EmbeddingModel::NomicEmbedTextV15)
        }
        _ => None,
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let owned = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            model
                .embed(owned, None)
                .map_err(|e| EmbeddingError::Inference(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("embedding task aborted: {}", e)))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_aliases() {
        assert!(matches!(parse_model("BGESmallENV15"), Some(EmbeddingModel::BGESmallENV15)));
        assert!(matches!(
            parse_model("BAAI/bge-small-en-v1.5"),
            Some(EmbeddingModel::BGESmallENV15)
        ));
        assert!(parse_model("word2vec").is_none());
    }

    #[tokio::test]
    async fn test_embedder_dimension() {
        // This test requires downloading the model, so we skip it in CI
        if std::env::var("CI").is_ok() || std::env::var("LORE_OFFLINE").is_ok() {
            return;
        }

        let cache = tempfile::TempDir::new().unwrap();
        let Ok(embedder) = FastEmbedder::with_model_name("BGESmallENV15", cache.path().to_path_buf()) else {
            // No network in this environment
            return;
        };
        assert_eq!(embedder.dimension(), 384);
        let vectors = embedder.embed(&["fn main() {}".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 384);
    }
}
