//! Configuration management for Lore.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `lore.toml` file
//! 3. User config `~/.config/lore/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::knowledge::Corpus;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the graph store and vector indices live.
    pub storage: StorageConfig,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Vector index construction and query parameters.
    pub index: IndexConfig,

    /// Retrieval tuning constants.
    pub retrieval: RetrievalConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./lore.toml` (project local)
    /// 2. `~/.config/lore/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("lore.toml").exists() {
            return Self::from_file("lore.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("lore").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("LORE_DATA_DIR") {
            self.storage.data_dir = dir;
        }

        if let Ok(provider) = std::env::var("LORE_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("LORE_EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        if let Ok(url) = std::env::var("LORE_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("LORE_EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(key);
        }
        if let Ok(size) = std::env::var("LORE_EMBEDDING_BATCH_SIZE") {
            if let Ok(n) = size.parse() {
                self.embedding.batch_size = n;
            }
        }
    }

    /// Reject values that would make the engine misbehave silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be > 0".into()));
        }
        if self.embedding.wave_size == 0 {
            return Err(ConfigError::Invalid("embedding.wave_size must be > 0".into()));
        }
        if self.index.max_degree < 2 {
            return Err(ConfigError::Invalid("index.max_degree must be >= 2".into()));
        }
        if self.retrieval.rrf_k < 0.0 {
            return Err(ConfigError::Invalid("retrieval.rrf_k must be >= 0".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.expansion_discount) {
            return Err(ConfigError::Invalid(
                "retrieval.expansion_discount must be within 0..=1".into(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for lore data (default: ".lore").
    pub data_dir: String,

    /// Graph store file name.
    pub db_file: String,

    /// Vector index subdirectory name.
    pub vectors_dir: String,

    /// Read connections opened next to the writer.
    pub read_pool_size: usize,

    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            db_file: DEFAULT_DB_FILE.to_string(),
            vectors_dir: DEFAULT_VECTORS_DIR.to_string(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StorageConfig {
    /// Get the full path to the graph store.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.db_file)
    }

    /// Get the full path to the vector index directory.
    pub fn vectors_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.vectors_dir)
    }

    /// Get the full path to a corpus's vector index file.
    pub fn index_path(&self, corpus: Corpus) -> PathBuf {
        self.vectors_path()
            .join(format!("{}.{}", corpus.as_str(), VECTOR_INDEX_EXTENSION))
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name: "fastembed", "openai", "ollama", or "openai-compatible".
    pub provider: String,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Base URL for API (for remote providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Texts sent per request.
    pub batch_size: usize,

    /// Requests in flight per wave.
    pub wave_size: usize,

    /// Pause between waves, in milliseconds.
    pub batch_delay_ms: u64,

    /// HTTP timeout for remote providers, in seconds.
    pub timeout_secs: u64,

    /// Model cache directory for local models (default: `~/.lore/cache`).
    pub cache_dir: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_EMBEDDING_PROVIDER.to_string(),
            model: None,
            base_url: None,
            api_key: None,
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            wave_size: DEFAULT_EMBEDDING_WAVE_SIZE,
            batch_delay_ms: DEFAULT_EMBEDDING_BATCH_DELAY_MS,
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
            cache_dir: None,
        }
    }
}

impl EmbeddingConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "ollama" => DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string(),
            "openai" | "openai-compatible" => DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            _ => DEFAULT_FASTEMBED_MODEL.to_string(),
        })
    }

    /// Get the base URL, falling back to provider defaults.
    pub fn base_url_or_default(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| match self.provider.as_str() {
            "ollama" => DEFAULT_OLLAMA_URL.to_string(),
            _ => DEFAULT_OPENAI_URL.to_string(),
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("LORE_EMBEDDING_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "openai" | "openai-compatible" => std::env::var("OPENAI_API_KEY").ok(),
                _ => None,
            })
    }

    /// Get the model cache directory: configured, or `~/.lore/cache/`.
    pub fn cache_dir_or_default(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATA_DIR)
                .join("cache"),
        }
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Vector index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum neighbors kept per node.
    pub max_degree: usize,

    /// Beam width while building.
    pub construction_beam: usize,

    /// Minimum beam width while querying.
    pub search_beam: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_degree: DEFAULT_MAX_DEGREE,
            construction_beam: DEFAULT_CONSTRUCTION_BEAM,
            search_beam: DEFAULT_SEARCH_BEAM,
        }
    }
}

/// Retrieval tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results per corpus when the caller gives no limit.
    pub default_limit: usize,

    /// Reciprocal rank fusion constant.
    pub rrf_k: f32,

    /// Floor for vector-sourced gamedata hits on queries without gamedata intent.
    pub gamedata_unintended_floor: f32,

    /// Whether cross-corpus expansion runs when the caller does not say.
    pub expand_by_default: bool,

    /// Minimum seed score for expansion.
    pub expansion_min_seed_score: f32,

    /// Score multiplier for bridged results.
    pub expansion_discount: f32,

    /// Bridged results under this score are dropped.
    pub expansion_min_score: f32,

    /// Bridged results kept per seed.
    pub expansion_per_seed: usize,

    /// Seeds considered per corpus.
    pub expansion_max_seeds: usize,

    /// Snippet length in characters.
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_RESULT_LIMIT,
            rrf_k: DEFAULT_RRF_K,
            gamedata_unintended_floor: DEFAULT_GAMEDATA_UNINTENDED_FLOOR,
            expand_by_default: true,
            expansion_min_seed_score: DEFAULT_EXPANSION_MIN_SEED_SCORE,
            expansion_discount: DEFAULT_EXPANSION_DISCOUNT,
            expansion_min_score: DEFAULT_EXPANSION_MIN_SCORE,
            expansion_per_seed: DEFAULT_EXPANSION_PER_SEED,
            expansion_max_seeds: DEFAULT_EXPANSION_MAX_SEEDS,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(config.embedding.provider, DEFAULT_EMBEDDING_PROVIDER);
        assert_eq!(config.index.max_degree, DEFAULT_MAX_DEGREE);
        assert_eq!(config.retrieval.rrf_k, DEFAULT_RRF_K);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[storage]"));
        assert!(toml_str.contains("[embedding]"));
        assert!(toml_str.contains("[index]"));
        assert!(toml_str.contains("[retrieval]"));
    }

    #[test]
    fn test_index_path_per_corpus() {
        let storage = StorageConfig {
            data_dir: "/tmp/lore".to_string(),
            ..Default::default()
        };
        assert_eq!(
            storage.index_path(Corpus::Gamedata),
            PathBuf::from("/tmp/lore/vectors/gamedata.lvix")
        );
        assert_eq!(storage.db_path(), PathBuf::from("/tmp/lore/knowledge.db"));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::default();
        config.embedding.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
