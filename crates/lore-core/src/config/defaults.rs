//! Default values for Lore configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = ".lore";

/// Default graph store file name, relative to the data directory.
pub const DEFAULT_DB_FILE: &str = "knowledge.db";

/// Default vector index subdirectory, relative to the data directory.
pub const DEFAULT_VECTORS_DIR: &str = "vectors";

/// File extension of persisted vector indices.
pub const VECTOR_INDEX_EXTENSION: &str = "lvix";

/// Number of read-only connections kept open next to the writer.
pub const DEFAULT_READ_POOL_SIZE: usize = 4;

/// SQLite busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Embedding Defaults
// ============================================================================

/// Default embedding provider.
pub const DEFAULT_EMBEDDING_PROVIDER: &str = "fastembed";

/// Default local fastembed model.
pub const DEFAULT_FASTEMBED_MODEL: &str = "BGESmallENV15";

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI embedding model.
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";

// Ollama defaults
/// Default Ollama API URL (OpenAI-compatible endpoint).
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama embedding model.
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Texts sent per embedding request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// Embedding requests in flight per wave.
pub const DEFAULT_EMBEDDING_WAVE_SIZE: usize = 10;

/// Pause between waves, in milliseconds.
pub const DEFAULT_EMBEDDING_BATCH_DELAY_MS: u64 = 0;

/// HTTP timeout for remote embedding calls, in seconds.
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Vector Index Defaults
// ============================================================================

/// Maximum out-degree of a node in the proximity graph.
pub const DEFAULT_MAX_DEGREE: usize = 16;

/// Beam width used while inserting nodes.
pub const DEFAULT_CONSTRUCTION_BEAM: usize = 100;

/// Minimum beam width used at query time.
pub const DEFAULT_SEARCH_BEAM: usize = 64;

// ============================================================================
// Retrieval Defaults
// ============================================================================

/// Results returned per corpus when the caller gives no limit.
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// Upper bound on the per-call limit accepted by the tool surface.
pub const MAX_TOOL_RESULT_LIMIT: usize = 20;

/// Reciprocal rank fusion constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Score a vector-sourced gamedata hit must reach when the query shows no
/// gamedata intent.
pub const DEFAULT_GAMEDATA_UNINTENDED_FLOOR: f32 = 0.8;

/// Minimum seed score for cross-corpus expansion.
pub const DEFAULT_EXPANSION_MIN_SEED_SCORE: f32 = 0.01;

/// Multiplier applied to a seed's score for bridged results.
pub const DEFAULT_EXPANSION_DISCOUNT: f32 = 0.8;

/// Bridged results below this score are dropped.
pub const DEFAULT_EXPANSION_MIN_SCORE: f32 = 0.01;

/// Bridged results kept per seed.
pub const DEFAULT_EXPANSION_PER_SEED: usize = 3;

/// Seeds considered per corpus.
pub const DEFAULT_EXPANSION_MAX_SEEDS: usize = 5;

/// Maximum snippet length in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 400;

// ============================================================================
// Server Defaults
// ============================================================================

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "lore";

/// Protocol version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
