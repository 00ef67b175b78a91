//! Knowledge engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the knowledge engine.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A schema migration step failed.
    #[error("Migration to schema version {version} failed: {message}")]
    Migration { version: u32, message: String },

    /// Embedding generation error.
    #[error("Embedding error: {0}")]
    Embedding(#[from] super::embedder::EmbeddingError),

    /// Vector index build, persistence or query error.
    #[error("Vector index error: {0}")]
    Index(String),

    /// A vector index was queried before it was built or loaded.
    #[error("Vector index queried before build or load")]
    IndexNotLoaded,

    /// IO error.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was malformed (missing or invalid parameter).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Corpus identifier outside the fixed corpus set.
    #[error("Unknown corpus: {0}")]
    UnknownCorpus(String),

    /// Edge type outside the closed relation vocabulary.
    #[error("Unknown edge type: {0}")]
    UnknownEdgeType(String),
}

impl KnowledgeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        KnowledgeError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for KnowledgeError {
    fn from(err: std::io::Error) -> Self {
        KnowledgeError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<rusqlite::Error> for KnowledgeError {
    fn from(err: rusqlite::Error) -> Self {
        KnowledgeError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for KnowledgeError {
    fn from(err: serde_json::Error) -> Self {
        KnowledgeError::Database(format!("metadata encoding: {}", err))
    }
}
