//! Hybrid knowledge retrieval over a typed graph and per-corpus vector
//! indices.
//!
//! # Components
//!
//! - [`GraphStore`] - SQLite node/edge store with versioned migrations
//! - [`QueryRouter`] - ordered pattern rules choosing graph, vector or both
//! - [`GraphTraversal`] - named multi-hop queries over the edge vocabulary
//! - [`VectorIndex`] - proximity-graph ANN index, memory-mapped when loaded
//! - [`HybridScorer`] - reciprocal rank fusion and deduplication
//! - [`RetrievalService`] - routing, search, gating and cross-corpus expansion
//! - [`IndexBuilder`] - embeds a corpus and rebuilds its index
//!
//! # Storage
//!
//! One SQLite file holds every corpus's nodes and edges. Each corpus has
//! its own index file under the vectors directory, addressed by the
//! node's `chunk_index`.
//!
//! # Example
//!
//! ```ignore
//! use lore_core::config::Config;
//! use lore_core::knowledge::{Corpus, RetrievalService, SearchRequest};
//!
//! let service = RetrievalService::open(&Config::load()?).await?;
//! let response = service
//!     .search(SearchRequest::new("how to craft torch").corpus(Corpus::Gamedata))
//!     .await?;
//! ```

mod builder;
mod cancel;
mod db;
pub mod embedder;
mod error;
pub mod expansion;
pub mod intent;
pub mod migrations;
pub mod models;
pub mod ontology;
pub mod router;
mod scorer;
mod service;
mod traversal;
pub mod vector;

pub use builder::{BuildReport, IndexBuilder};
pub use cancel::CancellationToken;
pub use db::GraphStore;
pub use embedder::{EmbeddingBackend, EmbeddingError, EmbeddingProvider};
pub use error::KnowledgeError;
pub use models::{CorpusStats, Edge, Node, ResultSource, RouteResult, SearchResult, Strategy};
pub use ontology::{Corpus, Direction, EdgeCategory, EdgeType};
pub use router::{EntityLookup, QueryRouter};
pub use scorer::{deduplicate, sort_by_score, HybridScorer};
pub use service::{RetrievalService, SearchRequest, SearchResponse};
pub use traversal::{GraphTraversal, GRAPH_SCORE, PARTIAL_NAME_SCORE};
pub use vector::{IndexParams, VectorIndex};
