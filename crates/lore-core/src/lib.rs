pub mod config;
pub mod knowledge;

pub use config::Config;
pub use knowledge::{Corpus, KnowledgeError, RetrievalService, SearchRequest, SearchResult};
