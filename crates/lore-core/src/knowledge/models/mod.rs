//! Data models for the knowledge graph.

mod node;
mod result;

pub use node::{Edge, Node};
pub use result::{CorpusStats, ResultSource, RouteResult, SearchResult, Strategy};
