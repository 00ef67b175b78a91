//! Transient retrieval types: routes, ranked results and corpus statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::Node;
use crate::knowledge::ontology::{Corpus, EdgeType};

/// How a query is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Graph traversal only.
    Graph,
    /// ANN search over embeddings only.
    Vector,
    /// Both, fused by reciprocal rank.
    Hybrid,
}

/// Output of the query router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub strategy: Strategy,
    pub entity_name: Option<String>,
    pub relation: Option<EdgeType>,
}

impl RouteResult {
    pub fn vector() -> Self {
        Self {
            strategy: Strategy::Vector,
            entity_name: None,
            relation: None,
        }
    }

    pub fn new(strategy: Strategy, entity_name: impl Into<String>, relation: Option<EdgeType>) -> Self {
        Self {
            strategy,
            entity_name: Some(entity_name.into()),
            relation,
        }
    }
}

/// Which retrieval path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultSource {
    Vector,
    Graph,
    Hybrid,
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResultSource::Vector => "VECTOR",
            ResultSource::Graph => "GRAPH",
            ResultSource::Hybrid => "HYBRID",
        })
    }
}

/// A ranked, provenance-annotated hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub node_id: String,
    pub display_name: String,
    pub node_type: String,
    pub snippet: String,
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    /// Higher is better. Fused results carry reciprocal-rank sums.
    pub score: f32,
    pub source: ResultSource,
    pub data_type: Option<String>,
    pub corpus: Corpus,
    /// Display name of the seed a bridged result was reached from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridged_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_edge_type: Option<EdgeType>,
    /// Ids of nodes this seed bridged to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connected_node_ids: Vec<String>,
    /// Seed that produced an expansion result. Internal only.
    #[serde(skip)]
    pub expanded_from_node_id: Option<String>,
}

impl SearchResult {
    /// Project a node row into a result.
    pub fn from_node(node: &Node, score: f32, source: ResultSource, snippet_chars: usize) -> Self {
        let text = if node.content.is_empty() {
            node.embedding_text.as_deref().unwrap_or("")
        } else {
            node.content.as_str()
        };

        Self {
            node_id: node.id.clone(),
            display_name: node.display_name.clone(),
            node_type: node.node_type.clone(),
            snippet: truncate_chars(text, snippet_chars),
            file_path: node.file_path.clone(),
            line_start: node.line_start,
            score,
            source,
            data_type: node.data_type.clone(),
            corpus: node.corpus,
            bridged_from: None,
            bridge_edge_type: None,
            connected_node_ids: Vec::new(),
            expanded_from_node_id: None,
        }
    }

    /// Whether this result satisfies a caller-supplied type filter.
    ///
    /// The filter matches either the data type or the node type,
    /// ignoring case.
    pub fn matches_type(&self, filter: &str) -> bool {
        self.data_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(filter))
            || self.node_type.eq_ignore_ascii_case(filter)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", text[..idx].trim_end()),
        None => text.to_string(),
    }
}

/// Per-corpus statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusStats {
    pub corpus: Corpus,
    pub node_count: u64,
    /// node_type -> count; for gamedata also `data_type:<name>` -> count.
    pub type_breakdown: BTreeMap<String, u64>,
    /// Edges whose source node is in the corpus.
    pub edge_count: u64,
    pub vector_index_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node::new("gd:torch", "GameData", "Torch", Corpus::Gamedata)
            .with_data_type("item")
            .with_content("A wooden torch that lights the way")
    }

    #[test]
    fn test_expanded_from_never_serialized() {
        let mut result = SearchResult::from_node(&node(), 0.5, ResultSource::Graph, 100);
        result.expanded_from_node_id = Some("seed".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("expandedFromNodeId").is_none());
        assert_eq!(json["source"], "GRAPH");
        assert_eq!(json["nodeId"], "gd:torch");
        assert!(json.get("bridgedFrom").is_none());
    }

    #[test]
    fn test_snippet_truncated_on_char_boundary() {
        let n = node().with_content("héllo wörld");
        let result = SearchResult::from_node(&n, 1.0, ResultSource::Vector, 5);
        assert_eq!(result.snippet, "héllo...");
    }

    #[test]
    fn test_matches_type_checks_both_kinds() {
        let result = SearchResult::from_node(&node(), 1.0, ResultSource::Vector, 10);
        assert!(result.matches_type("ITEM"));
        assert!(result.matches_type("gamedata"));
        assert!(!result.matches_type("npc"));
    }
}
