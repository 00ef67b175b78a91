//! Node and edge rows of the knowledge graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::knowledge::ontology::{Corpus, EdgeType};

/// A typed entity in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Globally unique identifier, stable across re-indexing.
    pub id: String,
    /// Structural kind ("JavaClass", "GameData", "ui").
    pub node_type: String,
    /// Name shown to users; may be fully qualified.
    pub display_name: String,
    /// Corpus this node belongs to.
    pub corpus: Corpus,
    /// Fine-grained subtype ("item", "recipe", "npc").
    pub data_type: Option<String>,
    /// Source file path.
    pub file_path: Option<String>,
    /// Start line number.
    pub line_start: Option<u32>,
    /// End line number.
    pub line_end: Option<u32>,
    /// Raw source or text.
    pub content: String,
    /// Text sent to the embedding model.
    pub embedding_text: Option<String>,
    /// Ordinal position in the corpus vector index.
    pub chunk_index: Option<u32>,
    /// File that produced this node during ingestion.
    pub owning_file: Option<String>,
    /// Opaque key-value bag.
    pub metadata: Value,
}

impl Node {
    /// Create a new node with empty content.
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        display_name: impl Into<String>,
        corpus: Corpus,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            display_name: display_name.into(),
            corpus,
            data_type: None,
            file_path: None,
            line_start: None,
            line_end: None,
            content: String::new(),
            embedding_text: None,
            chunk_index: None,
            owning_file: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Set the source location.
    pub fn with_location(mut self, file_path: impl Into<String>, line_start: u32, line_end: u32) -> Self {
        self.file_path = Some(file_path.into());
        self.line_start = Some(line_start);
        self.line_end = Some(line_end);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Mark the node as embedded at `chunk_index` with the given text.
    pub fn with_embedding(mut self, chunk_index: u32, embedding_text: impl Into<String>) -> Self {
        self.chunk_index = Some(chunk_index);
        self.embedding_text = Some(embedding_text.into());
        self
    }

    pub fn with_owning_file(mut self, owning_file: impl Into<String>) -> Self {
        self.owning_file = Some(owning_file.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A typed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    /// File whose ingestion produced this edge.
    pub owning_file_id: Option<String>,
    /// False when the target has no node row (virtual target).
    pub target_resolved: bool,
    pub metadata: Value,
}

impl Edge {
    /// Create a resolved edge.
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            owning_file_id: None,
            target_resolved: true,
            metadata: Value::Object(Default::default()),
        }
    }

    /// Mark the target as virtual.
    pub fn unresolved(mut self) -> Self {
        self.target_resolved = false;
        self
    }

    pub fn with_owning_file(mut self, owning_file_id: impl Into<String>) -> Self {
        self.owning_file_id = Some(owning_file_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
