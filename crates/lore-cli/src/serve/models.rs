//! Wire types for the stdio tool server.
//!
//! JSON-RPC 2.0 envelopes plus the DTOs returned by each tool. Field names
//! are camelCase on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lore_core::knowledge::{CorpusStats, SearchResult};

// =============================================================================
// JSON-RPC Envelopes
// =============================================================================

/// JSON-RPC 2.0 request. A missing `id` marks a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// Request id: string or number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// =============================================================================
// Tool Calls
// =============================================================================

/// Advertised tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// `tools/call` params.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Arguments of a `search_<corpus>` call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub type_filter: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub expand: Option<bool>,
}

// =============================================================================
// Tool Results
// =============================================================================

/// Body of a search tool result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchToolResponse {
    pub query: String,
    pub result_count: usize,
    pub results: Vec<ResultDto>,
}

/// One result as seen by the host.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultDto {
    pub id: String,
    pub display_name: String,
    pub snippet: String,
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    pub score: f32,
    pub source: String,
    pub corpus: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridged_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_edge_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub connected_node_ids: Vec<String>,
}

impl From<SearchResult> for ResultDto {
    fn from(r: SearchResult) -> Self {
        Self {
            id: r.node_id,
            display_name: r.display_name,
            snippet: r.snippet,
            file_path: r.file_path,
            line_start: r.line_start,
            score: r.score,
            source: r.source.to_string(),
            corpus: r.corpus.to_string(),
            data_type: r.data_type,
            bridged_from: r.bridged_from,
            bridge_edge_type: r.bridge_edge_type.map(|e| e.to_string()),
            connected_node_ids: r.connected_node_ids,
        }
    }
}

/// Body of a `<corpus>_stats` tool result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsToolResponse {
    pub corpus: String,
    pub node_count: u64,
    pub type_breakdown: BTreeMap<String, u64>,
    pub edge_count: u64,
    pub vector_index_loaded: bool,
}

impl From<CorpusStats> for StatsToolResponse {
    fn from(s: CorpusStats) -> Self {
        Self {
            corpus: s.corpus.to_string(),
            node_count: s.node_count,
            type_breakdown: s.type_breakdown,
            edge_count: s.edge_count,
            vector_index_loaded: s.vector_index_loaded,
        }
    }
}
