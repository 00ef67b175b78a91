//! JSON-RPC method handlers.
//!
//! Handlers are kept thin: argument validation and shaping happen here,
//! retrieval is delegated to [`RetrievalService`].

use std::sync::Arc;

use serde_json::{json, Value};

use lore_core::config::{MAX_TOOL_RESULT_LIMIT, PROTOCOL_VERSION, SERVER_NAME};
use lore_core::knowledge::{Corpus, KnowledgeError, RetrievalService, SearchRequest};

use super::models::{
    error_codes, JsonRpcId, JsonRpcRequest, JsonRpcResponse, ResultDto, SearchArgs, SearchToolResponse,
    StatsToolResponse, ToolCallParams,
};
use super::tools::{self, Tool};

/// Dispatches decoded requests.
pub struct ToolServer {
    service: Arc<RetrievalService>,
}

impl ToolServer {
    pub fn new(service: Arc<RetrievalService>) -> Self {
        Self { service }
    }

    /// Handle one raw line. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable request");
                return Some(JsonRpcResponse::error(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };
        self.handle(request).await
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                error_codes::INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        tracing::debug!(method = %request.method, "handling request");

        if id.is_none() {
            // Notifications get no reply
            return None;
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(id, request.params).await,
            other => JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Option<JsonRpcId>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, format!("Invalid params: {}", e))
            }
            None => return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, "Missing params"),
        };

        let Some(tool) = Tool::parse(&params.name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            );
        };

        let outcome = match tool {
            Tool::Search(corpus) => {
                let args: SearchArgs = match params.arguments.map(serde_json::from_value).transpose() {
                    Ok(args) => args.unwrap_or_default(),
                    Err(e) => {
                        return JsonRpcResponse::error(
                            id,
                            error_codes::INVALID_PARAMS,
                            format!("Invalid arguments: {}", e),
                        )
                    }
                };
                self.search(corpus, args).await
            }
            Tool::Stats(corpus) => self
                .service
                .corpus_stats(corpus)
                .await
                .map(|stats| json!(StatsToolResponse::from(stats))),
        };

        match outcome {
            Ok(body) => JsonRpcResponse::success(id, tool_content(&body)),
            Err(KnowledgeError::InvalidRequest(message)) => {
                JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message)
            }
            Err(e) => {
                tracing::error!(tool = %params.name, error = %e, "tool call failed");
                JsonRpcResponse::error(id, error_codes::INTERNAL_ERROR, e.to_string())
            }
        }
    }

    async fn search(&self, corpus: Corpus, args: SearchArgs) -> Result<Value, KnowledgeError> {
        let query = args
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| KnowledgeError::InvalidRequest("Missing required argument: query".to_string()))?;

        let mut request = SearchRequest::new(query).corpus(corpus);
        if let Some(limit) = args.limit.filter(|l| *l > 0) {
            request = request.limit(limit.min(MAX_TOOL_RESULT_LIMIT));
        }
        if let Some(type_filter) = args.type_filter {
            request = request.type_filter(type_filter);
        }
        if let Some(expand) = args.expand {
            request = request.expand(expand);
        }

        let response = self.service.search(request).await?;
        let results: Vec<ResultDto> = response.results.into_iter().map(ResultDto::from).collect();
        Ok(json!(SearchToolResponse {
            query: response.query,
            result_count: results.len(),
            results,
        }))
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Wrap a structured body as tool text content.
fn tool_content(body: &Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": body.to_string() }],
        "structuredContent": body,
    })
}
