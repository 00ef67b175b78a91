//! Tool catalogue: one search tool and one stats tool per corpus.

use serde_json::json;

use lore_core::config::MAX_TOOL_RESULT_LIMIT;
use lore_core::knowledge::Corpus;

use super::models::ToolDefinition;

/// A resolved tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search(Corpus),
    Stats(Corpus),
}

impl Tool {
    /// Parse `search_<corpus>` or `<corpus>_stats`.
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(corpus) = name.strip_prefix("search_") {
            return corpus.parse::<Corpus>().ok().filter(|c| c.as_str() == corpus).map(Tool::Search);
        }
        if let Some(corpus) = name.strip_suffix("_stats") {
            return corpus.parse::<Corpus>().ok().filter(|c| c.as_str() == corpus).map(Tool::Stats);
        }
        None
    }

    pub fn name(&self) -> String {
        match self {
            Tool::Search(corpus) => format!("search_{}", corpus.as_str()),
            Tool::Stats(corpus) => format!("{}_stats", corpus.as_str()),
        }
    }
}

/// Every tool the server advertises, in a fixed order.
pub fn definitions() -> Vec<ToolDefinition> {
    let mut tools = Vec::with_capacity(Corpus::ALL.len() * 2);
    for corpus in Corpus::ALL {
        tools.push(search_definition(corpus));
    }
    for corpus in Corpus::ALL {
        tools.push(stats_definition(corpus));
    }
    tools
}

fn search_definition(corpus: Corpus) -> ToolDefinition {
    ToolDefinition {
        name: Tool::Search(corpus).name(),
        description: format!(
            "Search the {} corpus. Routes structural and game-data questions through the knowledge graph \
             and everything else through semantic vector search.",
            corpus.display_name()
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language question or entity name"
                },
                "typeFilter": {
                    "type": "string",
                    "description": "Only return results of this data type or node type"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TOOL_RESULT_LIMIT,
                    "description": "Maximum direct results"
                },
                "expand": {
                    "type": "boolean",
                    "description": "Follow cross-corpus bridges from strong results"
                }
            },
            "required": ["query"]
        }),
    }
}

fn stats_definition(corpus: Corpus) -> ToolDefinition {
    ToolDefinition {
        name: Tool::Stats(corpus).name(),
        description: format!(
            "Node, type and edge counts for the {} corpus, and whether its vector index is loaded.",
            corpus.display_name()
        ),
        input_schema: json!({ "type": "object", "properties": {} }),
    }
}
