//! Stdio tool server.
//!
//! Newline-delimited JSON-RPC 2.0 on stdin/stdout. Stdout carries protocol
//! frames only; logs go to stderr.
//!
//! # Module Structure
//!
//! - `handlers` - method dispatch and tool calls
//! - `models` - JSON-RPC envelopes and tool DTOs
//! - `tools` - tool catalogue and name parsing

mod handlers;
mod models;
mod tools;

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use lore_core::knowledge::RetrievalService;

pub use handlers::ToolServer;

/// Serve requests from stdin until it closes.
pub async fn run(service: Arc<RetrievalService>) -> std::io::Result<()> {
    let server = ToolServer::new(service);
    let reader = BufReader::new(tokio::io::stdin());
    let writer = tokio::io::BufWriter::new(tokio::io::stdout());

    tracing::info!("tool server ready on stdio");
    serve_lines(&server, reader, writer).await?;
    tracing::info!("stdin closed, shutting down");
    Ok(())
}

/// Read one request per line and write one response per line.
pub async fn serve_lines<R, W>(server: &ToolServer, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(response) = server.handle_line(trimmed).await else {
            continue;
        };

        let frame = serde_json::to_string(&response)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lore_core::config::Config;
    use lore_core::knowledge::{EmbeddingError, EmbeddingProvider, GraphStore};

    struct Offline;

    #[async_trait]
    impl EmbeddingProvider for Offline {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ConnectionFailed("offline".to_string()))
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_id(&self) -> &str {
            "offline"
        }
    }

    #[tokio::test]
    async fn test_one_response_per_request_line() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let service = RetrievalService::new(store, Arc::new(Offline), &Config::default()).unwrap();
        let server = ToolServer::new(Arc::new(service));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"search_docs","arguments":{"query":"setup"}}}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve_lines(&server, input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        // Embedding offline: vector search degrades to no results
        assert_eq!(lines[1]["result"]["structuredContent"]["resultCount"], 0);
    }
}
