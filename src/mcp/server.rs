// MCP server implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::mcp::tools;
use crate::query::QueryEngine;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC message
#[derive(Debug, Deserialize)]
struct JsonRpcMessage {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// MCP server capabilities
#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: Value,
}

/// MCP server info
#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
}

/// MCP initialize result
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: &'static str,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// MCP server
pub struct McpServer {
    engine: Arc<QueryEngine>,
}

impl McpServer {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Serve line-delimited JSON-RPC on stdin/stdout until stdin closes
    pub async fn run(self) -> Result<()> {
        info!("Starting MCP server on stdio");

        let mut lines = BufReader::new(io::stdin()).lines();
        let mut stdout = io::stdout();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            debug!("Received: {}", line);

            let (response, shutdown) = self.handle_message(&line).await;
            if let Some(response) = response {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            if shutdown {
                break;
            }
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Handle a JSON-RPC message. Returns the response, if any, and whether to stop serving.
    async fn handle_message(&self, message: &str) -> (Option<Value>, bool) {
        let msg: JsonRpcMessage = match serde_json::from_str(message) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Unparseable message: {}", e);
                return (Some(error_response(Value::Null, -32700, &format!("Parse error: {}", e))), false);
            }
        };

        // Notifications carry no id and never get a response
        let Some(id) = msg.id else {
            debug!("Notification {:?}", msg.method);
            return (None, false);
        };

        match msg.method.as_deref() {
            Some("initialize") => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION,
                    capabilities: ServerCapabilities { tools: json!({}) },
                    server_info: ServerInfo {
                        name: env!("CARGO_PKG_NAME"),
                        version: env!("CARGO_PKG_VERSION"),
                    },
                };
                (Some(success_response(id, json!(result))), false)
            }

            Some("ping") => (Some(success_response(id, json!({}))), false),

            Some("tools/list") => {
                let tools = tools::definitions();
                (Some(success_response(id, json!({ "tools": tools }))), false)
            }

            Some("tools/call") => (Some(self.call_tool(id, msg.params).await), false),

            Some("shutdown") => {
                info!("Received shutdown request");
                (Some(success_response(id, Value::Null)), true)
            }

            _ => (Some(error_response(id, -32601, "Method not found")), false),
        }
    }

    async fn call_tool(&self, id: Value, params: Value) -> Value {
        let Some(name) = params.get("name").and_then(Value::as_str).map(str::to_string) else {
            return error_response(id, -32602, "Missing tool name");
        };
        if !tools::is_known(&name) {
            return error_response(id, -32602, &format!("Unknown tool: {}", name));
        }
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        let engine = Arc::clone(&self.engine);
        match tokio::task::spawn_blocking(move || tools::call(&engine, &name, args)).await {
            Ok(result) => success_response(id, result),
            Err(e) => {
                error!("Tool task failed: {}", e);
                error_response(id, -32603, &format!("Internal error: {}", e))
            }
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn server() -> (tempfile::TempDir, McpServer) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.project.root = dir.path().to_string_lossy().to_string();
        (dir, McpServer::new(QueryEngine::new(config)))
    }

    #[tokio::test]
    async fn test_initialize() {
        let (_dir, server) = server();
        let (response, shutdown) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await;
        let response = response.unwrap();
        assert!(!shutdown);
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "prism");
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let (_dir, server) = server();
        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let (_dir, server) = server();
        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await;
        let tools = response.unwrap()["result"]["tools"].as_array().unwrap().len();
        assert_eq!(tools, 9);
    }

    #[tokio::test]
    async fn test_tools_call_reports_tool_errors_in_result() {
        let (_dir, server) = server();
        let (response, _) = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"prism_index_stats","arguments":{}}}"#,
            )
            .await;
        let response = response.unwrap();
        assert_eq!(response["result"]["isError"], true);
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let (_dir, server) = server();

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"nope"}}"#)
            .await;
        assert_eq!(response.unwrap()["error"]["code"], -32602);

        let (response, _) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#)
            .await;
        assert_eq!(response.unwrap()["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_parse_error_and_shutdown() {
        let (_dir, server) = server();

        let (response, _) = server.handle_message("{not json").await;
        assert_eq!(response.unwrap()["error"]["code"], -32700);

        let (response, shutdown) = server
            .handle_message(r#"{"jsonrpc":"2.0","id":5,"method":"shutdown"}"#)
            .await;
        assert!(response.is_some());
        assert!(shutdown);
    }
}
