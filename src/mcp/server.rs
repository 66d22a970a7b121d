//! MCP server with stdio transport
//!
//! Implements a newline-delimited JSON-RPC 2.0 server. Each request is
//! handled on its own task so a slow tool never holds up the others;
//! responses funnel through one writer task and may leave in any order.

use super::dispatcher::Dispatcher;
use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use crate::error::{Result, SolveItError};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Sent if a response cannot be serialized
const FALLBACK_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

/// MCP server that handles JSON-RPC requests over stdio
pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serve stdin/stdout until EOF
    pub async fn run(&self) -> Result<()> {
        info!("MCP server started, listening on stdin...");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
        info!("MCP server shutting down");
        Ok(())
    }

    /// Serve any line-oriented reader/writer pair.
    ///
    /// Returns once the input is exhausted and every in-flight request has
    /// written its response.
    pub async fn serve<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(write_responses(rx, output));

        let mut lines = BufReader::new(input).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Received EOF, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Failed to read from stdin: {}", e);
                    break;
                }
            };

            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = handle_message(&dispatcher, &line).await {
                    let encoded = serde_json::to_string(&response).unwrap_or_else(|e| {
                        error!("Failed to serialize response: {}", e);
                        FALLBACK_RESPONSE.to_string()
                    });
                    if tx.send(encoded).is_err() {
                        warn!("Response dropped; writer has stopped");
                    }
                }
            });
        }

        // The writer finishes once the last in-flight task drops its sender
        drop(tx);
        writer
            .await
            .map_err(|e| SolveItError::Other(format!("response writer failed: {}", e)))?
    }
}

async fn write_responses<W>(mut rx: mpsc::UnboundedReceiver<String>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        debug!("Sending response: {}", line);
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

/// Process one line of input; `None` for notifications
pub async fn handle_message(dispatcher: &Dispatcher, line: &str) -> Option<JsonRpcResponse> {
    let raw: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                None,
                JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
            ));
        }
    };

    let id = raw.get("id").cloned().filter(|v| !v.is_null());
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
            ));
        }
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::error(
            request.id,
            JsonRpcError::invalid_request("jsonrpc must be '2.0'"),
        ));
    }

    if request.is_notification() {
        debug!(method = %request.method, "Notification received");
        return None;
    }

    let response = match request.method.as_str() {
        "initialize" => handle_initialize(request),
        "ping" => JsonRpcResponse::success(request.id, json!({})),
        "tools/list" => handle_tools_list(dispatcher, request),
        "tools/call" => handle_tools_call(dispatcher, request).await,
        _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
    };
    Some(response)
}

fn handle_initialize(request: JsonRpcRequest) -> JsonRpcResponse {
    debug!("Handling initialize");

    JsonRpcResponse::success(
        request.id,
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {}
            }
        }),
    )
}

fn handle_tools_list(dispatcher: &Dispatcher, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!("Handling tools/list");

    JsonRpcResponse::success(
        request.id,
        json!({
            "tools": dispatcher.list_tools()
        }),
    )
}

async fn handle_tools_call(dispatcher: &Dispatcher, request: JsonRpcRequest) -> JsonRpcResponse {
    debug!("Handling tools/call");

    let params = match request.params.as_object() {
        Some(obj) => obj,
        None => {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params("params must be an object"),
            );
        }
    };

    let tool_name = match params.get("name").and_then(|v| v.as_str()) {
        Some(name) => name,
        None => {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params("missing 'name' field"),
            );
        }
    };

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match dispatcher.call_tool(tool_name, arguments).await {
        Ok(text) => JsonRpcResponse::success(
            request.id,
            json!({
                "content": [
                    {
                        "type": "text",
                        "text": text
                    }
                ]
            }),
        ),
        Err(e) => JsonRpcResponse::error(request.id, tool_error(&e)),
    }
}

/// Map a failed tool call onto a JSON-RPC error without leaking internals
pub fn tool_error(err: &SolveItError) -> JsonRpcError {
    match err {
        SolveItError::Security(_) => JsonRpcError::security_violation(err.to_string()),
        SolveItError::UnknownTool(_) | SolveItError::InvalidParams(_) => {
            JsonRpcError::invalid_params(err.to_string())
        }
        _ => JsonRpcError::internal_error("Internal error while executing tool"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityViolation;
    use crate::knowledge::MockKnowledgeBase;
    use crate::mcp::tools::ToolRegistry;
    use crate::security::{SecurityMiddleware, SecurityPolicy};
    use tokio::io::AsyncReadExt;

    fn dispatcher(kb: MockKnowledgeBase) -> Arc<Dispatcher> {
        let policy = SecurityPolicy::default();
        let registry = ToolRegistry::solveit(&policy).unwrap();
        Arc::new(Dispatcher::new(
            registry,
            SecurityMiddleware::new(policy),
            Arc::new(kb),
        ))
    }

    #[test]
    fn test_request_routing() {
        let request = r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#;
        let parsed: JsonRpcRequest = serde_json::from_str(request).unwrap();

        assert_eq!(parsed.jsonrpc, "2.0");
        assert_eq!(parsed.method, "tools/list");
        assert_eq!(parsed.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn test_tool_error_mapping() {
        let security = SolveItError::from(SecurityViolation::RateLimitExceeded);
        let mapped = tool_error(&security);
        assert_eq!(mapped.code, -32001);
        assert_eq!(
            mapped.message,
            "Security policy violation: Rate limit exceeded. Please slow down."
        );

        assert_eq!(tool_error(&SolveItError::UnknownTool("x".into())).code, -32602);

        let internal = tool_error(&SolveItError::Other("/home/secret/path exploded".into()));
        assert_eq!(internal.code, -32603);
        assert!(!internal.message.contains("/home"));
    }

    #[tokio::test]
    async fn test_parse_and_invalid_request() {
        let d = dispatcher(MockKnowledgeBase::new());

        let response = handle_message(&d, "{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        let response = handle_message(&d, r#"{"jsonrpc":"1.0","method":"ping","id":3}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
        assert_eq!(response.id, Some(json!(3)));

        let response = handle_message(&d, r#"[1, 2]"#).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let d = dispatcher(MockKnowledgeBase::new());
        let response = handle_message(
            &d,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let d = dispatcher(MockKnowledgeBase::new());
        let response = handle_message(&d, r#"{"jsonrpc":"2.0","method":"resources/list","id":1}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_tools_call_wraps_text_content() {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_get_technique().returning(|_| Ok(None));
        let d = dispatcher(kb);

        let response = handle_message(
            &d,
            r#"{"jsonrpc":"2.0","method":"tools/call","id":7,"params":{"name":"get_technique_details","arguments":{"technique_id":"T9999"}}}"#,
        )
        .await
        .unwrap();

        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "Technique T9999 not found.");
    }

    #[tokio::test]
    async fn test_serve_answers_every_request() {
        let mut kb = MockKnowledgeBase::new();
        kb.expect_list_objectives().returning(|| Ok(vec![]));
        let server = McpServer::new(dispatcher(kb));

        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"initialize","id":1,"params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"tools/list","id":2}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"tools/call","id":3,"params":{"name":"list_objectives"}}"#,
            "\n",
        );

        let (client, mut observer) = tokio::io::duplex(1 << 20);
        server.serve(input.as_bytes(), client).await.unwrap();

        let mut written = String::new();
        observer.read_to_string(&mut written).await.unwrap();

        let mut ids: Vec<i64> = written
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
