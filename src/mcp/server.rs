//! JSON-RPC kernel
//!
//! Parses requests, routes `initialize`, `tools/list`, and `tools/call`,
//! and formats JSON-RPC 2.0 responses. Failures before dispatch become
//! JSON-RPC error objects (code -32000); failures inside dispatch become
//! error envelopes carried in `result`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::mcp::registry::ToolRegistry;
use crate::mcp::types::{
    methods, CallToolParams, InitializeResult, JsonRpcError, JsonRpcResponse, ListToolsResult,
    ServerCapabilities, ServerInfo, MCP_VERSION,
};

/// Core MCP server: owns the registry and processes one message at a time.
pub struct McpServer {
    name: String,
    version: String,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handle one raw message line, producing one response line.
    pub async fn handle_message(&self, message: &str) -> String {
        let parsed: Value = match serde_json::from_str(message) {
            Ok(value) => value,
            Err(err) => {
                error!(error = %err, "Failed to parse message");
                return protocol_error(None, "Invalid JSON message");
            }
        };

        if !parsed.is_object() {
            return protocol_error(None, "Invalid JSON message");
        }

        let id = parsed.get("id").cloned();
        let method = parsed.get("method").and_then(Value::as_str).unwrap_or_default();
        debug!(method, "Handling request");

        match method {
            methods::INITIALIZE => self.handle_initialize(id),
            methods::LIST_TOOLS => self.handle_list_tools(id),
            methods::CALL_TOOL => self.handle_call_tool(id, parsed.get("params").cloned()).await,
            other => protocol_error(id, format!("Unknown method: {other}")),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> String {
        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        };
        success(id, serde_json::to_value(result).expect("initialize result serializes"))
    }

    fn handle_list_tools(&self, id: Option<Value>) -> String {
        let result = ListToolsResult {
            tools: self.registry.list(),
        };
        success(id, serde_json::to_value(result).expect("tool list serializes"))
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> String {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(p)) => p,
            Ok(None) => return protocol_error(id, "Missing tool call parameters"),
            Err(err) => return protocol_error(id, format!("Invalid tool call parameters: {err}")),
        };

        let tool = match self.registry.get(&params.name) {
            Some(tool) => tool,
            None => return protocol_error(id, format!("Tool not found: {}", params.name)),
        };

        let envelope = tool.dispatch(params.arguments).await;
        match serde_json::to_value(envelope) {
            Ok(result) => success(id, result),
            Err(err) => protocol_error(id, format!("Failed to encode tool result: {err}")),
        }
    }
}

fn success(id: Option<Value>, result: Value) -> String {
    encode(JsonRpcResponse::success(id, result))
}

fn protocol_error(id: Option<Value>, message: impl Into<String>) -> String {
    encode(JsonRpcResponse::error(id, JsonRpcError::protocol(message)))
}

fn encode(response: JsonRpcResponse) -> String {
    serde_json::to_string(&response).unwrap_or_else(|err| {
        error!(error = %err, "Failed to encode response");
        r#"{"jsonrpc":"2.0","error":{"code":-32000,"message":"Failed to create error response"}}"#
            .to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::dispatch::{handler, RegisteredTool, ToolSpec};
    use crate::mcp::types::CallToolResult;
    use serde_json::json;

    fn server_with_echo() -> McpServer {
        let registry = Arc::new(ToolRegistry::new());
        let spec = ToolSpec::new(
            "echo",
            "Echo a message",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
            handler(|args| async move {
                Ok(CallToolResult::text(args["message"].as_str().unwrap_or_default().to_string()))
            }),
        );
        registry.register(RegisteredTool::wrap(spec).unwrap()).unwrap();
        McpServer::new("data-mcp-server", "1.0.0", registry)
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server_with_echo();
        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], MCP_VERSION);
        assert_eq!(response["result"]["capabilities"]["tools"], json!({}));
        assert_eq!(response["result"]["serverInfo"]["name"], "data-mcp-server");
    }

    #[tokio::test]
    async fn test_tools_list() {
        let server = server_with_echo();
        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"]["properties"]["message"].is_object());
    }

    #[tokio::test]
    async fn test_call_tool() {
        let server = server_with_echo();
        let raw = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#,
            )
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["result"]["isError"], json!(false));
        assert_eq!(response["result"]["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = server_with_echo();
        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","id":4,"method":"bogus"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["code"], -32000);
        assert_eq!(response["error"]["message"], "Unknown method: bogus");
        assert_eq!(response["id"], 4);
    }

    #[tokio::test]
    async fn test_tool_not_found() {
        let server = server_with_echo();
        let raw = server
            .handle_message(
                r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"missing"}}"#,
            )
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["message"], "Tool not found: missing");
    }

    #[tokio::test]
    async fn test_parse_failure_has_no_id() {
        let server = server_with_echo();
        let raw = server.handle_message("{not json").await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(response["error"]["code"], -32000);
        assert!(response.get("id").is_none());
    }

    #[tokio::test]
    async fn test_id_omitted_when_absent() {
        let server = server_with_echo();
        let raw = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"tools/list"}"#)
            .await;
        let response: Value = serde_json::from_str(&raw).unwrap();
        assert!(response.get("id").is_none());
        assert!(response.get("result").is_some());
    }
}
