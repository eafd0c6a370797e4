// MCP server implementation over newline-delimited JSON-RPC

use crate::protocol::{
    negotiate_protocol_version, CallToolParams, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, ReadResourceParams, ResourcesCapability,
    ServerCapabilities, ServerInfo, ToolsCapability, JSONRPC_VERSION,
};
use crate::resources::{AllUsersResource, ResourceRegistry, UserProfileResource};
use crate::tools::{CreateUserTool, ToolRegistry};
use crate::transport::{Frame, MessageCodec, MAX_MESSAGE_BYTES};
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use userbook_core::storage::UserStore;

pub struct McpServer {
    info: ServerInfo,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    max_message_bytes: usize,
}

impl McpServer {
    pub fn new(name: impl Into<String>, tools: ToolRegistry, resources: ResourceRegistry) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            tools,
            resources,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }

    /// Limit on a single incoming message line
    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    /// Server exposing the create-user tool and the user resources over `store`
    pub fn for_users(name: impl Into<String>, store: Arc<dyn UserStore>) -> Result<Self> {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(CreateUserTool::new(store.clone())));

        let mut resources = ResourceRegistry::new();
        resources.register(Arc::new(AllUsersResource::new(store.clone())));
        resources
            .register_template(Arc::new(UserProfileResource::new(store)))
            .context("Failed to register user profile resource")?;

        tracing::info!(
            "Registered {} tool(s) and {} resource(s)",
            tools.list_schemas().len(),
            resources.list_schemas().len() + resources.list_template_schemas().len()
        );

        Ok(Self::new(name, tools, resources))
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Serve over the process stdin/stdout until stdin closes
    pub async fn start(&self) -> Result<()> {
        tracing::info!("MCP server {} listening on stdio", self.info.name);
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one request at a time until the reader reaches end of stream
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let codec = MessageCodec::with_max_length(self.max_message_bytes);
        let mut frames = FramedRead::new(reader, codec);
        let mut sink = FramedWrite::new(writer, MessageCodec::new());

        while let Some(frame) = frames.next().await {
            let response = match frame.context("Failed to read from transport")? {
                Frame::Message(line) if line.trim().is_empty() => continue,
                Frame::Message(line) => self.handle_line(&line).await,
                Frame::Invalid(e) => {
                    tracing::warn!("Rejecting message: {}", e);
                    Some(JsonRpcResponse::error(
                        serde_json::Value::Null,
                        JsonRpcError::parse_error(e.to_string()),
                    ))
                }
            };

            if let Some(response) = response {
                let json = serde_json::to_string(&response)
                    .context("Failed to serialize response")?;
                sink.send(json).await.context("Failed to write to transport")?;
            }
        }

        tracing::info!("Transport closed, shutting down");
        Ok(())
    }

    /// Handle one raw message; notifications produce no response
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Rejecting unparsable message: {}", e);
                return Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    serde_json::Value::Null,
                    JsonRpcError::invalid_request(e.to_string()),
                ));
            }
        };

        if request.is_notification() {
            tracing::debug!("Notification {}", request.method);
            return None;
        }

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id.unwrap_or_default(),
                JsonRpcError::invalid_request(format!(
                    "expected jsonrpc {}, got {}",
                    JSONRPC_VERSION, request.jsonrpc
                )),
            ));
        }

        tracing::debug!("Request {}", request.method);
        let id = request.id.clone().unwrap_or_default();
        let response = match self.dispatch(request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => {
                tracing::warn!("Request failed ({}): {}", error.code, error.message);
                JsonRpcResponse::error(id, error)
            }
        };
        Some(response)
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Result<serde_json::Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = parse_params(request.params)?;
                tracing::info!(
                    "Client {} {} connected (protocol {})",
                    params.client_info.name,
                    params.client_info.version,
                    params.protocol_version
                );
                to_result(&InitializeResult {
                    protocol_version: negotiate_protocol_version(&params.protocol_version)
                        .to_string(),
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: false,
                        }),
                        resources: Some(ResourcesCapability {
                            subscribe: false,
                            list_changed: false,
                        }),
                    },
                    server_info: self.info.clone(),
                })
            }
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => to_result(&ListToolsResult {
                tools: self.tools.list_schemas(),
            }),
            "tools/call" => {
                let params: CallToolParams = parse_params(request.params)?;
                let tool = self.tools.get(&params.name).ok_or_else(|| {
                    JsonRpcError::invalid_params(format!("Unknown tool: {}", params.name))
                })?;

                let result = tool
                    .execute(params.arguments)
                    .await
                    .map_err(|e| JsonRpcError::invalid_params(format!("{:#}", e)))?;
                to_result(&result)
            }
            "resources/list" => to_result(&ListResourcesResult {
                resources: self.resources.list_schemas(),
            }),
            "resources/templates/list" => to_result(&ListResourceTemplatesResult {
                resource_templates: self.resources.list_template_schemas(),
            }),
            "resources/read" => {
                let params: ReadResourceParams = parse_params(request.params)?;
                match self.resources.read(&params.uri).await {
                    Some(Ok(result)) => to_result(&result),
                    Some(Err(e)) => Err(JsonRpcError::internal_error(format!("{:#}", e))),
                    None => Err(JsonRpcError::resource_not_found(&params.uri)),
                }
            }
            method => Err(JsonRpcError::method_not_found(method)),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<serde_json::Value>) -> Result<T, JsonRpcError> {
    let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
    serde_json::from_value(params)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_result<T: Serialize>(value: &T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use userbook_core::storage::JsonFileUserStore;

    async fn server_in(dir: &TempDir) -> (McpServer, Arc<JsonFileUserStore>) {
        let store = Arc::new(JsonFileUserStore::new(dir.path().join("users.json")));
        store.init().await.unwrap();
        let server = McpServer::for_users("userbook", store.clone()).unwrap();
        (server, store)
    }

    async fn call(server: &McpServer, id: u64, method: &str, params: Value) -> Value {
        let line = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let response = server.handle_line(&line.to_string()).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    fn user_args(name: &str) -> Value {
        json!({ "name": name, "email": "a@x.com", "address": "1 St", "phone": "555" })
    }

    #[tokio::test]
    async fn test_initialize_advertises_tools_and_resources() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let response = call(
            &server,
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test", "version": "0.0.1" }
            }),
        )
        .await;

        let result = &response["result"];
        assert_eq!(response["id"], 1);
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "userbook");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_includes_annotations() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let response = call(&server, 2, "tools/list", json!({})).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "create-user");
        assert_eq!(
            tools[0]["inputSchema"]["required"],
            json!(["name", "email", "address", "phone"])
        );
        assert_eq!(tools[0]["annotations"]["idempotentHint"], false);
        assert_eq!(tools[0]["annotations"]["openWorldHint"], true);
    }

    #[tokio::test]
    async fn test_create_and_read_scenario() {
        let dir = TempDir::new().unwrap();
        let (server, store) = server_in(&dir).await;

        let first = call(&server, 1, "tools/call", json!({ "name": "create-user", "arguments": user_args("A") })).await;
        assert_eq!(first["result"]["structuredContent"]["userId"], 1);
        assert_eq!(first["result"]["content"][0]["text"], r#"{"userId":1}"#);

        let second = call(&server, 2, "tools/call", json!({ "name": "create-user", "arguments": user_args("B") })).await;
        assert_eq!(second["result"]["structuredContent"]["userId"], 2);

        let profile = call(&server, 3, "resources/read", json!({ "uri": "users://1/profile" })).await;
        let contents = &profile["result"]["contents"][0];
        assert_eq!(contents["mimeType"], "application/json");
        let user: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
        assert_eq!(
            user,
            json!({ "id": 1, "name": "A", "email": "a@x.com", "address": "1 St", "phone": "555" })
        );

        let missing = call(&server, 4, "resources/read", json!({ "uri": "users://3/profile" })).await;
        let contents = &missing["result"]["contents"][0];
        assert_eq!(contents["mimeType"], "text/plain");
        assert_eq!(contents["text"], "User not found");

        let all = call(&server, 5, "resources/read", json!({ "uri": "users://all" })).await;
        let users: Vec<Value> =
            serde_json::from_str(all["result"]["contents"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_create_is_rejected_before_storage() {
        let dir = TempDir::new().unwrap();
        let (server, store) = server_in(&dir).await;

        let response = call(
            &server,
            1,
            "tools/call",
            json!({ "name": "create-user", "arguments": { "name": "A", "email": "a@x.com" } }),
        )
        .await;

        assert_eq!(response["error"]["code"], -32602);
        assert!(response.get("result").is_none());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_a_normal_tool_result() {
        let dir = TempDir::new().unwrap();
        let (server, store) = server_in(&dir).await;
        std::fs::remove_file(store.path()).unwrap();

        let response = call(&server, 1, "tools/call", json!({ "name": "create-user", "arguments": user_args("A") })).await;
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"], "Error creating user");
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error creating user: "));

        let read = call(&server, 2, "resources/read", json!({ "uri": "users://all" })).await;
        assert_eq!(read["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn test_resource_listing() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let resources = call(&server, 1, "resources/list", json!({})).await;
        assert_eq!(resources["result"]["resources"][0]["uri"], "users://all");
        assert_eq!(resources["result"]["resources"][0]["mimeType"], "application/json");

        let templates = call(&server, 2, "resources/templates/list", json!({})).await;
        assert_eq!(
            templates["result"]["resourceTemplates"][0]["uriTemplate"],
            "users://{userId}/profile"
        );
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let parse = server.handle_line("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, -32700);
        assert_eq!(parse.id, Value::Null);

        let version = server
            .handle_line(r#"{"jsonrpc":"1.0","id":7,"method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(version.error.unwrap().code, -32600);
        assert_eq!(version.id, json!(7));

        let unknown = call(&server, 3, "prompts/list", json!({})).await;
        assert_eq!(unknown["error"]["code"], -32601);

        let tool = call(&server, 4, "tools/call", json!({ "name": "delete-user", "arguments": {} })).await;
        assert_eq!(tool["error"]["code"], -32602);

        let resource = call(&server, 5, "resources/read", json!({ "uri": "users://everyone" })).await;
        assert_eq!(resource["error"]["code"], -32002);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_bad_version_notification_gets_no_response() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let response = server
            .handle_line(r#"{"jsonrpc":"1.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    fn responses_of(output: Vec<u8>) -> Vec<Value> {
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_session() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let mut input = br#"{"jsonrpc":"2.0","id":1,"method":"ping","params":""#.to_vec();
        input.extend_from_slice(b"\xff\xfe\"}\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
        input.push(b'\n');

        let mut output = Vec::new();
        server.serve(&input[..], &mut output).await.unwrap();

        let responses = responses_of(output);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_over_long_line_is_rejected_and_session_continues() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;
        let server = server.with_max_message_bytes(64);

        let mut input = format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"ping","params":{{"pad":"{}"}}}}"#,
            "x".repeat(256)
        );
        input.push('\n');
        input.push_str(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#);
        input.push('\n');

        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let responses = responses_of(output);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[0]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("exceeds 64 bytes"));
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_serve_session_over_streams() {
        let dir = TempDir::new().unwrap();
        let (server, _) = server_in(&dir).await;

        let input = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2025-06-18",
                "clientInfo": { "name": "test", "version": "1" }
            }}),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {
                "name": "create-user", "arguments": user_args("A")
            }}),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }),
        ]
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("\n")
            + "\n\n";

        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let responses: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["structuredContent"]["userId"], 1);
        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["result"], json!({}));
    }
}
