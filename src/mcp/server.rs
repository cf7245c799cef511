//! MCP server for pandoc document conversion.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! [`McpServer::handle_line`] does not know about any transport; the stdio
//! loop lives in [`McpServer::run`] and the HTTP/SSE transport drives one
//! server per session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ConvertError;
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, RequestId,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::StdioTransport;
use crate::pandoc::{ConversionHandler, ConversionRequest, Format};

/// Name of the conversion tool.
pub const CONVERT_TOOL: &str = "convert-contents";

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Creates an error result describing a conversion failure.
    #[must_use]
    pub fn from_convert_error(error: &ConvertError) -> Self {
        let mut body = json!({
            "status": "error",
            "kind": error.kind(),
            "error": error.to_string(),
        });
        match error {
            ConvertError::FilterNotFound(e) => {
                body["filter"] = json!(e.name);
                body["tried_paths"] = json!(e.tried_paths);
            }
            ConvertError::ConversionFailed {
                exit_code: Some(code),
                ..
            } => {
                body["exit_code"] = json!(code);
            }
            _ => {}
        }
        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| error.to_string());
        Self::error(text)
    }
}

/// Outcome of [`McpServer::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    /// The reply, if the message needs one.
    Reply(Option<OutgoingMessage>),
    /// An accepted tool call that still has to run.
    ToolCall(PendingToolCall),
}

/// A validated tools/call request, detached from the server that accepted it.
#[derive(Debug)]
pub struct PendingToolCall {
    id: RequestId,
    params: ToolCallParams,
    handler: Arc<ConversionHandler>,
}

impl PendingToolCall {
    /// Name of the requested tool.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.params.name
    }

    /// Runs the tool and returns the JSON-RPC reply.
    pub async fn run(self) -> OutgoingMessage {
        let result = match self.params.name.as_str() {
            CONVERT_TOOL => self.convert_contents().await,
            _ => ToolCallResult::error(format!("Unknown tool: {}", self.params.name)),
        };

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(self.id, value).into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise tool call result");
                JsonRpcError::internal_error(
                    self.id,
                    "Internal error: failed to serialise result",
                )
                .into()
            }
        }
    }

    /// Runs the `convert-contents` tool.
    async fn convert_contents(&self) -> ToolCallResult {
        let arguments = if self.params.arguments.is_null() {
            json!({})
        } else {
            self.params.arguments.clone()
        };

        let request: ConversionRequest = match serde_json::from_value(arguments) {
            Ok(request) => request,
            Err(e) => {
                return ToolCallResult::from_convert_error(&ConvertError::validation(format!(
                    "invalid arguments: {e}"
                )));
            }
        };

        match self.handler.handle(&request).await {
            Ok(outcome) => ToolCallResult::text(outcome.message()),
            Err(e) => {
                tracing::warn!(kind = e.kind(), error = %e, "Conversion failed");
                ToolCallResult::from_convert_error(&e)
            }
        }
    }
}

/// The MCP server for pandoc conversions.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Runs conversion requests.
    handler: Arc<ConversionHandler>,
}

impl McpServer {
    /// Creates a new MCP server backed by `handler`.
    #[must_use]
    pub const fn new(handler: Arc<ConversionHandler>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            handler,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the server over stdio until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::new();
        self.run_with_shutdown(&mut transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        transport: &mut StdioTransport,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if let Some(reply) = self.handle_line(&line).await {
            transport.write_message(&reply).await?;
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one raw JSON-RPC message and returns the reply, if any.
    ///
    /// Blank lines and notifications produce no reply.
    pub async fn handle_line(&mut self, line: &str) -> Option<OutgoingMessage> {
        match self.dispatch(line) {
            Dispatch::Reply(reply) => reply,
            Dispatch::ToolCall(call) => Some(call.run().await),
        }
    }

    /// Applies one raw JSON-RPC message to the lifecycle state.
    ///
    /// Everything except `tools/call` is answered immediately. A tool call
    /// comes back as a [`PendingToolCall`] that no longer borrows the
    /// server, so a transport can release its session before running it.
    pub fn dispatch(&mut self, line: &str) -> Dispatch {
        if line.trim().is_empty() {
            return Dispatch::Reply(None);
        }

        match parse_message(line) {
            Ok(msg) => {
                tracing::debug!(method = msg.method(), id = ?msg.id(), "Received message");
                self.dispatch_message(msg)
            }
            Err(error) => Dispatch::Reply(Some(error.into())),
        }
    }

    /// Handles a parsed incoming message.
    fn dispatch_message(&mut self, msg: IncomingMessage) -> Dispatch {
        match msg {
            IncomingMessage::Request(req) => self.dispatch_request(req),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                Dispatch::Reply(None)
            }
        }
    }

    /// Handles an incoming request.
    fn dispatch_request(&mut self, req: JsonRpcRequest) -> Dispatch {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => match self.prepare_tools_call(&req) {
                Ok(call) => return Dispatch::ToolCall(call),
                Err(error) => Err(error),
            },
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        Dispatch::Reply(Some(match response {
            Ok(resp) => resp.into(),
            Err(error) => error.into(),
        }))
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested_version = %params.protocol_version,
                "Client connected"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": Self::get_tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Checks state and parameters of a tools/call request.
    fn prepare_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<PendingToolCall, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        Ok(PendingToolCall {
            id: req.id.clone(),
            params,
            handler: Arc::clone(&self.handler),
        })
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    /// Returns the list of available tools.
    #[must_use]
    pub fn get_tool_definitions() -> Vec<ToolDefinition> {
        let all_formats = Format::all_tokens();
        let input_formats = Format::input_tokens();
        let file_formats: Vec<&str> = Format::all()
            .filter(|f| f.requires_file_output())
            .map(Format::token)
            .collect();

        vec![ToolDefinition {
            name: CONVERT_TOOL.to_string(),
            description: Some(format!(
                "Convert a document between formats using pandoc. Supply either inline \
                 'contents' or an 'input_file' path, never both. Input formats: {}. \
                 Output formats: {}. The formats {} are binary or paginated and require \
                 'output_file'; other formats return the converted text unless \
                 'output_file' is given. Optional: 'reference_doc' (style template for \
                 docx/odt output), 'defaults_file' (pandoc YAML defaults, must not set both \
                 'from' and 'to'), 'filters' (pandoc filter names or paths, searched in the \
                 working directory, next to the defaults file, and in ~/.pandoc/filters).",
                input_formats.join(", "),
                all_formats.join(", "),
                file_formats.join(", "),
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "contents": {
                        "type": "string",
                        "description": "Document text to convert (mutually exclusive with input_file)"
                    },
                    "input_file": {
                        "type": "string",
                        "description": "Path of the document to convert (mutually exclusive with contents)"
                    },
                    "input_format": {
                        "type": "string",
                        "enum": input_formats,
                        "default": Format::Markdown.token(),
                        "description": "Format of the source document"
                    },
                    "output_format": {
                        "type": "string",
                        "enum": all_formats,
                        "default": Format::Markdown.token(),
                        "description": "Format to convert to"
                    },
                    "output_file": {
                        "type": "string",
                        "description": "Where to write the result; required for binary formats and with input_file"
                    },
                    "reference_doc": {
                        "type": "string",
                        "description": "Style reference document for docx/odt output"
                    },
                    "defaults_file": {
                        "type": "string",
                        "description": "pandoc defaults YAML file"
                    },
                    "filters": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "pandoc filters to apply, in order"
                    }
                },
                "additionalProperties": false
            }),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::config::PandocConfig;
    use crate::pandoc::{FilterResolver, PandocEngine};

    fn server() -> McpServer {
        let dir = std::env::temp_dir();
        let handler = ConversionHandler::with_parts(
            PandocEngine::new("/nonexistent/dir/pandoc-does-not-exist"),
            FilterResolver::new(dir.clone(), dir),
            &PandocConfig::default(),
        );
        McpServer::new(Arc::new(handler))
    }

    async fn initialised() -> McpServer {
        let mut server = server();
        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{}}}"#,
            )
            .await
            .unwrap();
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
        server
    }

    fn result_of(reply: Option<OutgoingMessage>) -> Value {
        match reply {
            Some(OutgoingMessage::Response(resp)) => resp.result,
            other => panic!("expected response, got {other:?}"),
        }
    }

    async fn call(server: &mut McpServer, arguments: &Value) -> Value {
        let line = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": CONVERT_TOOL, "arguments": arguments }
        })
        .to_string();
        result_of(server.handle_line(&line).await)
    }

    fn tool_text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[test]
    fn server_initial_state() {
        let server = server();
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = McpServer::get_tool_definitions();
        assert_eq!(tools.len(), 1);

        let tool = &tools[0];
        assert_eq!(tool.name, CONVERT_TOOL);
        assert!(tool.input_schema.is_object());
        let output_enum = tool.input_schema["properties"]["output_format"]["enum"]
            .as_array()
            .unwrap();
        assert!(output_enum.contains(&json!("pdf")));
        let input_enum = tool.input_schema["properties"]["input_format"]["enum"]
            .as_array()
            .unwrap();
        assert!(!input_enum.contains(&json!("pdf")));
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Hello, world!"),
        }
    }

    #[test]
    fn convert_error_result_carries_tried_paths() {
        let error = ConvertError::FilterNotFound(crate::error::FilterNotFoundError {
            name: "x.lua".to_string(),
            tried_paths: vec![PathBuf::from("/a/x.lua"), PathBuf::from("/b/x.lua")],
        });
        let result = ToolCallResult::from_convert_error(&error);
        assert!(result.is_error);

        let ToolContent::Text { text } = &result.content[0];
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["kind"], "filter_not_found");
        assert_eq!(body["tried_paths"], json!(["/a/x.lua", "/b/x.lua"]));
    }

    #[tokio::test]
    async fn lifecycle_reaches_running() {
        let server = initialised().await;
        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(server.protocol_version(), Some(MCP_PROTOCOL_VERSION));
    }

    #[tokio::test]
    async fn tools_require_initialisation() {
        let mut server = server();
        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await;
        assert!(matches!(reply, Some(OutgoingMessage::Error(_))));
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let mut server = initialised().await;
        let reply = server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            )
            .await;
        assert!(matches!(reply, Some(OutgoingMessage::Error(_))));
    }

    #[tokio::test]
    async fn blank_lines_and_garbage() {
        let mut server = server();
        assert!(server.handle_line("   ").await.is_none());
        match server.handle_line("not json").await {
            Some(OutgoingMessage::Error(e)) => {
                assert_eq!(e.error.code, ErrorCode::ParseError.code());
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_method() {
        let mut server = initialised().await;
        match server
            .handle_line(r#"{"jsonrpc":"2.0","id":4,"method":"resources/list"}"#)
            .await
        {
            Some(OutgoingMessage::Error(e)) => {
                assert_eq!(e.error.code, ErrorCode::MethodNotFound.code());
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_a_tool_error() {
        let mut server = initialised().await;
        let line = r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"nope"}}"#;
        let result = result_of(server.handle_line(line).await);
        assert_eq!(result["isError"], true);
        assert!(tool_text(&result).contains("Unknown tool"));
    }

    #[tokio::test]
    async fn validation_failure_is_reported_before_engine() {
        let mut server = initialised().await;
        let result = call(
            &mut server,
            &json!({ "contents": "# Hi", "output_format": "pdf" }),
        )
        .await;
        assert_eq!(result["isError"], true);
        let body: Value = serde_json::from_str(tool_text(&result)).unwrap();
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn wrong_argument_types_are_validation_errors() {
        let mut server = initialised().await;
        let result = call(&mut server, &json!({ "contents": 42 })).await;
        let body: Value = serde_json::from_str(tool_text(&result)).unwrap();
        assert_eq!(body["kind"], "validation_error");
    }

    #[tokio::test]
    async fn missing_engine_is_reported_by_kind() {
        let mut server = initialised().await;
        let result = call(
            &mut server,
            &json!({ "contents": "# Hi", "output_format": "html" }),
        )
        .await;
        assert_eq!(result["isError"], true);
        let body: Value = serde_json::from_str(tool_text(&result)).unwrap();
        assert_eq!(body["kind"], "engine_not_found");
    }

    #[tokio::test]
    async fn ping() {
        let mut server = server();
        let result = result_of(
            server
                .handle_line(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
                .await,
        );
        assert_eq!(result, json!({}));
    }

    #[tokio::test]
    async fn tool_call_is_detached_from_the_server() {
        let mut server = initialised().await;
        let line = json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": { "name": CONVERT_TOOL, "arguments": { "contents": "# Hi" } }
        })
        .to_string();

        let Dispatch::ToolCall(pending) = server.dispatch(&line) else {
            panic!("expected a pending tool call");
        };
        assert_eq!(pending.tool(), CONVERT_TOOL);

        // The server stays usable while the call is outstanding.
        let ping = r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#;
        assert!(matches!(server.dispatch(ping), Dispatch::Reply(Some(_))));

        let result = result_of(Some(pending.run().await));
        assert_eq!(result["isError"], true);
        assert!(tool_text(&result).contains("engine_not_found"));
    }

    #[test]
    fn rejected_tool_call_is_answered_immediately() {
        let mut server = server();
        let reply = server.dispatch(
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"convert-contents"}}"#,
        );
        assert!(matches!(reply, Dispatch::Reply(Some(OutgoingMessage::Error(_)))));
    }
}
