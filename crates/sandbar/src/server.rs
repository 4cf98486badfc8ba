//! Request dispatcher.
//!
//! Reads one JSON-RPC message at a time from a [`Transport`], routes it to the
//! tool registry, and writes the response back. Requests are served strictly
//! in order; a tool call finishes before the next line is read.

use sandbar_runtime::{ToolContext, ToolRegistry};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::protocol::*;
use crate::transport::Transport;

pub struct Server {
    registry: ToolRegistry,
    static_dirs: Vec<PathBuf>,
    name: String,
    version: String,
}

impl Server {
    /// `static_dirs` apply to every call; callers may add more per call.
    pub fn new(registry: ToolRegistry, static_dirs: Vec<PathBuf>) -> Self {
        Self {
            registry,
            static_dirs,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serve until the transport closes.
    pub async fn run<T: Transport>(&self, transport: &mut T) -> Result<(), ServerError> {
        info!(
            server = %self.name,
            tools = self.registry.list().len(),
            allowed_dirs = ?self.static_dirs,
            "Server starting"
        );

        while let Some(line) = transport.receive().await? {
            debug!(message = %line, "Received message");
            if let Some(response) = self.handle_message(&line).await {
                let json = serde_json::to_string(&response)?;
                debug!(response = %json, "Sending response");
                transport.send(&json).await?;
            }
        }

        info!("Transport closed, shutting down");
        Ok(())
    }

    /// Handle one raw line. Returns `None` for notifications.
    pub async fn handle_message(&self, line: &str) -> Option<JsonRpcResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to parse JSON");
                return Some(JsonRpcResponse::failure(None, ServerError::Parse.to_rpc_error()));
            }
        };

        // No id means a notification, which never gets a reply
        if raw.get("id").is_none() {
            let method = raw["method"].as_str().unwrap_or("");
            match method {
                "notifications/initialized" => info!("Client confirmed initialization"),
                _ => debug!(method, "Ignoring notification"),
            }
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Malformed JSON-RPC request");
                let id = serde_json::from_value(raw["id"].clone()).ok();
                let err = ServerError::InvalidRequest(e.to_string());
                return Some(JsonRpcResponse::failure(id, err.to_rpc_error()));
            }
        };

        Some(self.handle_request(request).await)
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            method => {
                warn!(method, "Unknown method");
                Err(ServerError::MethodNotFound(method.to_string()))
            }
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, e.to_rpc_error()),
        }
    }

    fn initialize(&self) -> Result<Value, ServerError> {
        info!("Handling initialize");
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
                context_schema: context_schema(),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list_tools(&self) -> Result<Value, ServerError> {
        let tools: Vec<ToolInfo> = self.registry.list().into_iter().map(ToolInfo::from).collect();
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, ServerError> {
        let params = params.ok_or_else(|| ServerError::InvalidParams("missing params".into()))?;
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| ServerError::InvalidParams(e.to_string()))?;

        let call_dirs = params.meta.map(|m| m.allowed_dirs).unwrap_or_default();
        let ctx = ToolContext::merged(self.static_dirs.iter().cloned(), call_dirs);
        debug!(tool = %params.name, allowed_dirs = ?ctx.allowed_dirs, "Handling tools/call");

        let result = self.registry.call(&params.name, params.arguments, &ctx).await;
        Ok(serde_json::to_value(result)?)
    }
}
