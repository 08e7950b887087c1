//! The `initialize` handshake.

use conduit_jsonrpc::{HandlerOutcome, RequestHandler};
use conduit_types::{HandlerError, JsonRpcRequest, JsonRpcResponse};
use serde_json::{Map, Value, json};

use crate::server::{ServerInfo, negotiate_protocol_version};

pub struct InitializeHandler {
    info: ServerInfo,
}

impl InitializeHandler {
    pub fn new(info: ServerInfo) -> Self {
        Self { info }
    }
}

impl RequestHandler for InitializeHandler {
    fn supports(&self, request: &JsonRpcRequest) -> bool {
        request.method == "initialize"
    }

    fn create_response(&self, request: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError> {
        let requested = request.params.get("protocolVersion").and_then(Value::as_str);
        let protocol_version = negotiate_protocol_version(requested, &self.info.protocol_version);

        if let Some(client) = request.params.get("clientInfo") {
            let client_name = client.get("name").and_then(Value::as_str).unwrap_or("unknown");
            let client_version = client.get("version").and_then(Value::as_str).unwrap_or("");
            tracing::info!(
                "Initializing for client {client_name} {client_version} (protocol {protocol_version})"
            );
        }

        let server_info = serde_json::to_value(self.info.implementation())
            .map_err(|e| HandlerError::Internal(e.to_string()))?;

        let mut result = Map::new();
        result.insert("protocolVersion".into(), Value::String(protocol_version));
        result.insert(
            "capabilities".into(),
            json!({ "tools": { "listChanged": false } }),
        );
        result.insert("serverInfo".into(), server_info);
        if let Some(instructions) = &self.info.instructions {
            result.insert("instructions".into(), Value::String(instructions.clone()));
        }
        if let Some(meta) = &self.info.meta {
            result.insert("_meta".into(), Value::Object(meta.clone()));
        }

        Ok(JsonRpcResponse::new(request.id, result).into())
    }

    fn is_initialize(&self) -> bool {
        true
    }
}
