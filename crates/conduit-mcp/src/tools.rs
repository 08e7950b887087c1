//! `tools/list` and `tools/call`.

use conduit_jsonrpc::{HandlerOutcome, RequestHandler, StreamableResponse};
use conduit_tools::ToolRegistry;
use conduit_types::{
    HandlerError, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, PROGRESS_NOTIFICATION, Progress, RequestId, ToolCall, ToolEvent,
    ToolEventStream, ToolExecution, ToolExecutor,
};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::content::render_tool_result;

/// The only error clients see when a tool is missing or fails.
pub const TOOL_FAILURE_MESSAGE: &str = "Error while executing tool";

/// Lists the registry's tools, sorted by name.
pub struct ToolListHandler {
    registry: Arc<ToolRegistry>,
}

impl ToolListHandler {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl RequestHandler for ToolListHandler {
    fn supports(&self, request: &JsonRpcRequest) -> bool {
        request.method == "tools/list"
    }

    fn create_response(&self, request: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError> {
        let tools = serde_json::to_value(self.registry.definitions())
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        let mut result = Map::new();
        result.insert("tools".into(), tools);
        Ok(JsonRpcResponse::new(request.id, result).into())
    }
}

/// Runs tools through a [`ToolExecutor`].
///
/// Synchronous results become a single response. Streaming results become a
/// [`StreamableResponse`] that turns progress into `notifications/progress`
/// and ends at the first terminal result.
pub struct ToolCallHandler {
    executor: Arc<dyn ToolExecutor>,
}

impl ToolCallHandler {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }
}

impl RequestHandler for ToolCallHandler {
    fn supports(&self, request: &JsonRpcRequest) -> bool {
        request.method == "tools/call"
    }

    fn create_response(&self, request: JsonRpcRequest) -> Result<HandlerOutcome, HandlerError> {
        let call = parse_tool_call(&request)?;
        let progress_token = request.progress_token().cloned();
        let id = request.id;

        tracing::debug!("Calling tool '{}' (request {id})", call.name);
        match self.executor.call(&call) {
            Ok(ToolExecution::Complete(result)) => {
                Ok(JsonRpcResponse::new(id, render_tool_result(result)).into())
            }
            Ok(ToolExecution::Streaming(events)) => Ok(StreamableResponse::new(ToolCallStream {
                id,
                progress_token,
                events,
                finished: false,
            })
            .into()),
            Err(e) => {
                tracing::warn!("Tool '{}' failed: {e}", call.name);
                Ok(JsonRpcError::internal_error(id, TOOL_FAILURE_MESSAGE).into())
            }
        }
    }
}

fn parse_tool_call(request: &JsonRpcRequest) -> Result<ToolCall, HandlerError> {
    let name = match request.params.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => return Err(HandlerError::InvalidArgument("Missing tool name".into())),
    };
    let arguments = match request.params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(arguments)) => arguments.clone(),
        Some(_) => {
            return Err(HandlerError::InvalidArgument(
                "Tool arguments must be an object".into(),
            ));
        }
    };
    Ok(ToolCall {
        id: request.id.to_string(),
        name,
        arguments,
    })
}

/// Wire messages of a streaming tool call, pulled one at a time.
struct ToolCallStream {
    id: RequestId,
    progress_token: Option<Value>,
    events: ToolEventStream,
    finished: bool,
}

impl ToolCallStream {
    fn fail(&mut self) -> JsonRpcMessage {
        self.finished = true;
        JsonRpcError::internal_error(self.id.clone(), TOOL_FAILURE_MESSAGE).into()
    }
}

impl Iterator for ToolCallStream {
    type Item = JsonRpcMessage;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.events.next() {
                Some(Ok(ToolEvent::Progress(progress))) => {
                    if let Some(token) = &self.progress_token {
                        return Some(progress_notification(token, progress).into());
                    }
                    tracing::debug!("Dropping progress for request {} without a token", self.id);
                }
                Some(Ok(ToolEvent::Done(result))) => {
                    self.finished = true;
                    let id = self.id.clone();
                    return Some(JsonRpcResponse::new(id, render_tool_result(result)).into());
                }
                Some(Err(e)) => {
                    tracing::warn!("Streaming tool for request {} failed: {e}", self.id);
                    return Some(self.fail());
                }
                None => {
                    tracing::warn!("Streaming tool for request {} ended without a result", self.id);
                    return Some(self.fail());
                }
            }
        }
    }
}

fn progress_notification(token: &Value, progress: Progress) -> JsonRpcNotification {
    let mut params = Map::new();
    params.insert("progressToken".into(), token.clone());
    params.insert("progress".into(), Value::from(progress.progress));
    if let Some(total) = progress.total {
        params.insert("total".into(), Value::from(total));
    }
    if let Some(message) = progress.message {
        params.insert("message".into(), Value::String(message));
    }
    JsonRpcNotification::new(PROGRESS_NOTIFICATION, params)
}
