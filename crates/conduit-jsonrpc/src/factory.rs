//! Parsing raw JSON text into JSON-RPC messages.

use conduit_types::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, Params, RequestId,
};
use serde_json::{Map, Value};

use crate::error::FactoryError;

/// One position of a parsed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Message(JsonRpcMessage),
    /// The item was valid JSON but not a valid JSON-RPC message. `id` is
    /// kept when it could be read so the error can be addressed to it.
    Invalid {
        id: Option<RequestId>,
        reason: String,
    },
}

impl ParsedMessage {
    fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        ParsedMessage::Invalid {
            id,
            reason: reason.into(),
        }
    }
}

impl From<JsonRpcMessage> for ParsedMessage {
    fn from(value: JsonRpcMessage) -> Self {
        ParsedMessage::Message(value)
    }
}

/// Turns transport payloads into ordered message lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFactory;

impl MessageFactory {
    pub fn new() -> Self {
        Self
    }

    /// Parse a payload holding a single message or a batch.
    ///
    /// Fails as a whole only when `raw` is not JSON. A bare object is a
    /// one-element batch; each array element is parsed independently, so a
    /// malformed element only invalidates its own position.
    pub fn create(&self, raw: &str) -> Result<Vec<ParsedMessage>, FactoryError> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(match value {
            Value::Array(items) if items.is_empty() => {
                vec![ParsedMessage::invalid(None, "Empty batch")]
            }
            Value::Array(items) => items.into_iter().map(parse_item).collect(),
            other => vec![parse_item(other)],
        })
    }
}

fn parse_item(value: Value) -> ParsedMessage {
    let Value::Object(mut object) = value else {
        return ParsedMessage::invalid(None, "Message must be a JSON object");
    };

    let raw_id = object.remove("id");
    let id = raw_id.as_ref().and_then(RequestId::from_value);

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return ParsedMessage::invalid(id, "Missing or unsupported jsonrpc version");
    }

    if let Some(method) = object.remove("method") {
        let Value::String(method) = method else {
            return ParsedMessage::invalid(id, "Method must be a string");
        };
        let params = match take_params(&mut object) {
            Ok(params) => params,
            Err(reason) => return ParsedMessage::invalid(id, reason),
        };
        return match (raw_id, id) {
            (None, _) => {
                JsonRpcMessage::Notification(JsonRpcNotification::new(method, params)).into()
            }
            (Some(_), Some(id)) => {
                JsonRpcMessage::Request(JsonRpcRequest::new(id, method, params)).into()
            }
            (Some(_), None) => ParsedMessage::invalid(None, "Id must be a string or an integer"),
        };
    }

    let Some(id) = id else {
        return ParsedMessage::invalid(None, "Message has no method and no valid id");
    };

    match (object.remove("result"), object.remove("error")) {
        (Some(Value::Object(result)), None) => {
            JsonRpcMessage::Response(JsonRpcResponse::new(id, result)).into()
        }
        (Some(_), None) => ParsedMessage::invalid(Some(id), "Result must be an object"),
        (None, Some(Value::Object(error))) => parse_error_object(id, error),
        (None, Some(_)) => ParsedMessage::invalid(Some(id), "Error must be an object"),
        (Some(_), Some(_)) => {
            ParsedMessage::invalid(Some(id), "Message has both result and error")
        }
        (None, None) => {
            ParsedMessage::invalid(Some(id), "Message has no method, result or error")
        }
    }
}

fn take_params(object: &mut Map<String, Value>) -> Result<Params, &'static str> {
    match object.remove("params") {
        None | Some(Value::Null) => Ok(Params::new()),
        Some(Value::Object(params)) => Ok(params),
        Some(_) => Err("Params must be an object"),
    }
}

fn parse_error_object(id: RequestId, mut error: Map<String, Value>) -> ParsedMessage {
    let code = error.get("code").and_then(Value::as_i64);
    let message = error.get("message").and_then(Value::as_str).map(str::to_string);
    match (code, message) {
        (Some(code), Some(message)) => {
            let mut err = JsonRpcError::new(id, code, message);
            err.data = error.remove("data");
            JsonRpcMessage::Error(err).into()
        }
        _ => ParsedMessage::invalid(Some(id), "Error must carry an integer code and a message"),
    }
}
