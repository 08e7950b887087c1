//! JSON-RPC 2.0 message model.
//!
//! Messages are built by the parser in `conduit-jsonrpc` and serialized back to
//! the wire through the `Serialize` impls here, which always emit the
//! `"jsonrpc": "2.0"` marker.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The protocol version marker carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name of the MCP progress notification.
pub const PROGRESS_NOTIFICATION: &str = "notifications/progress";

/// Standard JSON-RPC error codes, plus the MCP request timeout.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const REQUEST_TIMEOUT: i64 = -32001;
}

/// Parameters of a request or notification. Always a JSON object.
pub type Params = Map<String, Value>;

/// Identifier correlating a request with its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// The id used on errors that cannot be tied to a request.
    pub fn unknown() -> Self {
        RequestId::Number(0)
    }

    /// Read an id from a raw JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Params,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// The `_meta` object of the params, if any.
    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.params.get("_meta").and_then(Value::as_object)
    }

    /// The caller's progress token from `params._meta.progressToken`.
    pub fn progress_token(&self) -> Option<&Value> {
        self.meta().and_then(|meta| meta.get("progressToken"))
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcNotification {
    pub method: String,
    pub params: Params,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
///
/// The result is an object, so an empty result serializes as `{}`.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    pub id: RequestId,
    pub result: Map<String, Value>,
}

impl JsonRpcResponse {
    pub fn new(id: impl Into<RequestId>, result: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            result,
        }
    }

    /// A response with an empty `{}` result.
    pub fn empty(id: impl Into<RequestId>) -> Self {
        Self::new(id, Map::new())
    }
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcError {
    pub id: RequestId,
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(id: impl Into<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(RequestId::unknown(), codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(id: impl Into<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(id: impl Into<RequestId>, method: &str) -> Self {
        Self::new(
            id,
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(id: impl Into<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, codes::INVALID_PARAMS, message)
    }

    pub fn internal_error(id: impl Into<RequestId>, message: impl Into<String>) -> Self {
        Self::new(id, codes::INTERNAL_ERROR, message)
    }

    pub fn request_timeout(id: impl Into<RequestId>) -> Self {
        Self::new(id, codes::REQUEST_TIMEOUT, "Request timed out")
    }
}

/// The outcome of a request: exactly one of a response or an error.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcReply {
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcReply {
    pub fn id(&self) -> &RequestId {
        match self {
            JsonRpcReply::Response(r) => &r.id,
            JsonRpcReply::Error(e) => &e.id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JsonRpcReply::Error(_))
    }
}

impl From<JsonRpcResponse> for JsonRpcReply {
    fn from(value: JsonRpcResponse) -> Self {
        JsonRpcReply::Response(value)
    }
}

impl From<JsonRpcError> for JsonRpcReply {
    fn from(value: JsonRpcError) -> Self {
        JsonRpcReply::Error(value)
    }
}

/// Any message that can travel in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl JsonRpcMessage {
    /// Encode the message as a single line of JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<JsonRpcReply> for JsonRpcMessage {
    fn from(value: JsonRpcReply) -> Self {
        match value {
            JsonRpcReply::Response(r) => JsonRpcMessage::Response(r),
            JsonRpcReply::Error(e) => JsonRpcMessage::Error(e),
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(value: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(value)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(value: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(value)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(value: JsonRpcResponse) -> Self {
        JsonRpcMessage::Response(value)
    }
}

impl From<JsonRpcError> for JsonRpcMessage {
    fn from(value: JsonRpcError) -> Self {
        JsonRpcMessage::Error(value)
    }
}

impl Serialize for JsonRpcRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.params.is_empty() { 3 } else { 4 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("method", &self.method)?;
        if !self.params.is_empty() {
            map.serialize_entry("params", &self.params)?;
        }
        map.end()
    }
}

impl Serialize for JsonRpcNotification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.params.is_empty() { 2 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("method", &self.method)?;
        if !self.params.is_empty() {
            map.serialize_entry("params", &self.params)?;
        }
        map.end()
    }
}

impl Serialize for JsonRpcResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("result", &self.result)?;
        map.end()
    }
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    code: i64,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Value>,
}

impl Serialize for JsonRpcError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry(
            "error",
            &ErrorObject {
                code: self.code,
                message: &self.message,
                data: self.data.as_ref(),
            },
        )?;
        map.end()
    }
}

impl Serialize for JsonRpcReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcReply::Response(r) => r.serialize(serializer),
            JsonRpcReply::Error(e) => e.serialize(serializer),
        }
    }
}

impl Serialize for JsonRpcMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcMessage::Request(m) => m.serialize(serializer),
            JsonRpcMessage::Notification(m) => m.serialize(serializer),
            JsonRpcMessage::Response(m) => m.serialize(serializer),
            JsonRpcMessage::Error(m) => m.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn serialize_request_with_params() {
        let req = JsonRpcRequest::new(1, "tools/call", params(json!({"name": "read"})));
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["name"], "read");
    }

    #[test]
    fn serialize_request_without_params() {
        let req = JsonRpcRequest::new("srv-1", "ping", Params::new());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], "srv-1");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn serialize_notification_has_no_id() {
        let notif = JsonRpcNotification::new("notifications/initialized", Params::new());
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "notifications/initialized");
        assert!(json.get("id").is_none());
    }

    #[test]
    fn empty_result_serializes_as_object() {
        let resp = JsonRpcResponse::empty(7);
        let text = serde_json::to_string(&resp).unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":7,"result":{}}"#);
    }

    #[test]
    fn serialize_error_without_data() {
        let err = JsonRpcError::method_not_found(3, "nope");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(json["error"]["message"], "Method not found: nope");
        assert!(json["error"].get("data").is_none());
    }

    #[test]
    fn serialize_error_with_data() {
        let mut err = JsonRpcError::invalid_params("a", "bad");
        err.data = Some(json!({"field": "name"}));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"]["data"]["field"], "name");
    }

    #[test]
    fn parse_error_uses_unknown_id() {
        let err = JsonRpcError::parse_error();
        assert_eq!(err.id, RequestId::Number(0));
        assert_eq!(err.code, codes::PARSE_ERROR);
    }

    #[test]
    fn request_id_from_value() {
        assert_eq!(RequestId::from_value(&json!(5)), Some(RequestId::Number(5)));
        assert_eq!(
            RequestId::from_value(&json!("x")),
            Some(RequestId::String("x".into()))
        );
        assert_eq!(RequestId::from_value(&json!(1.5)), None);
        assert_eq!(RequestId::from_value(&json!(null)), None);
        assert_eq!(RequestId::from_value(&json!([1])), None);
    }

    #[test]
    fn progress_token_read_from_meta() {
        let req = JsonRpcRequest::new(
            1,
            "tools/call",
            params(json!({"name": "x", "_meta": {"progressToken": "p1"}})),
        );
        assert_eq!(req.progress_token(), Some(&json!("p1")));

        let bare = JsonRpcRequest::new(1, "tools/call", params(json!({"name": "x"})));
        assert!(bare.progress_token().is_none());
    }

    #[test]
    fn reply_id_and_kind() {
        let reply: JsonRpcReply = JsonRpcError::request_timeout("s-9").into();
        assert!(reply.is_error());
        assert_eq!(reply.id(), &RequestId::from("s-9"));
    }

    #[test]
    fn message_to_json_delegates() {
        let msg: JsonRpcMessage = JsonRpcResponse::empty(1).into();
        assert_eq!(msg.to_json().unwrap(), r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }
}
