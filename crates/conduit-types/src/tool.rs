//! Tool-call model shared by the tool registry and the `tools/call` handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ToolError;

/// Tool metadata advertised through `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A single invocation of a tool, as received from `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// The originating request id, stringified.
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Which MCP content block a tool result is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Audio,
    Resource,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Audio => "audio",
            ContentKind::Resource => "resource",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal result of a tool execution.
///
/// `result` is a string for plain payloads (text, base64 media, resource
/// text) and an object or array for structured payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub result: Value,
    pub kind: ContentKind,
    pub mime_type: Option<String>,
    pub is_error: bool,
    pub uri: Option<String>,
}

impl ToolCallResult {
    pub fn new(result: impl Into<Value>, kind: ContentKind) -> Self {
        Self {
            result: result.into(),
            kind,
            mime_type: None,
            is_error: false,
            uri: None,
        }
    }

    /// A successful plain-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Value::String(text.into()), ContentKind::Text)
    }

    /// A successful structured result. Objects are rendered as text plus
    /// `structuredContent`; any other value as text only.
    pub fn structured(value: Value) -> Self {
        Self::new(value, ContentKind::Text)
    }

    /// A failed result reported to the client as content with `isError: true`.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// Base64 image data.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(Value::String(data.into()), ContentKind::Image).with_mime_type(mime_type)
    }

    /// Base64 audio data.
    pub fn audio(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::new(Value::String(data.into()), ContentKind::Audio).with_mime_type(mime_type)
    }

    /// An embedded text resource.
    pub fn resource(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::new(Value::String(text.into()), ContentKind::Resource)
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether the payload is a JSON object. Arrays and scalars only ever
    /// travel as text.
    pub fn is_structured(&self) -> bool {
        self.result.is_object()
    }
}

/// A progress update yielded by a streaming tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

impl Progress {
    pub fn new(progress: f64) -> Self {
        Self {
            progress,
            total: None,
            message: None,
        }
    }

    pub fn of(progress: f64, total: f64) -> Self {
        Self {
            total: Some(total),
            ..Self::new(progress)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One item of a streaming tool execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Progress(Progress),
    Done(ToolCallResult),
}

/// A lazy, finite, non-restartable sequence of tool events.
pub type ToolEventStream = Box<dyn Iterator<Item = Result<ToolEvent, ToolError>> + Send>;

/// What a tool executor hands back for a call.
pub enum ToolExecution {
    /// The tool finished synchronously.
    Complete(ToolCallResult),
    /// The tool reports progress before its terminal result. Items are only
    /// pulled when the transport is ready for the next wire message.
    Streaming(ToolEventStream),
}

impl ToolExecution {
    pub fn streaming<I>(events: I) -> Self
    where
        I: IntoIterator<Item = Result<ToolEvent, ToolError>>,
        I::IntoIter: Send + 'static,
    {
        ToolExecution::Streaming(Box::new(events.into_iter()))
    }
}

impl fmt::Debug for ToolExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolExecution::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            ToolExecution::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

impl From<ToolCallResult> for ToolExecution {
    fn from(value: ToolCallResult) -> Self {
        ToolExecution::Complete(value)
    }
}

/// Anything that can run a tool call.
pub trait ToolExecutor: Send + Sync {
    fn call(&self, call: &ToolCall) -> Result<ToolExecution, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_result_is_not_structured() {
        let r = ToolCallResult::text("hi");
        assert_eq!(r.kind, ContentKind::Text);
        assert!(!r.is_error);
        assert!(!r.is_structured());
    }

    #[test]
    fn only_objects_are_structured() {
        assert!(ToolCallResult::structured(json!({"a": 1})).is_structured());
        assert!(!ToolCallResult::structured(json!([1, 2])).is_structured());
        assert!(!ToolCallResult::structured(json!(3)).is_structured());
    }

    #[test]
    fn error_result_sets_flag() {
        let r = ToolCallResult::error("boom");
        assert!(r.is_error);
        assert_eq!(r.result, json!("boom"));
    }

    #[test]
    fn media_results_carry_mime_type() {
        let img = ToolCallResult::image("aGk=", "image/png");
        assert_eq!(img.kind, ContentKind::Image);
        assert_eq!(img.mime_type.as_deref(), Some("image/png"));
        let audio = ToolCallResult::audio("aGk=", "audio/wav");
        assert_eq!(audio.kind, ContentKind::Audio);
    }

    #[test]
    fn resource_result_carries_uri() {
        let r = ToolCallResult::resource("file:///a.txt", "contents");
        assert_eq!(r.kind, ContentKind::Resource);
        assert_eq!(r.uri.as_deref(), Some("file:///a.txt"));
    }

    #[test]
    fn content_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ContentKind::Audio).unwrap(), "audio");
        assert_eq!(ContentKind::Resource.to_string(), "resource");
    }

    #[test]
    fn streaming_execution_is_lazy() {
        let exec = ToolExecution::streaming(
            (0..).map(|i| Ok(ToolEvent::Progress(Progress::new(f64::from(i))))),
        );
        match exec {
            ToolExecution::Streaming(mut events) => {
                assert!(matches!(events.next(), Some(Ok(ToolEvent::Progress(_)))));
            }
            other => panic!("Expected streaming, got {other:?}"),
        }
    }
}
