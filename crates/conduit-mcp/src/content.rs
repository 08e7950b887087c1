//! Rendering of tool results into `tools/call` result objects.

use conduit_types::{ContentKind, ToolCallResult};
use serde_json::{Map, Value, json};

/// Build `{"content": [block], "isError": bool}`, plus `structuredContent`
/// when the payload is an object.
pub fn render_tool_result(result: ToolCallResult) -> Map<String, Value> {
    let mut rendered = Map::new();
    rendered.insert("content".into(), Value::Array(vec![content_block(&result)]));
    rendered.insert("isError".into(), Value::Bool(result.is_error));
    if result.is_structured() {
        rendered.insert("structuredContent".into(), result.result);
    }
    rendered
}

/// The single content block for a result, shaped by its kind.
pub fn content_block(result: &ToolCallResult) -> Value {
    let payload = payload_text(&result.result);
    match result.kind {
        ContentKind::Text => json!({ "type": "text", "text": payload }),
        ContentKind::Image | ContentKind::Audio => {
            let mut block = Map::new();
            block.insert("type".into(), json!(result.kind.as_str()));
            block.insert("data".into(), Value::String(payload));
            if let Some(mime_type) = &result.mime_type {
                block.insert("mimeType".into(), json!(mime_type));
            }
            Value::Object(block)
        }
        ContentKind::Resource => {
            let mut resource = Map::new();
            resource.insert("uri".into(), json!(result.uri.as_deref().unwrap_or_default()));
            if let Some(mime_type) = &result.mime_type {
                resource.insert("mimeType".into(), json!(mime_type));
            }
            resource.insert("text".into(), Value::String(payload));
            json!({ "type": "resource", "resource": resource })
        }
    }
}

/// Strings pass through; anything else is stringified as compact JSON.
fn payload_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
