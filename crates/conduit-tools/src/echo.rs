//! Echo tool: hands its input back.

use crate::registry::Tool;
use conduit_types::{ToolCallResult, ToolDefinition, ToolError, ToolExecution};
use serde_json::{Map, Value};

/// Returns `text` as plain text, or the whole argument object as structured
/// content when no `text` is given.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "echo".to_string(),
            description: "Echo the given text, or the arguments as structured content.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Text to echo back"
                    }
                }
            }),
        }
    }

    fn execute(&self, arguments: Map<String, Value>) -> Result<ToolExecution, ToolError> {
        let result = match arguments.get("text") {
            Some(Value::String(text)) => ToolCallResult::text(text.clone()),
            Some(_) => {
                return Err(ToolError::InvalidInput {
                    tool: "echo".into(),
                    message: "'text' must be a string".into(),
                });
            }
            None => ToolCallResult::structured(Value::Object(arguments)),
        };
        Ok(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(args: Value) -> Result<ToolCallResult, ToolError> {
        match EchoTool.execute(args.as_object().cloned().unwrap())? {
            ToolExecution::Complete(result) => Ok(result),
            other => panic!("Expected complete result, got {other:?}"),
        }
    }

    #[test]
    fn echoes_text() {
        let result = run(json!({"text": "hello"})).unwrap();
        assert_eq!(result.result, json!("hello"));
        assert!(!result.is_structured());
    }

    #[test]
    fn echoes_arguments_as_structured() {
        let result = run(json!({"x": 1})).unwrap();
        assert_eq!(result.result, json!({"x": 1}));
        assert!(result.is_structured());
    }

    #[test]
    fn rejects_non_string_text() {
        assert!(matches!(
            run(json!({"text": 5})),
            Err(ToolError::InvalidInput { .. })
        ));
    }
}
