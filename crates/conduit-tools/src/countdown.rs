//! Countdown tool, a streaming tool that reports progress per step.

use crate::registry::Tool;
use conduit_types::{Progress, ToolCallResult, ToolDefinition, ToolError, ToolEvent, ToolExecution};
use serde_json::{Map, Value};

const DEFAULT_FROM: u64 = 3;
const MAX_FROM: u64 = 100;

/// Counts down from `from`, yielding one progress update per step and then
/// the text "Liftoff!". Steps are produced only as the caller pulls them.
pub struct CountdownTool;

impl Tool for CountdownTool {
    fn name(&self) -> &str {
        "countdown"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "countdown".to_string(),
            description: "Count down, streaming progress for each step.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "from": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": MAX_FROM,
                        "description": "Number to count down from (default 3)"
                    }
                }
            }),
        }
    }

    fn execute(&self, arguments: Map<String, Value>) -> Result<ToolExecution, ToolError> {
        let from = match arguments.get("from") {
            None => DEFAULT_FROM,
            Some(value) => value
                .as_u64()
                .filter(|n| *n <= MAX_FROM)
                .ok_or_else(|| ToolError::InvalidInput {
                    tool: "countdown".into(),
                    message: format!("'from' must be an integer between 0 and {MAX_FROM}"),
                })?,
        };

        let total = from as f64;
        let steps = (0..from).map(move |done| {
            let remaining = from - done;
            Ok(ToolEvent::Progress(
                Progress::of((done + 1) as f64, total).with_message(format!("{remaining}...")),
            ))
        });
        let finish = std::iter::once(Ok(ToolEvent::Done(ToolCallResult::text("Liftoff!"))));
        Ok(ToolExecution::streaming(steps.chain(finish)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events(args: Value) -> Vec<ToolEvent> {
        match CountdownTool.execute(args.as_object().cloned().unwrap()).unwrap() {
            ToolExecution::Streaming(events) => events.map(Result::unwrap).collect(),
            other => panic!("Expected streaming, got {other:?}"),
        }
    }

    #[test]
    fn streams_progress_then_result() {
        let events = events(json!({"from": 2}));
        assert_eq!(events.len(), 3);
        match &events[0] {
            ToolEvent::Progress(p) => {
                assert_eq!(p.progress, 1.0);
                assert_eq!(p.total, Some(2.0));
                assert_eq!(p.message.as_deref(), Some("2..."));
            }
            other => panic!("Expected progress, got {other:?}"),
        }
        assert_eq!(
            events[2],
            ToolEvent::Done(ToolCallResult::text("Liftoff!"))
        );
    }

    #[test]
    fn zero_goes_straight_to_result() {
        let events = events(json!({"from": 0}));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ToolEvent::Done(_)));
    }

    #[test]
    fn defaults_to_three() {
        assert_eq!(events(json!({})).len(), 4);
    }

    #[test]
    fn rejects_out_of_range() {
        let result = CountdownTool.execute(json!({"from": 1000}).as_object().cloned().unwrap());
        assert!(matches!(result, Err(ToolError::InvalidInput { .. })));
    }
}
