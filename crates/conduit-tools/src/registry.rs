//! Tool registry for name-based dispatch.

use conduit_types::{ToolCall, ToolDefinition, ToolError, ToolExecution, ToolExecutor};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Trait that all tools must implement.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in `tools/call`).
    fn name(&self) -> &str;

    /// The definition advertised through `tools/list`.
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. Streaming tools return [`ToolExecution::Streaming`] and
    /// do their work as the sequence is pulled.
    fn execute(&self, arguments: Map<String, Value>) -> Result<ToolExecution, ToolError>;
}

/// Registry of available tools, supporting name-based dispatch.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Create a registry with all built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::EchoTool));
        registry.register(Arc::new(super::CountdownTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolExecutor for ToolRegistry {
    fn call(&self, call: &ToolCall) -> Result<ToolExecution, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: call.name.clone(),
            })?;
        tracing::debug!("Executing tool '{}' for request {}", call.name, call.id);
        tool.execute(call.arguments.clone())
    }
}
