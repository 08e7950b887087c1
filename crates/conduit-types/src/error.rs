//! Error hierarchy for Conduit.

use thiserror::Error;

/// Failures raised from inside a request or notification handler.
///
/// The dispatcher maps each kind onto exactly one JSON-RPC error code.
/// `NoReply` is the only kind that produces no wire output at all, so it must
/// only be used when the reply is known to be sent through another channel.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Request handled without a reply: {0}")]
    NoReply(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid input for tool '{tool}': {message}")]
    InvalidInput { tool: String, message: String },

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}
