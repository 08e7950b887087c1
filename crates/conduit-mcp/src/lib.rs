//! MCP method handlers for Conduit.
//!
//! Plugs the concrete Model Context Protocol methods (`initialize`, `ping`,
//! `tools/list`, `tools/call` and `notifications/initialized`) into the
//! generic [`conduit_jsonrpc::JsonRpcHandler`] dispatcher.

pub mod content;
pub mod initialize;
pub mod ping;
pub mod server;
pub mod session;
pub mod tools;

pub use initialize::InitializeHandler;
pub use ping::PingHandler;
pub use server::{
    LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS, ServerInfo, mcp_handler,
    negotiate_protocol_version,
};
pub use session::InitializedNotificationHandler;
pub use tools::{TOOL_FAILURE_MESSAGE, ToolCallHandler, ToolListHandler};
